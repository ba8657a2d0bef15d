//! Chunk planning for large archive downloads.
//!
//! Archives in a content library routinely exceed the 2 GiB limit some
//! filesystems and HTTP intermediaries impose on a single transfer, so one
//! logical download is split into a bounded list of byte-range requests that
//! can be fetched, retried, and resumed independently.
//!
//! The planner is a pure function: no state, no I/O. It produces
//! [`ChunkDescriptor`] values describing the range header string and the
//! on-disk part name for each piece; submitting them to a transfer engine is
//! the orchestrator's job.

mod naming;
mod planner;

pub use naming::{
    chunk_part_name, file_name_from_url, sequence_suffix, single_part_name, PART_EXTENSION,
};
pub use planner::{plan, ChunkDescriptor, PlanError, CHUNK_SIZE, MAX_CHUNKS};
