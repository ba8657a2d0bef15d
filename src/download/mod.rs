//! Download domain model: requests, persisted records, states, events, and
//! the pure reducer that ties them together.
//!
//! # Architecture
//!
//! ```text
//! DownloadRequest ──enqueue──> DownloadRecord (persisted, Pending)
//!                                   │
//!            TransferEvent ──> reduce(record, event, now)
//!                                   │
//!                          Transition { record', effects }
//!                                   │
//!                     orchestrator applies Persist / Delete
//! ```
//!
//! Nothing in this module performs I/O. The reducer is deliberately a free
//! function of its inputs so event sequences can be replayed in tests.

mod event;
mod record;
mod reducer;
mod request;
mod state;

pub use event::{DownloadEvent, TransferEvent};
pub use record::{ChunkProgress, DownloadRecord};
pub use reducer::{reduce, Effect, Transition};
pub use request::{DownloadId, DownloadRequest};
pub use state::{DownloadState, FailureReason};
