//! ZimFetch - Chunked download orchestration and archive integrity for
//! ZIM content libraries.
//!
//! This library downloads large ZIM archives as fixed-size HTTP range
//! chunks, tracks every download through a persistent state machine, and
//! validates completed archives before they are exposed to the reader
//! application.

pub mod chunk;
pub mod download;
pub mod engine;
pub mod integrity;
pub mod orchestrator;
pub mod store;
pub mod telemetry;

pub use chunk::{plan, ChunkDescriptor, PlanError, CHUNK_SIZE, MAX_CHUNKS};
pub use download::{
    DownloadId, DownloadRecord, DownloadRequest, DownloadState, FailureReason, TransferEvent,
};
pub use engine::{EngineError, HttpEngineConfig, HttpTransferEngine, TransferEngine};
pub use integrity::{ArchiveIntegrityChecker, ArchiveSource, ValidationResult};
pub use orchestrator::{DownloadOrchestrator, OrchestratorConfig, OrchestratorError};
pub use store::{DownloadStore, JsonFileStore, MemoryStore};
