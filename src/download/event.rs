//! Normalized download events.
//!
//! The transfer engine's nine raw callbacks collapse into eight normalized
//! events (`Deleted` and `Removed` both become [`DownloadEvent::Removed`],
//! `Error` becomes [`DownloadEvent::Failed`]). Everything downstream of the
//! adapter — the reducer, the monitor, the tests — speaks only this
//! vocabulary.

use std::time::Duration;

use crate::engine::EngineId;

use super::state::FailureReason;

/// One normalized lifecycle event for a single piece of a download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadEvent {
    /// The engine accepted the piece and queued it.
    Queued,
    /// Bytes started flowing.
    Started,
    /// Byte count update for this piece.
    Progressed {
        /// Absolute bytes downloaded for this piece so far.
        bytes_downloaded: u64,
        /// Piece size as reported by the server, when known.
        total_bytes: Option<u64>,
        /// Whole-download ETA, attached by the monitor from observed
        /// throughput. `None` straight out of the adapter.
        eta: Option<Duration>,
    },
    /// The piece stopped on user request.
    Paused,
    /// The piece picked back up after a pause.
    Resumed,
    /// The piece gave up after exhausting the engine's retry budget.
    Failed(FailureReason),
    /// The piece finished; `bytes_downloaded` is its final size.
    Completed { bytes_downloaded: u64 },
    /// The engine forgot the piece (user deletion or engine-side removal).
    Removed,
}

/// A normalized event routed to the download owning `engine_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferEvent {
    /// Engine id of the piece this event concerns.
    pub engine_id: EngineId,
    pub event: DownloadEvent,
}

impl TransferEvent {
    pub fn new(engine_id: EngineId, event: DownloadEvent) -> Self {
        Self { engine_id, event }
    }
}
