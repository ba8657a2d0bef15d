//! The persisted download record.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chunk::{file_name_from_url, ChunkDescriptor};
use crate::engine::EngineId;

use super::request::{DownloadId, DownloadRequest};
use super::state::DownloadState;

/// Progress bookkeeping for one piece of a download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkProgress {
    /// Engine id for this piece; `None` until the engine accepts the
    /// submission.
    pub engine_id: Option<EngineId>,
    /// On-disk name of the piece file, relative to the destination dir.
    pub file_name: String,
    /// Range header value this piece was planned with.
    pub range: String,
    /// Absolute bytes downloaded for this piece.
    pub bytes_downloaded: u64,
    /// Piece size as reported by the server, when known.
    pub total_bytes: Option<u64>,
    /// Set once the engine reports the piece complete.
    pub completed: bool,
}

impl ChunkProgress {
    pub fn new(file_name: impl Into<String>, range: impl Into<String>) -> Self {
        Self {
            engine_id: None,
            file_name: file_name.into(),
            range: range.into(),
            bytes_downloaded: 0,
            total_bytes: None,
            completed: false,
        }
    }
}

impl<T> From<&ChunkDescriptor<T>> for ChunkProgress {
    fn from(chunk: &ChunkDescriptor<T>) -> Self {
        ChunkProgress::new(chunk.file_name.clone(), chunk.range.clone())
    }
}

/// Durable state of one logical download.
///
/// Keyed by [`DownloadId`] in the persistent store. Created on enqueue in
/// `Pending`, mutated only by the orchestrator applying reduced events, and
/// deleted on cancellation. Everything needed to rebuild a lost engine
/// submission — URL, destination, chunk layout — lives here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRecord {
    /// Locally generated id, stable across retries and engine resets.
    pub id: DownloadId,
    /// Snapshot of the originating request.
    pub request: DownloadRequest,
    /// Current lifecycle state.
    pub state: DownloadState,
    /// Bytes downloaded across all pieces.
    pub bytes_downloaded: u64,
    /// Expected total size; refined from server-reported piece sizes once
    /// every piece has one.
    pub total_bytes: u64,
    /// Estimated time to completion from observed throughput.
    pub eta: Option<Duration>,
    /// When this record last changed.
    pub last_modified: DateTime<Utc>,
    /// Target path for the reassembled archive, once derived.
    pub file_path: Option<PathBuf>,
    /// Per-piece progress, in byte order.
    pub chunks: Vec<ChunkProgress>,
}

impl DownloadRecord {
    /// Fresh `Pending` record for `request`, split into `chunks`.
    pub fn new(
        id: DownloadId,
        request: DownloadRequest,
        chunks: Vec<ChunkProgress>,
        now: DateTime<Utc>,
    ) -> Self {
        let file_path = request
            .destination_dir
            .join(file_name_from_url(&request.url));
        Self {
            id,
            total_bytes: request.expected_size.unwrap_or(0),
            request,
            state: DownloadState::Pending,
            bytes_downloaded: 0,
            eta: None,
            last_modified: now,
            file_path: Some(file_path),
            chunks,
        }
    }

    /// Primary engine handle: the first piece's engine id.
    ///
    /// `None` until the engine accepts the enqueue.
    pub fn engine_id(&self) -> Option<EngineId> {
        self.chunks.first().and_then(|chunk| chunk.engine_id)
    }

    /// Index of the piece owning `engine_id`, if this record owns it.
    pub fn chunk_index(&self, engine_id: EngineId) -> Option<usize> {
        self.chunks
            .iter()
            .position(|chunk| chunk.engine_id == Some(engine_id))
    }

    /// Engine ids of every accepted piece, in byte order.
    pub fn engine_ids(&self) -> Vec<EngineId> {
        self.chunks
            .iter()
            .filter_map(|chunk| chunk.engine_id)
            .collect()
    }

    /// Engine ids of accepted pieces that have not completed yet.
    pub fn incomplete_engine_ids(&self) -> Vec<EngineId> {
        self.chunks
            .iter()
            .filter(|chunk| !chunk.completed)
            .filter_map(|chunk| chunk.engine_id)
            .collect()
    }

    /// True once every piece has completed.
    pub fn all_chunks_completed(&self) -> bool {
        self.chunks.iter().all(|chunk| chunk.completed)
    }

    /// Re-derive the aggregate byte counters from the per-piece ones.
    ///
    /// `total_bytes` is only replaced once every piece has a server-reported
    /// size; until then the catalog figure stands.
    pub fn recompute_progress(&mut self) {
        self.bytes_downloaded = self.chunks.iter().map(|chunk| chunk.bytes_downloaded).sum();
        let totals: Option<u64> = self.chunks.iter().map(|chunk| chunk.total_bytes).sum();
        if let Some(total) = totals {
            self.total_bytes = total;
        }
    }

    /// Whole-download completion percentage, clamped to 0-100.
    pub fn progress_percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 0;
        }
        ((self.bytes_downloaded * 100) / self.total_bytes).min(100) as u8
    }
}
