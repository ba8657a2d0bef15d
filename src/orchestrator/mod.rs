//! Download orchestration.
//!
//! [`DownloadOrchestrator`] is the only component with external side effects
//! for downloads. It turns caller requests into persisted records and engine
//! submissions, and drives the pure state machine from the normalized event
//! stream via a lazily started monitor task.
//!
//! # Stale handles
//!
//! Engine ids die with the engine instance that issued them. When a control
//! call answers `RequestDoesNotExist`, the orchestrator recovers from the
//! persisted record instead of surfacing the error:
//! - **cancel**: the engine already forgot the transfer, so the local record
//!   is deleted directly — the store never keeps a record the engine
//!   disavows
//! - **retry / resume**: the request snapshot in the record is re-enqueued
//!   fresh under the same download id
//!
//! # Single-writer store discipline
//!
//! Control operations write records only at well-defined points (creation,
//! submission-failure, replacement); everything event-driven goes through
//! the monitor task, which is the sole consumer of the normalized stream.

mod config;
mod monitor;

pub use config::{OrchestratorConfig, DEFAULT_MONITOR_TICK};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::chunk::{plan, ChunkDescriptor, PlanError};
use crate::download::{
    ChunkProgress, DownloadId, DownloadRecord, DownloadRequest, DownloadState,
};
use crate::engine::{EngineError, EngineRequest, TransferEngine, TransferEngineAdapter};
use crate::store::{DownloadStore, StoreError};
use crate::telemetry::{DownloadMetrics, TelemetrySnapshot};

/// Errors surfaced by orchestrator operations.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// No persisted record exists for the id.
    #[error("unknown download id {0}")]
    UnknownDownload(DownloadId),

    /// Chunk planning rejected the request.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// The engine failed a control call with something other than a stale
    /// handle.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// The persistent store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Owner of all download side effects.
///
/// Constructed from an injected engine and store; holds no global state.
/// All operations fire their engine calls and return without awaiting
/// transfer completion.
pub struct DownloadOrchestrator {
    engine: Arc<dyn TransferEngine>,
    store: Arc<dyn DownloadStore>,
    adapter: TransferEngineAdapter,
    config: OrchestratorConfig,
    next_id: AtomicU64,
    monitor: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
    metrics: Arc<DownloadMetrics>,
}

impl DownloadOrchestrator {
    /// Build an orchestrator over `engine` and `store`.
    ///
    /// Reads the store once to seed the download id counter past any
    /// persisted record, so ids stay unique across restarts.
    pub async fn new(
        engine: Arc<dyn TransferEngine>,
        store: Arc<dyn DownloadStore>,
        config: OrchestratorConfig,
    ) -> Result<Self, OrchestratorError> {
        let max_id = store
            .all()
            .await?
            .iter()
            .map(|record| record.id.0)
            .max()
            .unwrap_or(0);
        let adapter =
            TransferEngineAdapter::new(Arc::clone(&engine)).with_capacity(config.event_capacity);

        Ok(Self {
            engine,
            store,
            adapter,
            config,
            next_id: AtomicU64::new(max_id + 1),
            monitor: Mutex::new(None),
            shutdown: CancellationToken::new(),
            metrics: Arc::new(DownloadMetrics::new()),
        })
    }

    /// Persist a `Pending` record for `request` and submit its chunks.
    ///
    /// Returns the download id immediately; transfer lifecycle arrives
    /// through the store's watch stream. A live (non-terminal) record for
    /// the same URL is not duplicated — its id is returned instead.
    pub async fn enqueue(&self, request: DownloadRequest) -> Result<DownloadId, OrchestratorError> {
        if let Some(existing) = self
            .store
            .all()
            .await?
            .into_iter()
            .find(|record| record.request.url == request.url && !record.state.is_terminal())
        {
            debug!(id = %existing.id, url = %request.url,
                "enqueue suppressed, download already live");
            return Ok(existing.id);
        }

        let id = DownloadId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let chunks = plan(&request.url, request.expected_size.unwrap_or(0), id)?;
        let progress = chunks.iter().map(ChunkProgress::from).collect();
        let record = DownloadRecord::new(id, request, progress, Utc::now());

        info!(%id, url = %record.request.url, chunks = chunks.len(), "enqueueing download");
        self.store.upsert(record.clone()).await?;
        self.ensure_monitor();
        self.metrics.download_enqueued();

        self.submit_chunks(record, &chunks).await?;
        Ok(id)
    }

    /// Cancel a download and delete its record.
    ///
    /// Engine-side removal is confirmed through `Removed` events; handles
    /// the engine already disavows count as removed. Cancelling an id with
    /// no record is a silent no-op.
    pub async fn cancel(&self, id: DownloadId) -> Result<(), OrchestratorError> {
        self.ensure_monitor();
        let Some(record) = self.store.get(id).await? else {
            debug!(%id, "cancel of unknown download, nothing to do");
            return Ok(());
        };

        let engine_ids = record.engine_ids();
        if engine_ids.is_empty() {
            // Never accepted by the engine; there is nothing to tear down.
            self.store.delete(id).await?;
            return Ok(());
        }

        let mut any_deleted = false;
        for engine_id in engine_ids {
            match self.engine.delete(engine_id).await {
                Ok(()) => any_deleted = true,
                Err(EngineError::RequestDoesNotExist) => {
                    warn!(%id, %engine_id,
                        "engine disavowed handle during cancel, treating as already removed");
                }
                Err(error) => return Err(error.into()),
            }
        }

        if !any_deleted {
            // Every handle was stale: the store must not keep a record the
            // engine disavows.
            self.store.delete(id).await?;
        }
        Ok(())
    }

    /// Retry a failed download.
    ///
    /// Incomplete chunks are retried on their existing handles; a stale
    /// handle triggers a fresh re-enqueue from the persisted request
    /// snapshot under the same id. Fails with
    /// [`OrchestratorError::UnknownDownload`] when no record exists.
    pub async fn retry_download(&self, id: DownloadId) -> Result<(), OrchestratorError> {
        self.ensure_monitor();
        let Some(record) = self.store.get(id).await? else {
            return Err(OrchestratorError::UnknownDownload(id));
        };

        let targets = record.incomplete_engine_ids();
        if targets.is_empty() {
            // The enqueue never got engine handles; start over.
            return self.reenqueue(record).await;
        }

        for engine_id in &targets {
            match self.engine.retry(*engine_id).await {
                Ok(()) => {}
                Err(EngineError::RequestDoesNotExist) => {
                    info!(%id, %engine_id,
                        "stale engine handle on retry, re-enqueueing from persisted record");
                    self.metrics.stale_handle_recovered();
                    return self.reenqueue(record).await;
                }
                Err(error) => return Err(error.into()),
            }
        }

        // The transition out of Failed is user-driven, not event-driven:
        // the record must read as retried even before the engine's start
        // confirmations arrive.
        if matches!(record.state, DownloadState::Failed(_)) {
            let mut retried = record;
            retried.state = DownloadState::Pending;
            retried.eta = None;
            retried.last_modified = Utc::now();
            self.store.upsert(retried).await?;
        }
        Ok(())
    }

    /// Pause (`pause == true`) or resume a download.
    ///
    /// Pausing is fire-and-forget: pausing a handle the engine no longer
    /// knows is harmless. Resuming follows the same stale-handle recovery
    /// as [`retry_download`](Self::retry_download).
    pub async fn pause_resume_download(
        &self,
        id: DownloadId,
        pause: bool,
    ) -> Result<(), OrchestratorError> {
        self.ensure_monitor();
        let Some(record) = self.store.get(id).await? else {
            return Err(OrchestratorError::UnknownDownload(id));
        };

        if pause {
            for engine_id in record.incomplete_engine_ids() {
                self.engine.pause(engine_id).await;
            }
            return Ok(());
        }

        let targets = record.incomplete_engine_ids();
        if targets.is_empty() {
            return self.reenqueue(record).await;
        }
        for engine_id in targets {
            match self.engine.resume(engine_id).await {
                Ok(()) => {}
                Err(EngineError::RequestDoesNotExist) => {
                    info!(%id, %engine_id,
                        "stale engine handle on resume, re-enqueueing from persisted record");
                    self.metrics.stale_handle_recovered();
                    return self.reenqueue(record).await;
                }
                Err(error) => return Err(error.into()),
            }
        }
        Ok(())
    }

    /// Read-only record snapshots for UI binding.
    pub fn watch_downloads(&self) -> watch::Receiver<Vec<DownloadRecord>> {
        self.store.watch()
    }

    /// Current telemetry counters.
    pub fn metrics(&self) -> TelemetrySnapshot {
        self.metrics.snapshot()
    }

    /// Stop the monitor and the event pump.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Replace `record` with a fresh submission under the same id.
    async fn reenqueue(&self, record: DownloadRecord) -> Result<(), OrchestratorError> {
        let id = record.id;
        let request = record.request;
        self.store.delete(id).await?;

        let chunks = plan(&request.url, request.expected_size.unwrap_or(0), id)?;
        let progress = chunks.iter().map(ChunkProgress::from).collect();
        let fresh = DownloadRecord::new(id, request, progress, Utc::now());

        info!(%id, url = %fresh.request.url, chunks = chunks.len(), "re-enqueueing download");
        self.store.upsert(fresh.clone()).await?;
        self.submit_chunks(fresh, &chunks).await
    }

    /// Submit every chunk, persisting each engine id as soon as the engine
    /// issues it, or the failure that stopped submission.
    ///
    /// The engine may emit callbacks for a handle the moment `submit`
    /// resolves, and the monitor can only route events whose handle it can
    /// look up, so each id must hit the store before the next submission.
    /// Writes merge into the latest persisted snapshot: the monitor may
    /// already have applied events for earlier chunks.
    async fn submit_chunks(
        &self,
        record: DownloadRecord,
        chunks: &[ChunkDescriptor<DownloadId>],
    ) -> Result<(), OrchestratorError> {
        let id = record.id;
        for (index, chunk) in chunks.iter().enumerate() {
            let engine_request = EngineRequest::new(
                &chunk.url,
                record.request.destination_dir.join(&chunk.file_name),
            )
            .with_range(&chunk.range)
            .with_network(record.request.network)
            .with_auto_retry_max_attempts(self.config.auto_retry_max_attempts)
            .with_tag(chunk.tag.to_string());

            match self.engine.submit(engine_request).await {
                Ok(engine_id) => {
                    let Some(mut current) = self.store.get(id).await? else {
                        // Cancelled while submitting; stop here.
                        debug!(%id, chunk = index, "record gone mid-submission");
                        return Ok(());
                    };
                    current.chunks[index].engine_id = Some(engine_id);
                    self.store.upsert(current).await?;
                }
                Err(error) => {
                    warn!(%id, chunk = index, %error, "chunk submission failed");
                    if let Some(mut current) = self.store.get(id).await? {
                        current.state = DownloadState::Failed(error.into());
                        current.last_modified = Utc::now();
                        self.store.upsert(current).await?;
                    }
                    self.metrics.download_failed();
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Start the monitor task once; later calls are no-ops.
    fn ensure_monitor(&self) {
        let mut guard = self.monitor.lock();
        if guard.is_some() {
            return;
        }
        match self.adapter.start(self.shutdown.clone()) {
            Some(events) => {
                *guard = Some(tokio::spawn(monitor::run_monitor(
                    Arc::clone(&self.store),
                    events,
                    self.config.monitor_tick,
                    Arc::clone(&self.metrics),
                    self.shutdown.clone(),
                )));
            }
            None => {
                warn!("engine callback stream already claimed, monitor not started");
            }
        }
    }
}
