//! Reference transfer engine built on reqwest streaming.
//!
//! Each accepted submission runs as one tokio task that streams the ranged
//! response body into the destination file. The task honors cooperative
//! pause (a watch flag), cancellation (a token cut by `delete`), and a
//! bounded auto-retry budget with exponential backoff before it reports
//! failure.
//!
//! Resume is idempotent: every attempt measures the partial file on disk and
//! shifts the range start past the bytes already present, so a restarted
//! attempt never re-downloads data it has.
//!
//! The handle table lives in process memory only. Restarting the engine
//! loses every issued id — by design, this is the stale-handle scenario the
//! orchestrator recovers from.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures::StreamExt;
use parking_lot::Mutex;
use reqwest::header::RANGE;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::adapter::DEFAULT_EVENT_CAPACITY;
use super::traits::{BoxFuture, TransferEngine};
use super::types::{EngineCallback, EngineCallbackKind, EngineError, EngineId, EngineRequest};

/// Configuration for [`HttpTransferEngine`].
#[derive(Debug, Clone)]
pub struct HttpEngineConfig {
    /// Connection establishment timeout.
    pub connect_timeout: Duration,
    /// First auto-retry delay.
    pub initial_backoff: Duration,
    /// Ceiling for the auto-retry delay.
    pub max_backoff: Duration,
    /// Growth factor applied to the delay after each failed attempt.
    pub backoff_multiplier: f64,
    /// Capacity of the callback channel.
    pub event_capacity: usize,
}

impl Default for HttpEngineConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl HttpEngineConfig {
    /// Set the connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the initial auto-retry backoff.
    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    /// Set the auto-retry backoff ceiling.
    pub fn with_max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = backoff;
        self
    }
}

/// Live state of one accepted submission.
struct HandleState {
    request: EngineRequest,
    pause_tx: watch::Sender<bool>,
    cancel: CancellationToken,
    /// True while a transfer task for this handle is alive.
    running: AtomicBool,
}

/// Transfer engine performing real HTTP I/O with reqwest.
pub struct HttpTransferEngine {
    client: reqwest::Client,
    config: HttpEngineConfig,
    handles: Arc<DashMap<EngineId, Arc<HandleState>>>,
    next_id: AtomicU64,
    events_tx: mpsc::Sender<EngineCallback>,
    events_rx: Mutex<Option<mpsc::Receiver<EngineCallback>>>,
}

impl HttpTransferEngine {
    /// Build an engine from `config`.
    pub fn new(config: HttpEngineConfig) -> Result<Self, EngineError> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| EngineError::Network(format!("failed to build http client: {e}")))?;
        let (events_tx, events_rx) = mpsc::channel(config.event_capacity);

        Ok(Self {
            client,
            config,
            handles: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        })
    }

    /// Spawn the transfer task for `id`. Must run inside a tokio runtime.
    fn spawn_transfer(&self, id: EngineId, state: Arc<HandleState>) {
        state.running.store(true, Ordering::Release);
        let client = self.client.clone();
        let config = self.config.clone();
        let events = self.events_tx.clone();
        let handles = Arc::clone(&self.handles);
        tokio::spawn(async move {
            let completed = transfer_task(client, config, id, Arc::clone(&state), events).await;
            state.running.store(false, Ordering::Release);
            if completed {
                // A finished piece needs no further control; dropping the
                // handle here keeps the table bounded by in-flight work.
                // Later control calls for the id answer RequestDoesNotExist,
                // which callers already treat as already-done.
                handles.remove(&id);
            }
        });
    }
}

impl TransferEngine for HttpTransferEngine {
    fn submit(&self, request: EngineRequest) -> BoxFuture<'_, Result<EngineId, EngineError>> {
        Box::pin(async move {
            let id = EngineId(self.next_id.fetch_add(1, Ordering::Relaxed));
            let (pause_tx, _) = watch::channel(false);
            let state = Arc::new(HandleState {
                request,
                pause_tx,
                cancel: CancellationToken::new(),
                running: AtomicBool::new(false),
            });
            info!(
                engine_id = %id,
                url = %state.request.url,
                range = %state.request.range,
                "submission accepted"
            );
            self.handles.insert(id, Arc::clone(&state));
            self.spawn_transfer(id, state);
            Ok(id)
        })
    }

    fn delete(&self, id: EngineId) -> BoxFuture<'_, Result<(), EngineError>> {
        Box::pin(async move {
            let Some((_, state)) = self.handles.remove(&id) else {
                return Err(EngineError::RequestDoesNotExist);
            };
            state.cancel.cancel();
            // Partial file removal is best-effort; nothing references it
            // once the handle is gone.
            let _ = tokio::fs::remove_file(&state.request.file_path).await;
            debug!(engine_id = %id, "request deleted");
            let _ = self
                .events_tx
                .send(EngineCallback {
                    id,
                    kind: EngineCallbackKind::Deleted,
                })
                .await;
            Ok(())
        })
    }

    fn retry(&self, id: EngineId) -> BoxFuture<'_, Result<(), EngineError>> {
        Box::pin(async move {
            let Some(state) = self.handles.get(&id).map(|e| Arc::clone(e.value())) else {
                return Err(EngineError::RequestDoesNotExist);
            };
            if state.running.load(Ordering::Acquire) {
                // Still transferring, nothing to restart.
                return Ok(());
            }
            state.pause_tx.send_replace(false);
            debug!(engine_id = %id, "restarting failed transfer");
            self.spawn_transfer(id, state);
            Ok(())
        })
    }

    fn resume(&self, id: EngineId) -> BoxFuture<'_, Result<(), EngineError>> {
        Box::pin(async move {
            let Some(state) = self.handles.get(&id).map(|e| Arc::clone(e.value())) else {
                return Err(EngineError::RequestDoesNotExist);
            };
            state.pause_tx.send_replace(false);
            if !state.running.load(Ordering::Acquire) {
                // The task exited while paused or failed; pick it back up.
                self.spawn_transfer(id, state);
            }
            Ok(())
        })
    }

    fn pause(&self, id: EngineId) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if let Some(state) = self.handles.get(&id) {
                state.pause_tx.send_replace(true);
            }
        })
    }

    fn take_events(&self) -> Option<mpsc::Receiver<EngineCallback>> {
        self.events_rx.lock().take()
    }
}

/// Shift a planned range past `existing` bytes already on disk.
///
/// Returns `None` when the closed range is fully covered, meaning the piece
/// is already complete.
fn resumed_range(range: &str, existing: u64) -> Option<String> {
    let (start, end) = range.split_once('-').unwrap_or((range, ""));
    let start: u64 = start.parse().unwrap_or(0);
    let resumed = start + existing;
    if end.is_empty() {
        return Some(format!("{resumed}-"));
    }
    let end: u64 = end.parse().unwrap_or(u64::MAX);
    if resumed > end {
        None
    } else {
        Some(format!("{resumed}-{end}"))
    }
}

fn is_retryable(error: &EngineError) -> bool {
    match error {
        EngineError::Network(_) => true,
        EngineError::HttpStatus(status) => *status >= 500,
        _ => false,
    }
}

fn map_io_error(error: &std::io::Error) -> EngineError {
    if error.raw_os_error() == Some(28) {
        // ENOSPC
        EngineError::InsufficientSpace
    } else if error.kind() == std::io::ErrorKind::NotFound {
        EngineError::StorageNotFound
    } else {
        EngineError::File(error.to_string())
    }
}

fn map_reqwest_error(error: &reqwest::Error) -> EngineError {
    if error.is_redirect() {
        EngineError::TooManyRedirects
    } else if let Some(status) = error.status() {
        EngineError::HttpStatus(status.as_u16())
    } else {
        EngineError::Network(error.to_string())
    }
}

/// Result of one connection attempt.
enum Outcome {
    Completed(u64),
    Paused,
    Cancelled,
    Failed(EngineError),
}

/// Drive one submission to its end state. Returns `true` when the piece
/// completed.
async fn transfer_task(
    client: reqwest::Client,
    config: HttpEngineConfig,
    id: EngineId,
    state: Arc<HandleState>,
    events: mpsc::Sender<EngineCallback>,
) -> bool {
    let send = |kind: EngineCallbackKind| {
        let events = events.clone();
        async move {
            let _ = events.send(EngineCallback { id, kind }).await;
        }
    };

    send(EngineCallbackKind::Queued).await;

    let mut pause_rx = state.pause_tx.subscribe();
    let mut started_emitted = false;
    let mut attempts = 0u32;
    let mut backoff = config.initial_backoff;

    loop {
        if *pause_rx.borrow() {
            send(EngineCallbackKind::Paused).await;
            if !wait_unpaused(&mut pause_rx, &state.cancel).await {
                return false;
            }
            send(EngineCallbackKind::Resumed).await;
        }

        let outcome = run_attempt(
            &client,
            &state.request,
            id,
            &mut pause_rx,
            &state.cancel,
            &events,
            &mut started_emitted,
        )
        .await;

        match outcome {
            Outcome::Completed(bytes_downloaded) => {
                info!(engine_id = %id, bytes = bytes_downloaded, "transfer complete");
                send(EngineCallbackKind::Completed { bytes_downloaded }).await;
                return true;
            }
            Outcome::Cancelled => return false,
            Outcome::Paused => {
                send(EngineCallbackKind::Paused).await;
                if !wait_unpaused(&mut pause_rx, &state.cancel).await {
                    return false;
                }
                send(EngineCallbackKind::Resumed).await;
                // A pause costs no retry budget.
            }
            Outcome::Failed(error) if attempts < state.request.auto_retry_max_attempts
                && is_retryable(&error) =>
            {
                attempts += 1;
                warn!(
                    engine_id = %id,
                    attempt = attempts,
                    budget = state.request.auto_retry_max_attempts,
                    backoff_ms = backoff.as_millis() as u64,
                    %error,
                    "transfer attempt failed, retrying"
                );
                tokio::select! {
                    _ = state.cancel.cancelled() => return false,
                    _ = tokio::time::sleep(backoff) => {}
                }
                backoff = backoff.mul_f64(config.backoff_multiplier).min(config.max_backoff);
            }
            Outcome::Failed(error) => {
                warn!(engine_id = %id, %error, "transfer failed, budget exhausted");
                send(EngineCallbackKind::Error(error)).await;
                return false;
            }
        }
    }
}

/// Block until the pause flag drops or the handle is cancelled.
///
/// Returns `false` when cancelled or the handle was dropped.
async fn wait_unpaused(pause_rx: &mut watch::Receiver<bool>, cancel: &CancellationToken) -> bool {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return false,
            changed = pause_rx.changed() => {
                if changed.is_err() {
                    return false;
                }
                if !*pause_rx.borrow() {
                    return true;
                }
            }
        }
    }
}

async fn run_attempt(
    client: &reqwest::Client,
    request: &EngineRequest,
    id: EngineId,
    pause_rx: &mut watch::Receiver<bool>,
    cancel: &CancellationToken,
    events: &mpsc::Sender<EngineCallback>,
    started_emitted: &mut bool,
) -> Outcome {
    let existing = tokio::fs::metadata(&request.file_path)
        .await
        .map(|m| m.len())
        .unwrap_or(0);

    let Some(range) = resumed_range(&request.range, existing) else {
        // A previous run already downloaded the whole closed range.
        return Outcome::Completed(existing);
    };

    let response = tokio::select! {
        _ = cancel.cancelled() => return Outcome::Cancelled,
        result = client
            .get(&request.url)
            .header(RANGE, format!("bytes={range}"))
            .send() =>
        {
            match result {
                Ok(response) => response,
                Err(e) => return Outcome::Failed(map_reqwest_error(&e)),
            }
        }
    };

    let status = response.status();
    if status.as_u16() == 416 {
        return Outcome::Failed(EngineError::CannotResume);
    }
    if existing > 0 && status.as_u16() != 206 {
        // The server ignored the resume range; appending would corrupt the
        // piece.
        return Outcome::Failed(EngineError::CannotResume);
    }
    if !status.is_success() {
        return Outcome::Failed(EngineError::HttpStatus(status.as_u16()));
    }

    if !*started_emitted {
        *started_emitted = true;
        let _ = events
            .send(EngineCallback {
                id,
                kind: EngineCallbackKind::Started,
            })
            .await;
    }

    let total_bytes = response.content_length().map(|len| len + existing);

    if let Some(parent) = request.file_path.parent() {
        if let Err(e) = tokio::fs::create_dir_all(parent).await {
            return Outcome::Failed(map_io_error(&e));
        }
    }
    let open = if existing > 0 {
        tokio::fs::OpenOptions::new()
            .append(true)
            .open(&request.file_path)
            .await
    } else {
        tokio::fs::File::create(&request.file_path).await
    };
    let mut file = match open {
        Ok(file) => file,
        Err(e) => return Outcome::Failed(map_io_error(&e)),
    };

    let mut stream = response.bytes_stream();
    let mut downloaded = existing;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => return Outcome::Cancelled,

            changed = pause_rx.changed() => {
                if changed.is_err() {
                    return Outcome::Cancelled;
                }
                if *pause_rx.borrow() {
                    let _ = file.flush().await;
                    return Outcome::Paused;
                }
            }

            next = stream.next() => {
                match next {
                    Some(Ok(chunk)) => {
                        if let Err(e) = file.write_all(&chunk).await {
                            return Outcome::Failed(map_io_error(&e));
                        }
                        downloaded += chunk.len() as u64;
                        let _ = events
                            .send(EngineCallback {
                                id,
                                kind: EngineCallbackKind::Progress {
                                    bytes_downloaded: downloaded,
                                    total_bytes,
                                },
                            })
                            .await;
                    }
                    Some(Err(e)) => return Outcome::Failed(map_reqwest_error(&e)),
                    None => {
                        if let Err(e) = file.flush().await {
                            return Outcome::Failed(map_io_error(&e));
                        }
                        return Outcome::Completed(downloaded);
                    }
                }
            }
        }
    }
}
