//! Normalization layer between a transfer engine and the state machine.
//!
//! Engines report nine raw callback kinds; downstream code wants eight
//! normalized events in one ordered stream. The adapter owns that mapping
//! and pumps every callback onto a single bounded channel, which is the
//! serialization point that keeps record writes single-writer: no matter
//! how many tasks the engine runs, events leave here one at a time.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::download::{DownloadEvent, TransferEvent};

use super::traits::TransferEngine;
use super::types::{EngineCallback, EngineCallbackKind};

/// Default capacity of the normalized event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

/// Pumps raw engine callbacks into one normalized event stream.
pub struct TransferEngineAdapter {
    engine: Arc<dyn TransferEngine>,
    capacity: usize,
}

impl TransferEngineAdapter {
    pub fn new(engine: Arc<dyn TransferEngine>) -> Self {
        Self {
            engine,
            capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Set the normalized channel capacity.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Take the engine's callback stream and start the pump task.
    ///
    /// Returns the single normalized stream, or `None` if the engine's
    /// stream was already claimed (the pump can only run once per engine).
    /// Must be called from within a Tokio runtime.
    pub fn start(&self, shutdown: CancellationToken) -> Option<mpsc::Receiver<TransferEvent>> {
        let raw = self.engine.take_events()?;
        let (tx, rx) = mpsc::channel(self.capacity);
        tokio::spawn(pump(raw, tx, shutdown));
        Some(rx)
    }
}

/// Map one raw callback kind to its normalized event.
///
/// `Deleted` and `Removed` collapse into [`DownloadEvent::Removed`];
/// `Error` becomes [`DownloadEvent::Failed`] with the engine error folded
/// into a failure reason.
pub fn normalize(kind: EngineCallbackKind) -> DownloadEvent {
    match kind {
        EngineCallbackKind::Queued => DownloadEvent::Queued,
        EngineCallbackKind::Started => DownloadEvent::Started,
        EngineCallbackKind::Progress {
            bytes_downloaded,
            total_bytes,
        } => DownloadEvent::Progressed {
            bytes_downloaded,
            total_bytes,
            eta: None,
        },
        EngineCallbackKind::Paused => DownloadEvent::Paused,
        EngineCallbackKind::Resumed => DownloadEvent::Resumed,
        EngineCallbackKind::Error(error) => DownloadEvent::Failed(error.into()),
        EngineCallbackKind::Completed { bytes_downloaded } => {
            DownloadEvent::Completed { bytes_downloaded }
        }
        EngineCallbackKind::Deleted | EngineCallbackKind::Removed => DownloadEvent::Removed,
    }
}

async fn pump(
    mut raw: mpsc::Receiver<EngineCallback>,
    tx: mpsc::Sender<TransferEvent>,
    shutdown: CancellationToken,
) {
    debug!("transfer event pump started");
    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                debug!("transfer event pump shutting down");
                break;
            }

            maybe_callback = raw.recv() => {
                match maybe_callback {
                    Some(callback) => {
                        let event = TransferEvent::new(callback.id, normalize(callback.kind));
                        if tx.send(event).await.is_err() {
                            debug!("normalized event consumer dropped, pump exiting");
                            break;
                        }
                    }
                    None => {
                        debug!("engine callback stream closed, pump exiting");
                        break;
                    }
                }
            }
        }
    }
}
