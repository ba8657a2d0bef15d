//! The monitor task: the single consumer of normalized transfer events.
//!
//! Every event is routed to the record owning its engine id, reduced through
//! the pure state machine, and the resulting effects applied to the store.
//! Because exactly one monitor runs per orchestrator, record writes stay
//! single-writer without any locking on the store side.
//!
//! The monitor also owns ETA estimation: it remembers when each download
//! started producing bytes and attaches a throughput-derived estimate to
//! `Progressed` events before reduction. A periodic tick prunes estimation
//! samples for downloads that stopped running.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::download::{reduce, DownloadEvent, DownloadId, DownloadRecord, DownloadState, Effect, TransferEvent};
use crate::engine::EngineId;
use crate::store::{DownloadStore, StoreError};
use crate::telemetry::DownloadMetrics;

/// Re-check budget for events that arrive before their handle is persisted.
///
/// An engine may emit for a freshly issued id while the orchestrator's
/// handle upsert is still in flight; the write lands within microseconds,
/// so a handful of short re-checks covers the window without stalling the
/// event stream on genuinely stale ids.
const UNKNOWN_HANDLE_RECHECKS: u32 = 3;
const UNKNOWN_HANDLE_RECHECK_DELAY: Duration = Duration::from_millis(5);

/// First observation of a download's byte flow.
struct ThroughputSample {
    started: Instant,
    initial_bytes: u64,
}

/// Per-download throughput bookkeeping for ETA estimates.
#[derive(Default)]
pub(crate) struct EtaTracker {
    samples: HashMap<DownloadId, ThroughputSample>,
}

impl EtaTracker {
    /// Estimate time to completion from bytes observed since the first
    /// sample. `None` until at least a second of flow has been seen, or
    /// when the total is unknown.
    fn eta(&mut self, id: DownloadId, bytes_now: u64, total_bytes: u64) -> Option<Duration> {
        let sample = self.samples.entry(id).or_insert_with(|| ThroughputSample {
            started: Instant::now(),
            initial_bytes: bytes_now,
        });

        if total_bytes == 0 || bytes_now >= total_bytes {
            return None;
        }
        let elapsed = sample.started.elapsed();
        let delta = bytes_now.saturating_sub(sample.initial_bytes);
        if elapsed < Duration::from_secs(1) || delta == 0 {
            return None;
        }

        let rate = delta as f64 / elapsed.as_secs_f64();
        let remaining = (total_bytes - bytes_now) as f64;
        Some(Duration::from_secs_f64(remaining / rate))
    }

    fn forget(&mut self, id: DownloadId) {
        self.samples.remove(&id);
    }

    /// Drop samples for downloads that are gone or no longer running.
    fn prune(&mut self, records: &[DownloadRecord]) {
        self.samples.retain(|id, _| {
            records
                .iter()
                .any(|r| r.id == *id && r.state == DownloadState::Running)
        });
    }
}

/// Consume normalized events until shutdown.
pub(crate) async fn run_monitor(
    store: Arc<dyn DownloadStore>,
    mut events: mpsc::Receiver<TransferEvent>,
    tick: Duration,
    metrics: Arc<DownloadMetrics>,
    shutdown: CancellationToken,
) {
    info!("download monitor started");
    let mut tracker = EtaTracker::default();
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                info!("download monitor shutting down");
                break;
            }

            maybe_event = events.recv() => {
                match maybe_event {
                    Some(event) => {
                        handle_event(store.as_ref(), &mut tracker, &metrics, event).await;
                    }
                    None => {
                        info!("event stream closed, download monitor exiting");
                        break;
                    }
                }
            }

            _ = ticker.tick() => {
                housekeep(store.as_ref(), &mut tracker).await;
            }
        }
    }
}

/// Look up the record owning `engine_id`, re-checking briefly when the
/// first lookup misses.
async fn lookup_record(
    store: &dyn DownloadStore,
    engine_id: EngineId,
) -> Result<Option<DownloadRecord>, StoreError> {
    for _ in 0..UNKNOWN_HANDLE_RECHECKS {
        if let Some(record) = store.get_by_engine_id(engine_id).await? {
            return Ok(Some(record));
        }
        tokio::time::sleep(UNKNOWN_HANDLE_RECHECK_DELAY).await;
    }
    store.get_by_engine_id(engine_id).await
}

async fn handle_event(
    store: &dyn DownloadStore,
    tracker: &mut EtaTracker,
    metrics: &DownloadMetrics,
    event: TransferEvent,
) {
    let record = match lookup_record(store, event.engine_id).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            // A handle from before a re-enqueue, or an engine-private
            // transfer we never recorded. Either way, not ours to apply.
            warn!(engine_id = %event.engine_id, kind = ?event.event,
                "dropping event for unknown record");
            metrics.event_dropped();
            return;
        }
        Err(e) => {
            error!(engine_id = %event.engine_id, error = %e,
                "store lookup failed, record left in last known state");
            return;
        }
    };

    let event = attach_eta(tracker, &record, event);
    let transition = reduce(&record, &event, Utc::now());
    metrics.event_processed();
    if transition.is_noop() {
        return;
    }

    for effect in &transition.effects {
        let result = match effect {
            Effect::Persist => store.upsert(transition.record.clone()).await,
            Effect::Delete => {
                tracker.forget(record.id);
                store.delete(record.id).await
            }
        };
        if let Err(e) = result {
            error!(id = %record.id, error = %e,
                "failed to apply effect, record left in last known state");
            return;
        }
    }

    match &transition.record.state {
        DownloadState::Successful if record.state != DownloadState::Successful => {
            info!(id = %record.id, bytes = transition.record.bytes_downloaded,
                "download complete");
            tracker.forget(record.id);
            metrics.download_completed();
        }
        DownloadState::Failed(reason) if !matches!(record.state, DownloadState::Failed(_)) => {
            warn!(id = %record.id, %reason, "download failed");
            tracker.forget(record.id);
            metrics.download_failed();
        }
        _ => {}
    }
}

/// Replace a `Progressed` event's empty ETA with a throughput estimate.
fn attach_eta(tracker: &mut EtaTracker, record: &DownloadRecord, event: TransferEvent) -> TransferEvent {
    let DownloadEvent::Progressed {
        bytes_downloaded,
        total_bytes,
        ..
    } = event.event
    else {
        return event;
    };
    let Some(index) = record.chunk_index(event.engine_id) else {
        return event;
    };

    // Project the whole-download byte count as it will stand after this
    // event is applied.
    let previous = record.chunks[index].bytes_downloaded;
    let projected = record.bytes_downloaded - previous + bytes_downloaded;
    let eta = tracker.eta(record.id, projected, record.total_bytes);

    TransferEvent::new(
        event.engine_id,
        DownloadEvent::Progressed {
            bytes_downloaded,
            total_bytes,
            eta,
        },
    )
}

async fn housekeep(store: &dyn DownloadStore, tracker: &mut EtaTracker) {
    match store.all().await {
        Ok(records) => {
            tracker.prune(&records);
            let active = records
                .iter()
                .filter(|r| r.state == DownloadState::Running)
                .count();
            debug!(active, "monitor tick");
        }
        Err(e) => error!(error = %e, "store snapshot failed during monitor tick"),
    }
}
