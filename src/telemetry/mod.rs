//! Download telemetry for observability and user feedback.
//!
//! Lock-free atomic counters recorded by the orchestrator and its monitor
//! task, copied out as a point-in-time [`TelemetrySnapshot`] for display.
//! Recording is cheap enough to sit on the event path.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the download subsystem.
///
/// Shared as `Arc<DownloadMetrics>` between the orchestrator and the
/// monitor task; every method is a relaxed atomic update.
#[derive(Debug, Default)]
pub struct DownloadMetrics {
    downloads_enqueued: AtomicU64,
    downloads_completed: AtomicU64,
    downloads_failed: AtomicU64,
    events_processed: AtomicU64,
    events_dropped: AtomicU64,
    stale_handles_recovered: AtomicU64,
}

impl DownloadMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new download record was persisted and submitted.
    pub fn download_enqueued(&self) {
        self.downloads_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    /// A download reached `Successful`.
    pub fn download_completed(&self) {
        self.downloads_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// A download reached `Failed`.
    pub fn download_failed(&self) {
        self.downloads_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// One normalized event was reduced and its effects applied.
    pub fn event_processed(&self) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// An event referenced no known record and was dropped.
    pub fn event_dropped(&self) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// A stale engine handle was recovered by re-enqueueing.
    pub fn stale_handle_recovered(&self) {
        self.stale_handles_recovered.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy the current counter values.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            downloads_enqueued: self.downloads_enqueued.load(Ordering::Relaxed),
            downloads_completed: self.downloads_completed.load(Ordering::Relaxed),
            downloads_failed: self.downloads_failed.load(Ordering::Relaxed),
            events_processed: self.events_processed.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            stale_handles_recovered: self.stale_handles_recovered.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`DownloadMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub downloads_enqueued: u64,
    pub downloads_completed: u64,
    pub downloads_failed: u64,
    pub events_processed: u64,
    pub events_dropped: u64,
    pub stale_handles_recovered: u64,
}
