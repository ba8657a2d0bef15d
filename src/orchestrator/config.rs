//! Orchestrator configuration.

use std::time::Duration;

use crate::engine::{AUTO_RETRY_MAX_ATTEMPTS, DEFAULT_EVENT_CAPACITY};

/// Default cadence for the monitor's housekeeping tick.
pub const DEFAULT_MONITOR_TICK: Duration = Duration::from_secs(5);

/// Configuration for [`DownloadOrchestrator`](super::DownloadOrchestrator).
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Monitor housekeeping interval (throughput-sample pruning).
    pub monitor_tick: Duration,
    /// Capacity of the normalized event channel.
    pub event_capacity: usize,
    /// Retry budget handed to the engine with every chunk submission.
    pub auto_retry_max_attempts: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            monitor_tick: DEFAULT_MONITOR_TICK,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            auto_retry_max_attempts: AUTO_RETRY_MAX_ATTEMPTS,
        }
    }
}

impl OrchestratorConfig {
    /// Set the monitor tick interval.
    pub fn with_monitor_tick(mut self, tick: Duration) -> Self {
        self.monitor_tick = tick;
        self
    }

    /// Set the normalized event channel capacity.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Set the engine-side retry budget per chunk.
    pub fn with_auto_retry_max_attempts(mut self, attempts: u32) -> Self {
        self.auto_retry_max_attempts = attempts;
        self
    }
}
