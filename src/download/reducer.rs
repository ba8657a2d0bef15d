//! Pure state reduction for download events.
//!
//! `reduce` is the only place download state transitions are decided. It
//! performs no I/O and reads no clock (the caller passes `now`), so any
//! (record, event) pair can be replayed in a test and always produces the
//! same transition.
//!
//! The legal transitions:
//!
//! ```text
//! Pending   --Queued/Started--> Running
//! Running   --Progressed-->     Running   (bytes/eta updated)
//! Running   --Paused-->         Paused
//! Paused    --Resumed-->        Running
//! Running   --Failed-->         Failed
//! Running   --Completed-->      Successful  (once every piece is complete)
//! Failed    --(user retry)-->   Pending     (orchestrator-driven, not an event)
//! *         --Removed-->        (record deleted)
//! ```
//!
//! `Successful` is terminal: every event, `Removed` included, is ignored
//! there — this is what makes a cancel that races a completion resolve to
//! the completed state. Events that fit no arm fall through as no-ops.

use chrono::{DateTime, Utc};

use super::event::{DownloadEvent, TransferEvent};
use super::record::DownloadRecord;
use super::state::DownloadState;

/// Side effect the orchestrator must apply after a reduction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Upsert the transition's record into the persistent store.
    Persist,
    /// Delete the record from the persistent store.
    Delete,
}

/// Outcome of reducing one event against one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// The record after the event. Unchanged for ignored events.
    pub record: DownloadRecord,
    /// Effects to apply, in order. Empty for ignored events.
    pub effects: Vec<Effect>,
}

impl Transition {
    fn ignore(record: &DownloadRecord) -> Self {
        Self {
            record: record.clone(),
            effects: Vec::new(),
        }
    }

    fn persist(record: DownloadRecord) -> Self {
        Self {
            record,
            effects: vec![Effect::Persist],
        }
    }

    /// True when the event changed nothing.
    pub fn is_noop(&self) -> bool {
        self.effects.is_empty()
    }
}

/// Reduce one normalized event against the record that owns its engine id.
pub fn reduce(record: &DownloadRecord, event: &TransferEvent, now: DateTime<Utc>) -> Transition {
    if record.state.is_terminal() {
        return Transition::ignore(record);
    }
    let Some(index) = record.chunk_index(event.engine_id) else {
        // Engine id not part of this record: stale chunk from before a
        // re-enqueue. Dropped here, logged by the caller.
        return Transition::ignore(record);
    };
    if matches!(event.event, DownloadEvent::Removed) {
        return Transition {
            record: record.clone(),
            effects: vec![Effect::Delete],
        };
    }

    let mut next = record.clone();
    next.last_modified = now;

    match (&record.state, &event.event) {
        // Start confirmations, including after a user retry or resume.
        (
            DownloadState::Pending | DownloadState::Paused | DownloadState::Failed(_),
            DownloadEvent::Queued | DownloadEvent::Started,
        ) => {
            next.state = DownloadState::Running;
            Transition::persist(next)
        }

        (
            DownloadState::Running,
            DownloadEvent::Progressed {
                bytes_downloaded,
                total_bytes,
                eta,
            },
        ) => {
            let chunk = &mut next.chunks[index];
            chunk.bytes_downloaded = *bytes_downloaded;
            if total_bytes.is_some() {
                chunk.total_bytes = *total_bytes;
            }
            next.recompute_progress();
            next.eta = *eta;
            Transition::persist(next)
        }

        (DownloadState::Running, DownloadEvent::Paused) => {
            next.state = DownloadState::Paused;
            next.eta = None;
            Transition::persist(next)
        }

        (DownloadState::Paused, DownloadEvent::Resumed) => {
            next.state = DownloadState::Running;
            Transition::persist(next)
        }

        (
            DownloadState::Pending | DownloadState::Running | DownloadState::Paused,
            DownloadEvent::Failed(reason),
        ) => {
            next.state = DownloadState::Failed(reason.clone());
            next.eta = None;
            Transition::persist(next)
        }

        // Piece completion is bookkept from any non-terminal state; the
        // record only turns Successful once every piece is in.
        (_, DownloadEvent::Completed { bytes_downloaded }) => {
            let chunk = &mut next.chunks[index];
            chunk.bytes_downloaded = *bytes_downloaded;
            chunk.total_bytes = Some(*bytes_downloaded);
            chunk.completed = true;
            next.recompute_progress();
            if next.all_chunks_completed() && !matches!(next.state, DownloadState::Failed(_)) {
                next.state = DownloadState::Successful;
                next.eta = None;
            }
            Transition::persist(next)
        }

        // Duplicate start signals, late progress while paused, repeated
        // pause/resume, failure reports on an already failed record.
        _ => Transition::ignore(record),
    }
}
