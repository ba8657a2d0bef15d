//! Persistent download record storage.
//!
//! The store is the single source of truth for download state. Only the
//! orchestrator writes to it; every mutation is one atomic upsert or delete
//! keyed by [`DownloadId`]. Readers observe snapshots through a watch
//! channel, never the records themselves.
//!
//! Two implementations ship:
//! - [`MemoryStore`] for tests and embedded callers that do not need
//!   durability
//! - [`JsonFileStore`], which snapshots every change to a JSON file with a
//!   temp-file-then-rename write so the record set survives process death
//!   intact

mod json;
mod memory;

pub use json::JsonFileStore;
pub use memory::MemoryStore;

use thiserror::Error;
use tokio::sync::watch;

use crate::download::{DownloadId, DownloadRecord};
use crate::engine::{BoxFuture, EngineId};

/// Errors from the persistent store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("store i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The backing file holds data serde cannot round-trip.
    #[error("store serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Durable keyed storage for download records.
///
/// Object-safe so the orchestrator can hold `Arc<dyn DownloadStore>`;
/// async methods return boxed futures.
pub trait DownloadStore: Send + Sync {
    /// Insert or replace the record keyed by its id.
    ///
    /// Implementations skip the write (and the watch publication) when the
    /// stored record is already identical.
    fn upsert(&self, record: DownloadRecord) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Remove the record keyed by `id`. Removing an absent id is a no-op.
    fn delete(&self, id: DownloadId) -> BoxFuture<'_, Result<(), StoreError>>;

    /// Fetch one record by its local id.
    fn get(&self, id: DownloadId) -> BoxFuture<'_, Result<Option<DownloadRecord>, StoreError>>;

    /// Fetch the record owning an engine-assigned chunk id.
    fn get_by_engine_id(
        &self,
        engine_id: EngineId,
    ) -> BoxFuture<'_, Result<Option<DownloadRecord>, StoreError>>;

    /// Snapshot of every record, ordered by id.
    fn all(&self) -> BoxFuture<'_, Result<Vec<DownloadRecord>, StoreError>>;

    /// Subscribe to record-set snapshots for UI binding.
    ///
    /// The receiver holds the latest full snapshot; a new one is published
    /// after every effective mutation.
    fn watch(&self) -> watch::Receiver<Vec<DownloadRecord>>;
}
