//! In-memory download store.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use tokio::sync::watch;

use crate::download::{DownloadId, DownloadRecord};
use crate::engine::{BoxFuture, EngineId};

use super::{DownloadStore, StoreError};

/// Non-durable store backed by a map behind a read/write lock.
///
/// Suitable for tests and for embedded callers whose download state does not
/// need to outlive the process. The lock is never held across an await.
pub struct MemoryStore {
    records: RwLock<BTreeMap<DownloadId, DownloadRecord>>,
    watch_tx: watch::Sender<Vec<DownloadRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (watch_tx, _) = watch::channel(Vec::new());
        Self {
            records: RwLock::new(BTreeMap::new()),
            watch_tx,
        }
    }

    fn snapshot(&self) -> Vec<DownloadRecord> {
        self.records.read().values().cloned().collect()
    }

    fn publish(&self) {
        self.watch_tx.send_replace(self.snapshot());
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadStore for MemoryStore {
    fn upsert(&self, record: DownloadRecord) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let changed = {
                let mut records = self.records.write();
                if records.get(&record.id) == Some(&record) {
                    false
                } else {
                    records.insert(record.id, record);
                    true
                }
            };
            if changed {
                self.publish();
            }
            Ok(())
        })
    }

    fn delete(&self, id: DownloadId) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let removed = self.records.write().remove(&id).is_some();
            if removed {
                self.publish();
            }
            Ok(())
        })
    }

    fn get(&self, id: DownloadId) -> BoxFuture<'_, Result<Option<DownloadRecord>, StoreError>> {
        Box::pin(async move { Ok(self.records.read().get(&id).cloned()) })
    }

    fn get_by_engine_id(
        &self,
        engine_id: EngineId,
    ) -> BoxFuture<'_, Result<Option<DownloadRecord>, StoreError>> {
        Box::pin(async move {
            Ok(self
                .records
                .read()
                .values()
                .find(|record| record.chunk_index(engine_id).is_some())
                .cloned())
        })
    }

    fn all(&self) -> BoxFuture<'_, Result<Vec<DownloadRecord>, StoreError>> {
        Box::pin(async move { Ok(self.snapshot()) })
    }

    fn watch(&self) -> watch::Receiver<Vec<DownloadRecord>> {
        self.watch_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::{ChunkProgress, DownloadRequest, DownloadState};
    use chrono::Utc;

    fn record(id: u64, engine_id: u64) -> DownloadRecord {
        let mut chunk = ChunkProgress::new("a.zim.part.part", "0-");
        chunk.engine_id = Some(EngineId(engine_id));
        DownloadRecord::new(
            DownloadId(id),
            DownloadRequest::new("https://mirror.example.org/a.zim", "/data/library"),
            vec![chunk],
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_upsert_get_delete_roundtrip() {
        let store = MemoryStore::new();
        store.upsert(record(1, 11)).await.unwrap();

        let fetched = store.get(DownloadId(1)).await.unwrap().unwrap();
        assert_eq!(fetched.id, DownloadId(1));

        store.delete(DownloadId(1)).await.unwrap();
        assert!(store.get(DownloadId(1)).await.unwrap().is_none());
        // Deleting again is a no-op.
        store.delete(DownloadId(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_get_by_engine_id() {
        let store = MemoryStore::new();
        store.upsert(record(1, 11)).await.unwrap();
        store.upsert(record(2, 12)).await.unwrap();

        let found = store.get_by_engine_id(EngineId(12)).await.unwrap().unwrap();
        assert_eq!(found.id, DownloadId(2));
        assert!(store.get_by_engine_id(EngineId(99)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_all_ordered_by_id() {
        let store = MemoryStore::new();
        store.upsert(record(2, 12)).await.unwrap();
        store.upsert(record(1, 11)).await.unwrap();

        let ids: Vec<_> = store.all().await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![DownloadId(1), DownloadId(2)]);
    }

    #[tokio::test]
    async fn test_watch_publishes_on_change() {
        let store = MemoryStore::new();
        let mut rx = store.watch();
        assert!(rx.borrow().is_empty());

        store.upsert(record(1, 11)).await.unwrap();
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().len(), 1);
    }

    #[tokio::test]
    async fn test_identical_upsert_is_silent() {
        let store = MemoryStore::new();
        let rec = record(1, 11);
        store.upsert(rec.clone()).await.unwrap();

        let mut rx = store.watch();
        rx.mark_unchanged();
        store.upsert(rec.clone()).await.unwrap();
        assert!(!rx.has_changed().unwrap());

        let mut changed = rec;
        changed.state = DownloadState::Running;
        store.upsert(changed).await.unwrap();
        assert!(rx.has_changed().unwrap());
    }
}
