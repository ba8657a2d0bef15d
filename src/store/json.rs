//! File-backed download store.

use std::collections::BTreeMap;
use std::path::PathBuf;

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::download::{DownloadId, DownloadRecord};
use crate::engine::{BoxFuture, EngineId};

use super::{DownloadStore, StoreError};

/// Durable store snapshotting every change to one JSON file.
///
/// The whole record set is small (one entry per in-flight archive), so the
/// file holds a full snapshot rather than a log. Writes go to a sibling
/// temp file first and rename over the target, so a crash mid-write leaves
/// the previous snapshot intact.
pub struct JsonFileStore {
    path: PathBuf,
    records: RwLock<BTreeMap<DownloadId, DownloadRecord>>,
    /// Serializes snapshot writes; see [`JsonFileStore::flush`].
    flush_lock: tokio::sync::Mutex<()>,
    watch_tx: watch::Sender<Vec<DownloadRecord>>,
}

impl JsonFileStore {
    /// Open the store at `path`, loading any existing snapshot.
    ///
    /// A missing file starts the store empty; a present but unreadable file
    /// is an error rather than silent data loss.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) => {
                let loaded: Vec<DownloadRecord> = serde_json::from_slice(&bytes)?;
                info!(path = %path.display(), records = loaded.len(), "download store loaded");
                loaded.into_iter().map(|r| (r.id, r)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no download store snapshot, starting empty");
                BTreeMap::new()
            }
            Err(e) => return Err(e.into()),
        };

        let (watch_tx, _) = watch::channel(records.values().cloned().collect());
        Ok(Self {
            path,
            records: RwLock::new(records),
            flush_lock: tokio::sync::Mutex::new(()),
            watch_tx,
        })
    }

    fn snapshot(&self) -> Vec<DownloadRecord> {
        self.records.read().values().cloned().collect()
    }

    /// Write the current snapshot out atomically and publish it.
    ///
    /// Flushes are serialized, and the snapshot is captured while the lock
    /// is held: the last flush to run always persists the newest state, so
    /// concurrent writers cannot land an older file over a newer one.
    async fn flush(&self) -> Result<(), StoreError> {
        let _guard = self.flush_lock.lock().await;
        let snapshot = self.snapshot();
        let json = serde_json::to_vec_pretty(&snapshot)?;

        let tmp = self.path.with_extension("tmp");
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&tmp, &json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        self.watch_tx.send_replace(snapshot);
        Ok(())
    }
}

impl DownloadStore for JsonFileStore {
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
                self.flush().await?;
            }
            Ok(())
        })
    }

    fn delete(&self, id: DownloadId) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            let removed = self.records.write().remove(&id).is_some();
            if removed {
                self.flush().await?;
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
