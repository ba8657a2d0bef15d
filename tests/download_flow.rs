//! End-to-end download flow: enqueue a chunked download, drive it through
//! engine callbacks to completion, then validate the finished archive.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use zimfetch::engine::{
    BoxFuture, EngineCallback, EngineCallbackKind, EngineError, EngineId, EngineRequest,
    TransferEngine,
};
use zimfetch::integrity::{ArchiveError, ArchiveReader, ZimArchive};
use zimfetch::{
    ArchiveIntegrityChecker, ArchiveSource, DownloadId, DownloadOrchestrator, DownloadRecord,
    DownloadRequest, DownloadState, DownloadStore, MemoryStore, OrchestratorConfig, CHUNK_SIZE,
};

/// Engine double that accepts every submission and replays a scripted
/// callback stream.
struct ScriptedEngine {
    submissions: Mutex<Vec<EngineRequest>>,
    next_id: AtomicU64,
    callbacks_tx: mpsc::Sender<EngineCallback>,
    callbacks_rx: Mutex<Option<mpsc::Receiver<EngineCallback>>>,
}

impl ScriptedEngine {
    fn new() -> Arc<Self> {
        let (callbacks_tx, callbacks_rx) = mpsc::channel(64);
        Arc::new(Self {
            submissions: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            callbacks_tx,
            callbacks_rx: Mutex::new(Some(callbacks_rx)),
        })
    }

    fn submissions(&self) -> Vec<EngineRequest> {
        self.submissions.lock().unwrap().clone()
    }

    async fn emit(&self, id: EngineId, kind: EngineCallbackKind) {
        self.callbacks_tx
            .send(EngineCallback { id, kind })
            .await
            .unwrap();
    }
}

impl TransferEngine for ScriptedEngine {
    fn submit(&self, request: EngineRequest) -> BoxFuture<'_, Result<EngineId, EngineError>> {
        Box::pin(async move {
            self.submissions.lock().unwrap().push(request);
            Ok(EngineId(self.next_id.fetch_add(1, Ordering::Relaxed)))
        })
    }

    fn delete(&self, _id: EngineId) -> BoxFuture<'_, Result<(), EngineError>> {
        Box::pin(async { Ok(()) })
    }

    fn retry(&self, _id: EngineId) -> BoxFuture<'_, Result<(), EngineError>> {
        Box::pin(async { Ok(()) })
    }

    fn resume(&self, _id: EngineId) -> BoxFuture<'_, Result<(), EngineError>> {
        Box::pin(async { Ok(()) })
    }

    fn pause(&self, _id: EngineId) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }

    fn take_events(&self) -> Option<mpsc::Receiver<EngineCallback>> {
        self.callbacks_rx.lock().unwrap().take()
    }
}

/// Archive double: every known path opens as a healthy single-part archive.
/// The main-entry probe answers `false`, so a valid verdict proves the
/// structural check alone decided.
struct HealthyArchive;

impl ZimArchive for HealthyArchive {
    fn check(&self) -> Result<bool, ArchiveError> {
        Ok(true)
    }
    fn is_multi_part(&self) -> bool {
        false
    }
    fn has_main_entry(&self) -> bool {
        false
    }
}

struct LibraryReader {
    archives: HashMap<PathBuf, ()>,
}

impl ArchiveReader for LibraryReader {
    fn open(&self, path: &Path) -> Result<Box<dyn ZimArchive>, ArchiveError> {
        if self.archives.contains_key(path) {
            Ok(Box::new(HealthyArchive))
        } else {
            Err(ArchiveError::Open(format!(
                "no such archive: {}",
                path.display()
            )))
        }
    }
}

async fn orchestrator_over(
    engine: Arc<ScriptedEngine>,
) -> (DownloadOrchestrator, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let orchestrator = DownloadOrchestrator::new(
        engine,
        Arc::clone(&store) as Arc<dyn DownloadStore>,
        OrchestratorConfig::default().with_monitor_tick(Duration::from_millis(50)),
    )
    .await
    .unwrap();
    (orchestrator, store)
}

async fn wait_for_record(
    store: &MemoryStore,
    id: DownloadId,
    predicate: impl Fn(&DownloadRecord) -> bool,
) -> DownloadRecord {
    let mut rx = store.watch();
    timeout(Duration::from_secs(5), async {
        loop {
            if let Some(record) = rx.borrow().iter().find(|r| r.id == id) {
                if predicate(record) {
                    return record.clone();
                }
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("record never reached expected state")
}

#[tokio::test]
async fn test_chunked_download_completes_and_validates() {
    let engine = ScriptedEngine::new();
    let (orchestrator, store) = orchestrator_over(Arc::clone(&engine)).await;

    // Three chunks: two full pieces plus a 1 MiB tail.
    let tail: u64 = 1024 * 1024;
    let total = 2 * CHUNK_SIZE + tail;
    let request = DownloadRequest::new(
        "https://mirror.example.org/zim/wikipedia_en_all.zim",
        "/data/library",
    )
    .with_title("Wikipedia (English)")
    .with_expected_size(total);

    let id = orchestrator.enqueue(request).await.unwrap();

    let record = wait_for_record(&store, id, |r| r.engine_ids().len() == 3).await;
    assert_eq!(record.state, DownloadState::Pending);
    assert_eq!(record.chunks.len(), 3);
    let chunk_names: Vec<&str> = record.chunks.iter().map(|c| c.file_name.as_str()).collect();
    assert_eq!(
        chunk_names,
        vec![
            "wikipedia_en_all.zimaa.part.part",
            "wikipedia_en_all.zimab.part.part",
            "wikipedia_en_all.zimac.part.part",
        ]
    );

    // Every piece lands in the destination dir with its planned range.
    let submissions = engine.submissions();
    assert_eq!(submissions.len(), 3);
    assert_eq!(submissions[0].range, format!("0-{}", CHUNK_SIZE - 1));
    assert!(submissions[2].range.ends_with('-'));
    assert_eq!(
        submissions[0].file_path,
        PathBuf::from("/data/library/wikipedia_en_all.zimaa.part.part")
    );

    // Drive each piece through its lifecycle.
    let sizes = [CHUNK_SIZE, CHUNK_SIZE, tail];
    for (chunk, size) in record.chunks.iter().zip(sizes) {
        let engine_id = chunk.engine_id.unwrap();
        engine.emit(engine_id, EngineCallbackKind::Started).await;
        engine
            .emit(
                engine_id,
                EngineCallbackKind::Progress {
                    bytes_downloaded: size / 2,
                    total_bytes: Some(size),
                },
            )
            .await;
        engine
            .emit(
                engine_id,
                EngineCallbackKind::Completed {
                    bytes_downloaded: size,
                },
            )
            .await;
    }

    let done = wait_for_record(&store, id, |r| r.state == DownloadState::Successful).await;
    assert_eq!(done.bytes_downloaded, total);
    assert_eq!(done.total_bytes, total);
    assert!(done.all_chunks_completed());
    assert_eq!(done.eta, None);
    assert_eq!(done.progress_percent(), 100);
    assert_eq!(
        done.file_path.as_deref(),
        Some(Path::new("/data/library/wikipedia_en_all.zim"))
    );

    let metrics = orchestrator.metrics();
    assert_eq!(metrics.downloads_enqueued, 1);
    assert_eq!(metrics.downloads_completed, 1);
    assert_eq!(metrics.downloads_failed, 0);

    // The reassembled archive passes validation.
    let reader = LibraryReader {
        archives: HashMap::from([(done.file_path.clone().unwrap(), ())]),
    };
    let checker = ArchiveIntegrityChecker::new(Arc::new(reader));
    let verdict = checker
        .validate(ArchiveSource::Path(done.file_path.unwrap()), false)
        .await;
    assert!(verdict.valid, "{:?}", verdict.message);

    orchestrator.shutdown();
}

#[tokio::test]
async fn test_single_chunk_download_for_unknown_size() {
    let engine = ScriptedEngine::new();
    let (orchestrator, store) = orchestrator_over(Arc::clone(&engine)).await;

    let id = orchestrator
        .enqueue(DownloadRequest::new(
            "https://mirror.example.org/zim/wiktionary_fr.zim",
            "/data/library",
        ))
        .await
        .unwrap();

    let record = wait_for_record(&store, id, |r| r.engine_ids().len() == 1).await;
    assert_eq!(record.chunks[0].file_name, "wiktionary_fr.zim.part.part");
    assert_eq!(record.chunks[0].range, "0-");

    let engine_id = record.chunks[0].engine_id.unwrap();
    engine.emit(engine_id, EngineCallbackKind::Started).await;
    engine
        .emit(
            engine_id,
            EngineCallbackKind::Completed {
                bytes_downloaded: 4_096,
            },
        )
        .await;

    let done = wait_for_record(&store, id, |r| r.state == DownloadState::Successful).await;
    assert_eq!(done.bytes_downloaded, 4_096);
    assert_eq!(done.total_bytes, 4_096);

    orchestrator.shutdown();
}

#[tokio::test]
async fn test_cancel_mid_transfer_deletes_record() {
    let engine = ScriptedEngine::new();
    let (orchestrator, store) = orchestrator_over(Arc::clone(&engine)).await;

    let id = orchestrator
        .enqueue(DownloadRequest::new(
            "https://mirror.example.org/zim/gutenberg_en.zim",
            "/data/library",
        ))
        .await
        .unwrap();

    let record = wait_for_record(&store, id, |r| r.engine_ids().len() == 1).await;
    let engine_id = record.chunks[0].engine_id.unwrap();
    engine.emit(engine_id, EngineCallbackKind::Started).await;
    wait_for_record(&store, id, |r| r.state == DownloadState::Running).await;

    orchestrator.cancel(id).await.unwrap();
    // Engine-side removal is confirmed through the callback stream.
    engine.emit(engine_id, EngineCallbackKind::Removed).await;

    let mut rx = store.watch();
    timeout(Duration::from_secs(5), async {
        loop {
            if !rx.borrow().iter().any(|r| r.id == id) {
                return;
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("record was never deleted");

    orchestrator.shutdown();
}
