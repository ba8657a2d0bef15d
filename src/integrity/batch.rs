//! Sequential batch validation with live per-item status.
//!
//! Validating archives concurrently would multiply peak memory and open
//! file handles by the batch size, so items run strictly one at a time.
//! Progress is published through a watch channel so a caller can render
//! each item's status while the batch runs.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use super::archive::ArchiveSource;
use super::checker::{ArchiveIntegrityChecker, ValidationResult};

/// Lifecycle of one batch item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemStatus {
    /// Not reached yet.
    Pending,
    /// Being validated right now.
    InProgress,
    /// Validated successfully.
    Success,
    /// Invalid, with the diagnostic message.
    Failed(String),
}

impl ItemStatus {
    /// True for `Success` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ItemStatus::Success | ItemStatus::Failed(_))
    }
}

/// One entry in the batch status snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub subject: String,
    pub status: ItemStatus,
}

/// Snapshot of a running batch, in submission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchStatus {
    pub items: Vec<BatchItem>,
    /// Set once every item has a terminal status.
    pub complete: bool,
}

/// Handle to a running batch validation.
pub struct BatchValidation {
    status: watch::Receiver<BatchStatus>,
    handle: JoinHandle<Vec<ValidationResult>>,
}

impl BatchValidation {
    /// Live status stream for rendering progress.
    pub fn status(&self) -> watch::Receiver<BatchStatus> {
        self.status.clone()
    }

    /// Wait for the batch to finish and collect the results in order.
    pub async fn join(self) -> Vec<ValidationResult> {
        self.handle.await.unwrap_or_default()
    }
}

impl ArchiveIntegrityChecker {
    /// Validate `items` sequentially, publishing per-item status.
    ///
    /// Returns immediately; the work runs on a spawned task. Each item
    /// moves `Pending → InProgress → Success | Failed(reason)`, and the
    /// status snapshot's `complete` flag is set once the last item is
    /// terminal.
    pub fn validate_batch(&self, items: Vec<(ArchiveSource, bool)>) -> BatchValidation {
        let initial = BatchStatus {
            items: items
                .iter()
                .map(|(source, _)| BatchItem {
                    subject: source.subject(),
                    status: ItemStatus::Pending,
                })
                .collect(),
            complete: false,
        };
        let (tx, rx) = watch::channel(initial);

        let checker = self.clone();
        let handle = tokio::spawn(async move {
            let total = items.len();
            let mut results = Vec::with_capacity(total);

            for (index, (source, embedded)) in items.into_iter().enumerate() {
                tx.send_modify(|status| {
                    status.items[index].status = ItemStatus::InProgress;
                });

                let result = checker.validate(source, embedded).await;
                let item_status = if result.valid {
                    ItemStatus::Success
                } else {
                    ItemStatus::Failed(
                        result
                            .message
                            .clone()
                            .unwrap_or_else(|| "archive invalid".to_string()),
                    )
                };
                tx.send_modify(|status| {
                    status.items[index].status = item_status;
                });
                results.push(result);
            }

            let failed = results.iter().filter(|r| !r.valid).count();
            info!(total, failed, "batch validation complete");
            tx.send_modify(|status| status.complete = true);
            results
        });

        BatchValidation { status: rx, handle }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integrity::checker::tests::{FakeArchive, FakeReader};
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    fn source(path: &str) -> ArchiveSource {
        ArchiveSource::Path(PathBuf::from(path))
    }

    #[tokio::test]
    async fn test_batch_reports_per_item_verdicts_in_order() {
        let reader = FakeReader::default();
        reader
            .archives
            .lock()
            .insert(PathBuf::from("/lib/good.zim"), FakeArchive::single_part_valid());
        let mut broken = FakeArchive::single_part_valid();
        broken.check = Ok(false);
        broken.main_entry = false;
        reader
            .archives
            .lock()
            .insert(PathBuf::from("/lib/broken.zim"), broken);
        let checker = ArchiveIntegrityChecker::new(Arc::new(reader));

        let batch = checker.validate_batch(vec![
            (source("/lib/good.zim"), false),
            (source("/lib/broken.zim"), false),
            (source("/lib/missing.zim"), false),
        ]);

        let results = timeout(Duration::from_secs(5), batch.join())
            .await
            .unwrap();
        assert_eq!(results.len(), 3);
        assert!(results[0].valid);
        assert!(!results[1].valid);
        assert!(!results[2].valid);
        assert_eq!(results[2].subject, "/lib/missing.zim");
    }

    #[tokio::test]
    async fn test_batch_status_reaches_complete_with_terminal_items() {
        let reader = FakeReader::default();
        reader
            .archives
            .lock()
            .insert(PathBuf::from("/lib/good.zim"), FakeArchive::single_part_valid());
        let checker = ArchiveIntegrityChecker::new(Arc::new(reader));

        let batch = checker.validate_batch(vec![
            (source("/lib/good.zim"), false),
            (source("/lib/missing.zim"), false),
        ]);
        let mut status = batch.status();

        timeout(Duration::from_secs(5), async {
            while !status.borrow().complete {
                status.changed().await.unwrap();
            }
        })
        .await
        .expect("batch never completed");

        let snapshot = status.borrow().clone();
        assert!(snapshot.items.iter().all(|item| item.status.is_terminal()));
        assert_eq!(snapshot.items[0].status, ItemStatus::Success);
        assert!(matches!(snapshot.items[1].status, ItemStatus::Failed(_)));
    }

    #[tokio::test]
    async fn test_empty_batch_completes_immediately() {
        let checker = ArchiveIntegrityChecker::new(Arc::new(FakeReader::default()));
        let batch = checker.validate_batch(Vec::new());

        let results = timeout(Duration::from_secs(5), batch.join())
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
