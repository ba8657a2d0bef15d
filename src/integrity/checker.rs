//! Single-archive validation.

use std::sync::Arc;

use tracing::{debug, warn};

use super::archive::{ArchiveError, ArchiveReader, ArchiveSource, ZimArchive};

/// Verdict for one archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    /// What was validated (a path, or "embedded archive").
    pub subject: String,
    /// Whether the archive may be exposed to the application.
    pub valid: bool,
    /// Diagnostic text for invalid archives.
    pub message: Option<String>,
}

impl ValidationResult {
    fn valid(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            valid: true,
            message: None,
        }
    }

    fn invalid(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            valid: false,
            message: Some(message.into()),
        }
    }
}

/// Validates archives before they are exposed to the application.
///
/// Cheap to clone; the reader is shared.
#[derive(Clone)]
pub struct ArchiveIntegrityChecker {
    pub(super) reader: Arc<dyn ArchiveReader>,
}

impl ArchiveIntegrityChecker {
    pub fn new(reader: Arc<dyn ArchiveReader>) -> Self {
        Self { reader }
    }

    /// Validate one archive.
    ///
    /// Runs on a blocking execution context (archive checks read the whole
    /// file); the calling task suspends but other callers are not blocked.
    /// Never returns an error: open and check failures become invalid
    /// verdicts carrying the failure message.
    pub async fn validate(
        &self,
        source: ArchiveSource,
        embedded_single_archive: bool,
    ) -> ValidationResult {
        let subject = source.subject();
        let reader = Arc::clone(&self.reader);

        let outcome = tokio::task::spawn_blocking(move || {
            validate_blocking(reader.as_ref(), source, embedded_single_archive)
        })
        .await;

        match outcome {
            Ok(result) => result,
            Err(e) => ValidationResult::invalid(subject, format!("validation task failed: {e}")),
        }
    }
}

fn validate_blocking(
    reader: &dyn ArchiveReader,
    source: ArchiveSource,
    embedded_single_archive: bool,
) -> ValidationResult {
    let subject = source.subject();
    match source {
        ArchiveSource::Path(path) => match reader.open(&path) {
            // The boxed handle drops at the end of this arm, releasing the
            // archive on every path out of `verdict`.
            Ok(archive) => verdict(archive.as_ref(), &subject, embedded_single_archive),
            Err(e) => ValidationResult::invalid(subject, e.to_string()),
        },
        // Embedded archives are owned by the active reader component; only
        // our reference is released.
        ArchiveSource::Embedded(archive) => verdict(archive.as_ref(), &subject, true),
    }
}

/// Apply the fallback policy to an opened archive.
///
/// The structural checker runs first, but its positive verdict is only
/// trusted for single-part, non-embedded archives: for multi-part archives
/// it is known to misreport, and embedded archives never went through a
/// plain file open. In those cases, and whenever the structural check says
/// invalid, the resolvable-main-entry probe decides.
fn verdict(archive: &dyn ZimArchive, subject: &str, embedded: bool) -> ValidationResult {
    let structural = match archive.check() {
        Ok(structural) => structural,
        Err(e) => {
            warn!(subject, error = %e, "structural check aborted");
            return ValidationResult::invalid(subject, e.to_string());
        }
    };

    if archive.is_multi_part() || embedded || !structural {
        debug!(
            subject,
            structural,
            multi_part = archive.is_multi_part(),
            embedded,
            "using main-entry fallback"
        );
        if archive.has_main_entry() {
            return ValidationResult::valid(subject);
        }
        let message = if structural {
            "main entry not resolvable".to_string()
        } else {
            "structural check failed and main entry not resolvable".to_string()
        };
        return ValidationResult::invalid(subject, message);
    }

    ValidationResult::valid(subject)
}

#[cfg(test)]
pub(super) mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Scripted archive double that counts fallback probes and drops.
    pub(in crate::integrity) struct FakeArchive {
        pub check: Result<bool, ArchiveError>,
        pub multi_part: bool,
        pub main_entry: bool,
        pub main_entry_probes: Arc<AtomicUsize>,
        pub drops: Arc<AtomicUsize>,
    }

    impl FakeArchive {
        pub fn single_part_valid() -> Self {
            Self {
                check: Ok(true),
                multi_part: false,
                main_entry: true,
                main_entry_probes: Arc::new(AtomicUsize::new(0)),
                drops: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl ZimArchive for FakeArchive {
        fn check(&self) -> Result<bool, ArchiveError> {
            self.check.clone()
        }
        fn is_multi_part(&self) -> bool {
            self.multi_part
        }
        fn has_main_entry(&self) -> bool {
            self.main_entry_probes.fetch_add(1, Ordering::SeqCst);
            self.main_entry
        }
    }

    impl Drop for FakeArchive {
        fn drop(&mut self) {
            self.drops.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Reader double serving scripted archives by path.
    #[derive(Default)]
    pub(in crate::integrity) struct FakeReader {
        pub archives: parking_lot::Mutex<HashMap<PathBuf, FakeArchive>>,
    }

    impl FakeReader {
        pub fn with_archive(path: impl Into<PathBuf>, archive: FakeArchive) -> Arc<Self> {
            let reader = Self::default();
            reader.archives.lock().insert(path.into(), archive);
            Arc::new(reader)
        }
    }

    impl ArchiveReader for FakeReader {
        fn open(&self, path: &Path) -> Result<Box<dyn ZimArchive>, ArchiveError> {
            self.archives
                .lock()
                .remove(path)
                .map(|archive| Box::new(archive) as Box<dyn ZimArchive>)
                .ok_or_else(|| {
                    ArchiveError::Open(format!("no such archive: {}", path.display()))
                })
        }
    }

    fn path_source() -> ArchiveSource {
        ArchiveSource::Path(PathBuf::from("/data/library/wikipedia.zim"))
    }

    #[tokio::test]
    async fn test_single_part_valid_uses_primary_check() {
        let archive = FakeArchive::single_part_valid();
        let probes = Arc::clone(&archive.main_entry_probes);
        let checker = ArchiveIntegrityChecker::new(FakeReader::with_archive(
            "/data/library/wikipedia.zim",
            archive,
        ));

        let result = checker.validate(path_source(), false).await;
        assert!(result.valid);
        assert_eq!(result.message, None);
        // The fallback never ran.
        assert_eq!(probes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_multi_part_ignores_positive_structural_check() {
        let mut archive = FakeArchive::single_part_valid();
        archive.multi_part = true;
        archive.main_entry = false;
        let probes = Arc::clone(&archive.main_entry_probes);
        let checker = ArchiveIntegrityChecker::new(FakeReader::with_archive(
            "/data/library/wikipedia.zim",
            archive,
        ));

        // check() said true, but the verdict comes from the fallback.
        let result = checker.validate(path_source(), false).await;
        assert!(!result.valid);
        assert_eq!(probes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_multi_part_with_main_entry_is_valid() {
        let mut archive = FakeArchive::single_part_valid();
        archive.multi_part = true;
        archive.check = Ok(false);
        let checker = ArchiveIntegrityChecker::new(FakeReader::with_archive(
            "/data/library/wikipedia.zim",
            archive,
        ));

        let result = checker.validate(path_source(), false).await;
        assert!(result.valid);
    }

    #[tokio::test]
    async fn test_embedded_flag_forces_fallback() {
        let mut archive = FakeArchive::single_part_valid();
        archive.main_entry = false;
        let probes = Arc::clone(&archive.main_entry_probes);
        let checker = ArchiveIntegrityChecker::new(Arc::new(FakeReader::default()));

        let result = checker
            .validate(ArchiveSource::Embedded(Arc::new(archive)), true)
            .await;
        assert!(!result.valid);
        assert_eq!(probes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_open_failure_is_invalid_result() {
        let checker = ArchiveIntegrityChecker::new(Arc::new(FakeReader::default()));
        let result = checker.validate(path_source(), false).await;
        assert!(!result.valid);
        assert!(result.message.unwrap().contains("no such archive"));
    }

    #[tokio::test]
    async fn test_check_error_is_invalid_result_with_message() {
        let mut archive = FakeArchive::single_part_valid();
        archive.check = Err(ArchiveError::Check("truncated cluster".into()));
        let drops = Arc::clone(&archive.drops);
        let checker = ArchiveIntegrityChecker::new(FakeReader::with_archive(
            "/data/library/wikipedia.zim",
            archive,
        ));

        let result = checker.validate(path_source(), false).await;
        assert!(!result.valid);
        assert!(result.message.unwrap().contains("truncated cluster"));
        // Released exactly once, error path included.
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_archive_released_exactly_once_on_success() {
        let archive = FakeArchive::single_part_valid();
        let drops = Arc::clone(&archive.drops);
        let checker = ArchiveIntegrityChecker::new(FakeReader::with_archive(
            "/data/library/wikipedia.zim",
            archive,
        ));

        let result = checker.validate(path_source(), false).await;
        assert!(result.valid);
        assert_eq!(drops.load(Ordering::SeqCst), 1);
    }
}
