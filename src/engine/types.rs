//! Transfer engine request, callback, and error types.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default bounded auto-retry budget for one engine request.
///
/// Retries beyond this require explicit user action through the
/// orchestrator's retry operation.
pub const AUTO_RETRY_MAX_ATTEMPTS: u32 = 3;

/// Identifier the engine assigns to one accepted transfer request.
///
/// Engine ids are only meaningful to the engine instance that issued them.
/// An engine whose internal state was reset no longer recognizes ids it
/// issued earlier, which is the stale-handle situation the orchestrator
/// recovers from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EngineId(pub u64);

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which networks a transfer may use.
///
/// The engine records the policy with the request; enforcement is the host
/// platform's concern.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkPolicy {
    /// Any available network.
    #[default]
    All,
    /// Unmetered WiFi only.
    WifiOnly,
}

/// One piece of a download, as submitted to a transfer engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineRequest {
    /// Source URL.
    pub url: String,
    /// Absolute destination path for this piece.
    pub file_path: PathBuf,
    /// Range header value (`"0-"` requests the whole file). The engine adds
    /// the `bytes=` prefix when it builds the HTTP header.
    pub range: String,
    /// Network the transfer may run on.
    pub network: NetworkPolicy,
    /// Bounded retry budget applied inside the engine before it reports
    /// failure.
    pub auto_retry_max_attempts: u32,
    /// Free-form correlation tag, carried into engine logs.
    pub tag: Option<String>,
}

impl EngineRequest {
    /// Request the whole file at `url` into `file_path` with default policy.
    pub fn new(url: impl Into<String>, file_path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            file_path: file_path.into(),
            range: "0-".to_string(),
            network: NetworkPolicy::All,
            auto_retry_max_attempts: AUTO_RETRY_MAX_ATTEMPTS,
            tag: None,
        }
    }

    /// Set the range header value for this piece.
    pub fn with_range(mut self, range: impl Into<String>) -> Self {
        self.range = range.into();
        self
    }

    /// Set the network policy.
    pub fn with_network(mut self, network: NetworkPolicy) -> Self {
        self.network = network;
        self
    }

    /// Set the engine-internal retry budget.
    pub fn with_auto_retry_max_attempts(mut self, attempts: u32) -> Self {
        self.auto_retry_max_attempts = attempts;
        self
    }

    /// Attach a correlation tag.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }
}

/// Errors a transfer engine reports, either from a control call or inside
/// an `Error` callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The engine does not recognize the request id. This is the stale-handle
    /// signal: the orchestrator recovers by re-enqueueing from the persisted
    /// record instead of surfacing the error.
    #[error("request does not exist")]
    RequestDoesNotExist,

    /// Connection, DNS, or mid-stream transport failure.
    #[error("network error: {0}")]
    Network(String),

    /// The server rejected a ranged request for partially downloaded data.
    #[error("download cannot be resumed")]
    CannotResume,

    /// The destination volume is gone.
    #[error("destination storage not found")]
    StorageNotFound,

    /// The destination file already exists and the engine will not clobber it.
    #[error("destination file already exists")]
    FileAlreadyExists,

    /// The destination volume is full.
    #[error("insufficient storage space")]
    InsufficientSpace,

    /// Redirect chain exceeded the client limit.
    #[error("too many redirects")]
    TooManyRedirects,

    /// Non-success HTTP status outside the cases above.
    #[error("unexpected http status {0}")]
    HttpStatus(u16),

    /// Local file i/o failure while writing a piece.
    #[error("file error: {0}")]
    File(String),
}

/// One lifecycle callback from a transfer engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineCallback {
    /// The transfer this callback concerns.
    pub id: EngineId,
    pub kind: EngineCallbackKind,
}

/// Raw engine callback lifecycle, before normalization.
///
/// `Deleted` and `Removed` both mean the engine forgot the request; the
/// adapter collapses them into one normalized event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCallbackKind {
    Queued,
    Started,
    Progress {
        bytes_downloaded: u64,
        total_bytes: Option<u64>,
    },
    Paused,
    Resumed,
    Error(EngineError),
    Completed {
        bytes_downloaded: u64,
    },
    Deleted,
    Removed,
}
