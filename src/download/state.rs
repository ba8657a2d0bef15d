//! Download lifecycle states and failure reasons.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::engine::EngineError;

/// Lifecycle state of one logical download.
///
/// This is a closed set: the reducer matches on it exhaustively, so adding a
/// state is a compile-visible change everywhere it matters. `Successful` is
/// terminal — once reached, every further event is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadState {
    /// Persisted, waiting for the engine to start transferring.
    Pending,
    /// At least one piece is transferring.
    Running,
    /// Paused by the user; resumable.
    Paused,
    /// A piece failed; waits for an explicit user retry.
    Failed(FailureReason),
    /// Every piece completed. Terminal.
    Successful,
}

impl DownloadState {
    /// True once the download can no longer change through events.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadState::Successful)
    }

    /// True while the engine is expected to be working on this download.
    pub fn is_active(&self) -> bool {
        matches!(self, DownloadState::Pending | DownloadState::Running)
    }
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadState::Pending => write!(f, "Pending"),
            DownloadState::Running => write!(f, "Running"),
            DownloadState::Paused => write!(f, "Paused"),
            DownloadState::Failed(reason) => write!(f, "Failed: {}", reason),
            DownloadState::Successful => write!(f, "Successful"),
        }
    }
}

/// Why a download failed, as reported by the engine.
///
/// Persisted with the record so the failure survives restarts and can be
/// shown next to the retry affordance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureReason {
    /// The server would not honor a ranged resume request.
    CannotResume,
    /// The destination volume disappeared.
    StorageNotFound,
    /// The destination file already exists.
    FileAlreadyExists,
    /// The destination volume is full.
    InsufficientSpace,
    /// The redirect chain exceeded the client limit.
    TooManyRedirects,
    /// Non-success HTTP status.
    HttpError(u16),
    /// Anything else, carrying the engine's message.
    Other(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::CannotResume => write!(f, "download cannot be resumed"),
            FailureReason::StorageNotFound => write!(f, "storage not found"),
            FailureReason::FileAlreadyExists => write!(f, "file already exists"),
            FailureReason::InsufficientSpace => write!(f, "insufficient storage space"),
            FailureReason::TooManyRedirects => write!(f, "too many redirects"),
            FailureReason::HttpError(code) => write!(f, "http error {}", code),
            FailureReason::Other(message) => write!(f, "{}", message),
        }
    }
}

impl From<EngineError> for FailureReason {
    fn from(error: EngineError) -> Self {
        match error {
            EngineError::CannotResume => FailureReason::CannotResume,
            EngineError::StorageNotFound => FailureReason::StorageNotFound,
            EngineError::FileAlreadyExists => FailureReason::FileAlreadyExists,
            EngineError::InsufficientSpace => FailureReason::InsufficientSpace,
            EngineError::TooManyRedirects => FailureReason::TooManyRedirects,
            EngineError::HttpStatus(code) => FailureReason::HttpError(code),
            EngineError::Network(message) | EngineError::File(message) => {
                FailureReason::Other(message)
            }
            // A stale handle is recovered by the orchestrator, but if it
            // ever reaches a record it reads as a plain failure.
            EngineError::RequestDoesNotExist => {
                FailureReason::Other("request does not exist".to_string())
            }
        }
    }
}
