//! Caller-facing download request and the local download identifier.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::engine::NetworkPolicy;

/// Locally generated identifier for one logical download.
///
/// Unlike engine ids, download ids are allocated by the orchestrator and
/// stay stable across retries and engine resets. They key the persisted
/// store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DownloadId(pub u64);

impl fmt::Display for DownloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Immutable description of one logical download.
///
/// Created by the caller, snapshotted into the persisted record, and never
/// mutated afterwards. The snapshot is what makes stale-handle recovery
/// possible: a fresh enqueue can always be rebuilt from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadRequest {
    /// Source URL for the archive.
    pub url: String,
    /// Display title, e.g. the catalog entry name.
    pub title: String,
    /// Display description.
    pub description: String,
    /// Directory the archive (and its in-progress pieces) land in.
    pub destination_dir: PathBuf,
    /// Size from the content catalog, when known. Drives chunk planning;
    /// `None` downloads as a single open-ended piece.
    pub expected_size: Option<u64>,
    /// Which networks the transfer may use.
    pub network: NetworkPolicy,
}

impl DownloadRequest {
    /// Request `url` into `destination_dir` with empty display fields,
    /// unknown size, and the default network policy.
    pub fn new(url: impl Into<String>, destination_dir: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            title: String::new(),
            description: String::new(),
            destination_dir: destination_dir.into(),
            expected_size: None,
            network: NetworkPolicy::All,
        }
    }

    /// Set the display title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    /// Set the display description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declare the catalog size, enabling chunked planning for large files.
    pub fn with_expected_size(mut self, bytes: u64) -> Self {
        self.expected_size = Some(bytes);
        self
    }

    /// Restrict the transfer to a network class.
    pub fn with_network(mut self, network: NetworkPolicy) -> Self {
        self.network = network;
        self
    }
}
