//! Version checks, dismissal memory and the one-click update flow.

pub mod pipeline;
pub mod release;
pub mod state;
pub mod version;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::host::HostError;
use crate::storage::StorageError;

pub use pipeline::{UpdateOutcome, UpdatePipeline, DEFAULT_CHECK_INTERVAL};
pub use release::{HostReleaseSource, HttpReleaseSource, ReleaseDescriptor, ReleaseSource};
pub use version::{compare_versions, extract_version};

pub type UpdateResult<T> = std::result::Result<T, UpdateError>;

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error(transparent)]
    Host(#[from] HostError),
    #[error("release lookup failed: {0}")]
    Release(String),
    #[error("release tag `{0}` carries no version number")]
    InvalidVersion(String),
    #[error("no update available")]
    NoUpdateAvailable,
    #[error("no release page known")]
    NoReleasePage,
    #[error(transparent)]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub current: String,
    pub latest: String,
    pub has_update: bool,
    pub release_url: String,
    pub release_notes: String,
}

impl VersionInfo {
    /// Info for a running version with nothing newer known.
    pub fn up_to_date(current: impl Into<String>) -> Self {
        let current = current.into();
        Self {
            latest: current.clone(),
            current,
            has_update: false,
            release_url: String::new(),
            release_notes: String::new(),
        }
    }
}

/// Answer of the host's own updater.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UpdateInfo {
    pub available: bool,
    pub current_version: String,
    pub latest_version: String,
    pub release_notes: String,
    pub download_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateProgress {
    pub chunk_length: u64,
    pub downloaded: u64,
    #[serde(default)]
    pub content_length: Option<u64>,
    pub percentage: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateStatus {
    #[default]
    Idle,
    Checking,
    Downloading,
    Installing,
    Completed,
    Error,
}
