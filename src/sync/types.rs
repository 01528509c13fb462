//! Sync and archive types.
//!
//! Results handed back to callers of the archiver and reconciler, plus the
//! error enum shared by everything under `sync`.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Outcome of one sync attempt, shaped for presentation.
///
/// Failures are folded in as `success: false` with the error text, so a
/// caller can show the result without matching on errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub success: bool,
    pub message: String,
    /// File name of the snapshot written, on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<String>,
    /// Old snapshots removed by retention.
    pub pruned: Vec<String>,
}

impl SyncReport {
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            snapshot: None,
            pruned: Vec::new(),
        }
    }
}

/// A snapshot file in a sync folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotInfo {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// What a full backup export wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub includes_config: bool,
    pub images: usize,
    pub size: u64,
}

/// Result of restoring a full backup.
///
/// The store handle was closed during the restore; every caller must
/// reopen (or restart) before touching history again.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ImportOutcome {
    RestartRequired { files_restored: usize },
}

/// Sync status information.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    /// Profile selected for this process, if any.
    pub active_profile: Option<String>,
    /// Folder of the active profile.
    pub target: Option<PathBuf>,
    pub target_available: bool,
    pub last_sync: Option<DateTime<Utc>>,
    pub last_profile: Option<String>,
    pub last_snapshot: Option<String>,
    /// Snapshots currently in the target folder.
    pub snapshots: usize,
    pub auto_sync: bool,
    pub sync_interval_minutes: u64,
}

/// Sync-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// IO error during file operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Zip archive could not be read or written.
    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV serialization/deserialization error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),

    /// No profile was selected for this process.
    #[error("No sync profile selected")]
    NoProfile,

    /// The selected profile does not exist in the config.
    #[error("Sync profile not found: {name}")]
    ProfileNotFound {
        name: String,
        available: Vec<String>,
    },

    /// The profile's folder is missing or not a directory.
    #[error("Sync folder unavailable: {}: {reason}", path.display())]
    TargetUnavailable { path: PathBuf, reason: String },

    /// Archive failed validation before anything was touched.
    #[error("Invalid backup archive: {0}")]
    InvalidArchive(String),

    /// No snapshot with that name, or none at all.
    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    /// The sync did not finish in time.
    #[error("Sync timed out after {0} seconds")]
    Timeout(u64),

    /// A history-store operation failed underneath the archiver.
    #[error("{0}")]
    Store(String),

    /// A sync reported failure; carries the report's message.
    #[error("{0}")]
    Failed(String),

    /// The blocking sync task panicked or was cancelled.
    #[error("Sync task failed: {0}")]
    Task(String),
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<crate::error::Error> for SyncError {
    fn from(err: crate::error::Error) -> Self {
        match err {
            crate::error::Error::Sync(inner) => inner,
            crate::error::Error::Io(io) => Self::Io(io),
            other => Self::Store(other.to_string()),
        }
    }
}

/// Result type for sync operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;
