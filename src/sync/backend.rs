//! Snapshot storage backends.
//!
//! A backend is wherever snapshots end up. The reconciler talks to it only
//! through [`SyncBackend`], so adding a new kind of target does not touch
//! the sync procedure itself.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tracing::debug;

use crate::sync::file::{atomic_copy, unique_path};
use crate::sync::types::{SnapshotInfo, SyncError, SyncResult};

/// File name prefix shared by every snapshot.
pub const SNAPSHOT_PREFIX: &str = "clipstash_sync_";
/// Snapshot file extension.
pub const SNAPSHOT_EXTENSION: &str = "zip";

/// Kinds of snapshot target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// A directory, typically a network share or a synced cloud folder.
    LocalFolder,
}

/// Operations the reconciler needs from a snapshot target.
pub trait SyncBackend {
    fn kind(&self) -> BackendKind;

    /// Check the target is reachable before doing any work.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::TargetUnavailable` if it is not.
    fn authenticate(&self) -> SyncResult<()>;

    /// Snapshots currently stored, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the target cannot be listed.
    fn remote_state(&self) -> SyncResult<Vec<SnapshotInfo>>;

    /// Store `archive` as a new snapshot named after `stem`.
    ///
    /// The stored name may carry a numeric suffix if `stem` is taken.
    ///
    /// # Errors
    ///
    /// Returns an error if the copy fails. No partial snapshot remains.
    fn upload(&self, archive: &Path, stem: &str) -> SyncResult<SnapshotInfo>;

    /// Copy snapshot `name` to `dest`.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::SnapshotNotFound` for an unknown name, or an I/O
    /// error if the copy fails.
    fn download(&self, name: &str, dest: &Path) -> SyncResult<()>;

    /// Remove snapshot `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot exists but cannot be removed.
    fn delete(&self, name: &str) -> SyncResult<()>;
}

/// Snapshots stored as plain files in one directory.
#[derive(Debug, Clone)]
pub struct LocalFolderBackend {
    root: PathBuf,
}

impl LocalFolderBackend {
    #[must_use]
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn snapshot_path(&self, name: &str) -> SyncResult<PathBuf> {
        if !is_snapshot_name(name) || name.contains(['/', '\\']) {
            return Err(SyncError::SnapshotNotFound(name.to_string()));
        }
        Ok(self.root.join(name))
    }
}

impl SyncBackend for LocalFolderBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::LocalFolder
    }

    fn authenticate(&self) -> SyncResult<()> {
        let unavailable = |reason: &str| SyncError::TargetUnavailable {
            path: self.root.clone(),
            reason: reason.to_string(),
        };

        let meta = fs::metadata(&self.root).map_err(|e| unavailable(&e.to_string()))?;
        if !meta.is_dir() {
            return Err(unavailable("not a directory"));
        }
        fs::read_dir(&self.root).map_err(|e| unavailable(&e.to_string()))?;
        Ok(())
    }

    fn remote_state(&self) -> SyncResult<Vec<SnapshotInfo>> {
        let mut snapshots = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_snapshot_name(&name) {
                continue;
            }
            let meta = entry.metadata()?;
            if !meta.is_file() {
                continue;
            }
            let modified = meta
                .modified()
                .map(DateTime::<Utc>::from)
                .unwrap_or_default();
            snapshots.push(SnapshotInfo {
                path: entry.path(),
                size: meta.len(),
                name,
                modified,
            });
        }

        snapshots.sort_by(|a, b| a.modified.cmp(&b.modified).then_with(|| a.name.cmp(&b.name)));
        Ok(snapshots)
    }

    fn upload(&self, archive: &Path, stem: &str) -> SyncResult<SnapshotInfo> {
        let dest = unique_path(&self.root, stem, SNAPSHOT_EXTENSION);
        let size = atomic_copy(archive, &dest)?;
        let modified = fs::metadata(&dest)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());
        let name = dest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        debug!(snapshot = %name, bytes = size, "Snapshot uploaded");
        Ok(SnapshotInfo {
            name,
            path: dest,
            size,
            modified,
        })
    }

    fn download(&self, name: &str, dest: &Path) -> SyncResult<()> {
        let source = self.snapshot_path(name)?;
        if !source.is_file() {
            return Err(SyncError::SnapshotNotFound(name.to_string()));
        }
        let bytes = atomic_copy(&source, dest)?;
        debug!(snapshot = name, bytes, "Snapshot downloaded");
        Ok(())
    }

    fn delete(&self, name: &str) -> SyncResult<()> {
        let path = self.snapshot_path(name)?;
        fs::remove_file(&path)?;
        debug!(snapshot = name, "Snapshot deleted");
        Ok(())
    }
}

/// Snapshot file stem for a capture time: `clipstash_sync_YYYYmmdd_HHMMSS_mmm`.
#[must_use]
pub fn snapshot_stem(at: DateTime<Local>) -> String {
    format!("{SNAPSHOT_PREFIX}{}", at.format("%Y%m%d_%H%M%S_%3f"))
}

/// Whether a file name looks like a snapshot this crate wrote.
#[must_use]
pub fn is_snapshot_name(name: &str) -> bool {
    name.starts_with(SNAPSHOT_PREFIX)
        && Path::new(name)
            .extension()
            .is_some_and(|ext| ext == SNAPSHOT_EXTENSION)
}
