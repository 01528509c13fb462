//! Folder sync.
//!
//! A sync writes an immutable, timestamped snapshot of the full backup into
//! the active profile's folder and then trims the folder to the profile's
//! retention count. Nothing already in the folder is ever modified, so two
//! machines syncing into the same share cannot corrupt each other's
//! snapshots.
//!
//! Restoring downloads a snapshot and imports it as a full backup.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{Local, Utc};
use tracing::{info, warn};

use crate::config::{AppConfig, DataPaths, SyncProfile};
use crate::events::{CoreEvent, EventBus};
use crate::storage::SqliteStorage;
use crate::sync::archive::{self, BackupSource};
use crate::sync::backend::{LocalFolderBackend, SyncBackend, snapshot_stem};
use crate::sync::file::remove_if_exists;
use crate::sync::state::SyncState;
use crate::sync::types::{
    ImportOutcome, SnapshotInfo, SyncError, SyncReport, SyncResult, SyncStatus,
};

/// Runs syncs and restores for one data root.
///
/// Holds a configuration snapshot; build a new one after the settings
/// change.
pub struct Reconciler {
    storage: Arc<Mutex<SqliteStorage>>,
    paths: DataPaths,
    config: AppConfig,
    events: EventBus,
}

impl Reconciler {
    #[must_use]
    pub fn new(
        storage: Arc<Mutex<SqliteStorage>>,
        paths: DataPaths,
        config: AppConfig,
        events: EventBus,
    ) -> Self {
        Self {
            storage,
            paths,
            config,
            events,
        }
    }

    /// Snapshot the data root into the profile's folder.
    ///
    /// # Errors
    ///
    /// Configuration problems (`NoProfile`, `ProfileNotFound`) are reported
    /// before any I/O. An unavailable folder yields `TargetUnavailable`.
    /// The local store is never modified.
    pub fn sync(&self, profile: Option<&str>) -> SyncResult<SyncReport> {
        let profile = self.config.require_profile(profile)?;
        let backend = backend_for(profile);
        backend.authenticate()?;

        self.paths.ensure()?;
        let staging = self
            .paths
            .root()
            .join(format!(".sync-{}.zip", uuid::Uuid::new_v4()));

        // Only the database copy needs the store; zipping happens unlocked.
        let source = {
            let storage = self.lock_storage()?;
            BackupSource::capture(&storage, &self.paths)?
        };
        let uploaded = source
            .write(&staging)
            .and_then(|summary| backend.upload(&summary.path, &snapshot_stem(Local::now())));
        drop(source);
        let _ = remove_if_exists(&staging);
        let snapshot = uploaded?;

        SyncState::synced(&profile.name, &snapshot.name, Utc::now())
            .save(&self.paths.sync_state())?;

        let pruned = prune_snapshots(&backend, profile.retention_count);

        info!(
            profile = %profile.name,
            snapshot = %snapshot.name,
            bytes = snapshot.size,
            pruned = pruned.len(),
            "Sync complete"
        );
        Ok(SyncReport {
            success: true,
            message: format!("Synced to '{}' as {}", profile.name, snapshot.name),
            snapshot: Some(snapshot.name),
            pruned,
        })
    }

    /// [`Self::sync`] with failures folded into the report.
    #[must_use]
    pub fn run(&self, profile: Option<&str>) -> SyncReport {
        self.sync(profile).unwrap_or_else(|e| {
            warn!(error = %e, "Sync failed");
            SyncReport::failed(e.to_string())
        })
    }

    /// Run a sync on the blocking pool, giving up after the configured
    /// timeout, and announce the result on the event bus.
    ///
    /// A timed-out sync keeps running in the background until its current
    /// file operation finishes; its result is discarded.
    pub async fn sync_with_timeout(self: Arc<Self>, profile: Option<String>) -> SyncReport {
        let timeout = self.config.sync_timeout();
        let worker = Arc::clone(&self);
        let task = tokio::task::spawn_blocking(move || worker.run(profile.as_deref()));

        let report = match tokio::time::timeout(timeout, task).await {
            Ok(Ok(report)) => report,
            Ok(Err(join)) => SyncReport::failed(SyncError::Task(join.to_string()).to_string()),
            Err(_) => {
                let err = SyncError::Timeout(timeout.as_secs());
                warn!(error = %err, "Sync abandoned");
                SyncReport::failed(err.to_string())
            }
        };

        self.events.publish(CoreEvent::SyncCompleted {
            success: report.success,
            message: report.message.clone(),
        });
        report
    }

    /// Snapshots in the profile's folder, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the profile is unknown or its folder unavailable.
    pub fn list_snapshots(&self, profile: Option<&str>) -> SyncResult<Vec<SnapshotInfo>> {
        let backend = backend_for(self.config.require_profile(profile)?);
        backend.authenticate()?;
        backend.remote_state()
    }

    /// Replace local data with snapshot `name` from the profile's folder.
    ///
    /// Consumes the reconciler: the store is closed by the import, so no
    /// other handle to it may exist.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotNotFound` for an unknown name, `Task` if the store is
    /// still shared, or any archive error from the import.
    pub fn restore(self, profile: Option<&str>, name: &str) -> SyncResult<ImportOutcome> {
        let backend = backend_for(self.config.require_profile(profile)?);
        backend.authenticate()?;
        self.import_snapshot(&backend, name)
    }

    /// Restore the newest snapshot in the profile's folder.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotNotFound` when the folder holds no snapshots, plus
    /// everything [`Self::restore`] can return.
    pub fn restore_latest(self, profile: Option<&str>) -> SyncResult<ImportOutcome> {
        let profile = self.config.require_profile(profile)?;
        let backend = backend_for(profile);
        backend.authenticate()?;

        let latest = backend
            .remote_state()?
            .pop()
            .ok_or_else(|| {
                SyncError::SnapshotNotFound(format!("no snapshots in {}", profile.path.display()))
            })?;
        self.import_snapshot(&backend, &latest.name)
    }

    fn import_snapshot(self, backend: &dyn SyncBackend, name: &str) -> SyncResult<ImportOutcome> {
        self.paths.ensure()?;
        let staging = self
            .paths
            .root()
            .join(format!(".restore-{}.zip", uuid::Uuid::new_v4()));

        let result = backend.download(name, &staging).and_then(|()| {
            let storage = Arc::try_unwrap(self.storage)
                .map_err(|_| SyncError::Task("history store is still in use".into()))?
                .into_inner()
                .map_err(|_| SyncError::Task("history store lock poisoned".into()))?;
            archive::import_backup(storage, &self.paths, &staging)
        });
        let _ = remove_if_exists(&staging);

        if result.is_ok() {
            info!(snapshot = name, "Snapshot restored");
        }
        result
    }

    /// Current sync configuration and the local record of the last sync.
    #[must_use]
    pub fn status(&self, profile: Option<&str>) -> SyncStatus {
        let state = SyncState::load(&self.paths.sync_state());
        let selected: Option<&SyncProfile> = profile.and_then(|name| self.config.find_profile(name));

        let (target_available, snapshots) = selected.map_or((false, 0), |p| {
            let backend = backend_for(p);
            match backend.authenticate() {
                Ok(()) => (true, backend.remote_state().map_or(0, |s| s.len())),
                Err(_) => (false, 0),
            }
        });

        SyncStatus {
            active_profile: profile.map(str::to_string),
            target: selected.map(|p| p.path.clone()),
            target_available,
            last_sync: state.last_sync_timestamp,
            last_profile: state.last_profile,
            last_snapshot: state.last_snapshot,
            snapshots,
            auto_sync: self.config.sync.auto_sync,
            sync_interval_minutes: self.config.sync.sync_interval_minutes,
        }
    }

    fn lock_storage(&self) -> SyncResult<MutexGuard<'_, SqliteStorage>> {
        self.storage
            .lock()
            .map_err(|_| SyncError::Task("history store lock poisoned".into()))
    }
}

fn backend_for(profile: &SyncProfile) -> LocalFolderBackend {
    LocalFolderBackend::new(&profile.path)
}

/// Delete the oldest snapshots beyond `keep`. `0` keeps everything.
///
/// Returns the names removed. Failures are logged and skipped.
pub fn prune_snapshots(backend: &dyn SyncBackend, keep: usize) -> Vec<String> {
    if keep == 0 {
        return Vec::new();
    }

    let snapshots = match backend.remote_state() {
        Ok(snapshots) => snapshots,
        Err(e) => {
            warn!(error = %e, "Could not list snapshots for retention");
            return Vec::new();
        }
    };

    let excess = snapshots.len().saturating_sub(keep);
    let mut removed = Vec::with_capacity(excess);
    for snapshot in snapshots.into_iter().take(excess) {
        match backend.delete(&snapshot.name) {
            Ok(()) => removed.push(snapshot.name),
            Err(e) => warn!(snapshot = %snapshot.name, error = %e, "Failed to delete old snapshot"),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntryKind;
    use std::fs;
    use tempfile::TempDir;

    struct Fixture {
        data: TempDir,
        share: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                data: TempDir::new().unwrap(),
                share: TempDir::new().unwrap(),
            }
        }

        fn paths(&self) -> DataPaths {
            DataPaths::new(self.data.path())
        }

        fn config(&self, retention_count: usize) -> AppConfig {
            let mut config = AppConfig::default();
            config
                .add_profile(SyncProfile {
                    name: "P1".into(),
                    path: self.share.path().to_path_buf(),
                    retention_count,
                })
                .unwrap();
            config
        }

        fn reconciler(&self, retention_count: usize) -> Reconciler {
            let paths = self.paths();
            let mut storage = SqliteStorage::open(&paths.database()).unwrap();
            storage.insert("synced text", EntryKind::Text).unwrap();
            Reconciler::new(
                Arc::new(Mutex::new(storage)),
                paths,
                self.config(retention_count),
                EventBus::default(),
            )
        }

        fn snapshot_files(&self) -> Vec<String> {
            let mut names: Vec<String> = fs::read_dir(self.share.path())
                .unwrap()
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            names
        }
    }

    #[test]
    fn test_sync_retains_most_recent_snapshots() {
        let fx = Fixture::new();
        let reconciler = fx.reconciler(2);

        let mut written = Vec::new();
        for _ in 0..3 {
            let report = reconciler.sync(Some("P1")).unwrap();
            assert!(report.success);
            written.push(report.snapshot.unwrap());
        }

        let mut expected = written[1..].to_vec();
        expected.sort();
        assert_eq!(fx.snapshot_files(), expected);

        let state = SyncState::load(&fx.paths().sync_state());
        assert_eq!(state.last_profile.as_deref(), Some("P1"));
        assert_eq!(state.last_snapshot.as_ref(), written.last());
    }

    #[test]
    fn test_zero_retention_keeps_everything() {
        let fx = Fixture::new();
        let reconciler = fx.reconciler(0);
        for _ in 0..3 {
            reconciler.sync(Some("P1")).unwrap();
        }
        assert_eq!(fx.snapshot_files().len(), 3);
    }

    #[test]
    fn test_profile_errors_before_io() {
        let fx = Fixture::new();
        let reconciler = fx.reconciler(2);
        assert!(matches!(reconciler.sync(None), Err(SyncError::NoProfile)));
        assert!(matches!(
            reconciler.sync(Some("nope")),
            Err(SyncError::ProfileNotFound { .. })
        ));
        assert!(!fx.paths().sync_state().exists());
    }

    #[test]
    fn test_unavailable_target_reports_failure() {
        let fx = Fixture::new();
        let paths = fx.paths();
        let mut config = AppConfig::default();
        config
            .add_profile(SyncProfile {
                name: "gone".into(),
                path: fx.share.path().join("missing"),
                retention_count: 2,
            })
            .unwrap();
        let storage = SqliteStorage::open(&paths.database()).unwrap();
        let reconciler =
            Reconciler::new(Arc::new(Mutex::new(storage)), paths, config, EventBus::default());

        let report = reconciler.run(Some("gone"));
        assert!(!report.success);
        assert!(report.message.contains("unavailable"));
        assert!(!fx.paths().sync_state().exists());

        let status = reconciler.status(Some("gone"));
        assert!(!status.target_available);
        assert!(status.last_sync.is_none());
    }

    #[test]
    fn test_sync_leaves_no_staging_files() {
        let fx = Fixture::new();
        fx.reconciler(2).sync(Some("P1")).unwrap();
        let staged: Vec<_> = fs::read_dir(fx.data.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with('.'))
            .collect();
        assert!(staged.is_empty());
    }

    #[test]
    fn test_restore_latest_replaces_local_history() {
        let fx = Fixture::new();
        let reconciler = fx.reconciler(5);
        reconciler.sync(Some("P1")).unwrap();

        {
            let mut storage = reconciler.storage.lock().unwrap();
            storage.insert("local only", EntryKind::Text).unwrap();
        }

        let outcome = reconciler.restore_latest(Some("P1")).unwrap();
        assert!(matches!(outcome, ImportOutcome::RestartRequired { .. }));

        let reopened = SqliteStorage::open(&fx.paths().database()).unwrap();
        assert_eq!(reopened.count(None).unwrap(), 1);
        assert_eq!(reopened.count(Some("local only")).unwrap(), 0);
    }

    #[test]
    fn test_restore_refuses_shared_store() {
        let fx = Fixture::new();
        let reconciler = fx.reconciler(5);
        let report = reconciler.sync(Some("P1")).unwrap();
        let _other_handle = Arc::clone(&reconciler.storage);

        let err = reconciler
            .restore(Some("P1"), &report.snapshot.unwrap())
            .unwrap_err();
        assert!(matches!(err, SyncError::Task(_)));
        // Local data untouched.
        let reopened = SqliteStorage::open(&fx.paths().database()).unwrap();
        assert_eq!(reopened.count(None).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sync_with_timeout_publishes_result() {
        let fx = Fixture::new();
        let reconciler = Arc::new(fx.reconciler(2));
        let mut rx = reconciler.events.subscribe();

        let report = Arc::clone(&reconciler)
            .sync_with_timeout(Some("P1".to_string()))
            .await;
        assert!(report.success);

        match rx.try_recv().unwrap() {
            CoreEvent::SyncCompleted { success, .. } => assert!(success),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
