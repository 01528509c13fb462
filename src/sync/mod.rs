//! Backups, interchange formats and folder sync.
//!
//! - **Archive**: full backup of the data root as one zip (database, config,
//!   images)
//! - **Formats**: JSON / CSV / Markdown / SQLite views of the history rows
//! - **Backend**: where snapshots are stored (a local or mounted folder)
//! - **Reconcile**: snapshot upload, retention and restore
//!
//! # Architecture
//!
//! Sync never edits a file in the shared folder. Each run uploads a new
//! `clipstash_sync_<timestamp>.zip` containing a full backup, then deletes
//! the oldest snapshots beyond the profile's retention count. Restoring a
//! snapshot is a full-backup import.
//!
//! # Example
//!
//! ```ignore
//! use clipstash::sync::Reconciler;
//!
//! let reconciler = Reconciler::new(storage, paths, config, events);
//! let report = reconciler.run(Some("home"));
//! println!("{}", report.message);
//! ```

pub mod archive;
pub mod backend;
pub mod file;
pub mod formats;
pub mod reconcile;
pub mod state;
mod types;

pub use archive::{BACKUP_EXTENSION, BackupSource, export_backup, import_backup, validate_archive};
pub use backend::{BackendKind, LocalFolderBackend, SyncBackend};
pub use formats::{ExportFormat, ImportFormat, export_entries, import_entries};
pub use reconcile::Reconciler;
pub use state::SyncState;
pub use types::{
    ExportSummary, ImportOutcome, SnapshotInfo, SyncError, SyncReport, SyncResult, SyncStatus,
};
