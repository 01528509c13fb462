//! Full-backup archives.
//!
//! A backup is a zip holding everything under the data root that matters:
//!
//! ```text
//! clipboard_history.db
//! config.json            (when present)
//! images/<name>.png
//! ```
//!
//! The database entry is produced with SQLite's online backup after a WAL
//! checkpoint, so it is self-contained and no `-wal`/`-shm` file is ever
//! archived. Sync snapshots use the same format.

use std::fs::{self, File};
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::config::{CONFIG_FILE, DB_FILE, DataPaths};
use crate::storage::SqliteStorage;
use crate::storage::images::IMAGES_DIR;
use crate::sync::file::{PARTIAL_EXTENSION, file_size, remove_if_exists};
use crate::sync::types::{ExportSummary, ImportOutcome, SyncError, SyncResult};

/// Extension given to backups written without one.
pub const BACKUP_EXTENSION: &str = "clipbackup";

/// What a validated archive contains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveManifest {
    pub entries: Vec<PathBuf>,
    pub has_config: bool,
    pub images: usize,
}

/// Everything a backup needs, taken while the store is held.
///
/// [`BackupSource::capture`] copies the database and lists the images; the
/// store can be released before [`BackupSource::write`] does the slow part.
/// The database copy is removed when the source is dropped.
#[derive(Debug)]
pub struct BackupSource {
    db_copy: PathBuf,
    config: Option<PathBuf>,
    images: Vec<(String, PathBuf)>,
}

impl BackupSource {
    /// Copy the database and list the files that go with it.
    ///
    /// # Errors
    ///
    /// Returns an error if the database copy fails or the images directory
    /// cannot be read.
    pub fn capture(storage: &SqliteStorage, paths: &DataPaths) -> SyncResult<Self> {
        paths.ensure()?;
        let mut source = Self {
            db_copy: paths
                .root()
                .join(format!(".export-{}.db", uuid::Uuid::new_v4())),
            config: Some(paths.config_file()).filter(|p| p.is_file()),
            images: Vec::new(),
        };
        storage.backup_to(&source.db_copy)?;

        for path in files_under(&paths.images_dir())? {
            if let Ok(relative) = path.strip_prefix(paths.root()) {
                source.images.push((archive_name(relative), path.clone()));
            }
        }
        Ok(source)
    }

    /// Zip the captured files to `destination`.
    ///
    /// A `.clipbackup` extension is added when `destination` has none.
    /// Images deleted since the capture are skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive cannot be written. No file is left at
    /// the destination on failure.
    pub fn write(&self, destination: &Path) -> SyncResult<ExportSummary> {
        let destination = with_default_extension(destination);
        if let Some(parent) = destination.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let partial = suffixed(&destination, PARTIAL_EXTENSION);
        let images = match self.write_archive(&partial) {
            Ok(images) => images,
            Err(e) => {
                let _ = remove_if_exists(&partial);
                return Err(e);
            }
        };
        fs::rename(&partial, &destination)?;

        let summary = ExportSummary {
            size: file_size(&destination),
            path: destination,
            includes_config: self.config.is_some(),
            images,
        };
        info!(path = %summary.path.display(), images, bytes = summary.size, "Backup written");
        Ok(summary)
    }

    fn write_archive(&self, target: &Path) -> SyncResult<usize> {
        let mut zip = ZipWriter::new(File::create(target)?);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        add_file(&mut zip, DB_FILE, &self.db_copy, options)?;
        if let Some(config) = &self.config {
            add_file(&mut zip, CONFIG_FILE, config, options)?;
        }

        let mut images = 0;
        for (name, path) in &self.images {
            let reader = match File::open(path) {
                Ok(reader) => reader,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!(entry = %name, "Image removed before archiving, skipped");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            add_entry(&mut zip, name, reader, options)?;
            images += 1;
        }

        zip.finish()?.sync_all()?;
        Ok(images)
    }
}

impl Drop for BackupSource {
    fn drop(&mut self) {
        if let Err(e) = remove_if_exists(&self.db_copy) {
            warn!(path = %self.db_copy.display(), error = %e, "Failed to remove database copy");
        }
    }
}

/// Write a full backup of the data root to `destination`.
///
/// # Errors
///
/// Returns an error if the database cannot be copied or the archive cannot
/// be written. No file is left at the destination on failure.
pub fn export_backup(
    storage: &SqliteStorage,
    paths: &DataPaths,
    destination: &Path,
) -> SyncResult<ExportSummary> {
    BackupSource::capture(storage, paths)?.write(destination)
}

fn add_file(
    zip: &mut ZipWriter<File>,
    name: &str,
    source: &Path,
    options: SimpleFileOptions,
) -> SyncResult<()> {
    add_entry(zip, name, File::open(source)?, options)
}

fn add_entry(
    zip: &mut ZipWriter<File>,
    name: &str,
    mut reader: File,
    options: SimpleFileOptions,
) -> SyncResult<()> {
    zip.start_file(name, options)?;
    io::copy(&mut reader, zip)?;
    debug!(entry = name, "Archived");
    Ok(())
}

/// Check that `source` is a restorable backup without touching the data root.
///
/// # Errors
///
/// Returns `SyncError::InvalidArchive` if the file is not a zip, lacks the
/// database entry, or contains an entry that would land outside the data root.
pub fn validate_archive(source: &Path) -> SyncResult<ArchiveManifest> {
    let file = File::open(source)?;
    let mut archive =
        ZipArchive::new(file).map_err(|e| SyncError::InvalidArchive(e.to_string()))?;

    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let entry = archive
            .by_index(i)
            .map_err(|e| SyncError::InvalidArchive(e.to_string()))?;
        let name = entry.name().to_string();
        let safe = entry
            .enclosed_name()
            .filter(|p| p.components().all(|c| matches!(c, Component::Normal(_))));
        let Some(path) = safe else {
            return Err(SyncError::InvalidArchive(format!(
                "entry escapes the data directory: {name}"
            )));
        };
        entries.push(path);
    }

    if !entries.iter().any(|p| p == Path::new(DB_FILE)) {
        return Err(SyncError::InvalidArchive(format!("missing {DB_FILE}")));
    }

    Ok(ArchiveManifest {
        has_config: entries.iter().any(|p| p == Path::new(CONFIG_FILE)),
        images: entries
            .iter()
            .filter(|p| p.starts_with(IMAGES_DIR) && p.as_path() != Path::new(IMAGES_DIR))
            .count(),
        entries,
    })
}

/// Replace the data root's contents with a backup.
///
/// The archive is validated first. The store is then closed, the database
/// (with its side files), config and images directory are removed, and the
/// archive is extracted.
///
/// Whatever the result, `storage` is gone afterwards: reopen the database
/// before using history again. After a failure past validation the database
/// file may be missing, in which case reopening creates an empty one.
///
/// # Errors
///
/// Returns an error if validation, removal or extraction fails.
pub fn import_backup(
    storage: SqliteStorage,
    paths: &DataPaths,
    source: &Path,
) -> SyncResult<ImportOutcome> {
    let manifest = validate_archive(source)?;
    storage.close()?;

    remove_if_exists(&paths.database())?;
    for side in paths.database_side_files() {
        remove_if_exists(&side)?;
    }
    remove_if_exists(&paths.config_file())?;
    let images_dir = paths.images_dir();
    if images_dir.is_dir() {
        fs::remove_dir_all(&images_dir)?;
    }

    paths.ensure()?;
    let files_restored = match extract(source, paths.root()) {
        Ok(count) => count,
        Err(e) => {
            // Never leave a partial database; reopening creates an empty one.
            discard_database(paths);
            warn!(source = %source.display(), error = %e, "Backup restore failed");
            return Err(e);
        }
    };

    info!(
        source = %source.display(),
        files = files_restored,
        images = manifest.images,
        "Backup restored"
    );
    Ok(ImportOutcome::RestartRequired { files_restored })
}

fn discard_database(paths: &DataPaths) {
    let db = paths.database();
    let mut doomed = vec![suffixed(&db, PARTIAL_EXTENSION), db];
    doomed.extend(paths.database_side_files());
    for path in doomed {
        if let Err(e) = remove_if_exists(&path) {
            warn!(path = %path.display(), error = %e, "Failed to remove database file");
        }
    }
}

/// Unpack every entry below `root`. The database is written last.
///
/// Each file is written to `<target>.partial` and renamed only once its
/// checksum has been verified, so no truncated file is left in place.
fn extract(source: &Path, root: &Path) -> SyncResult<usize> {
    let mut archive = ZipArchive::new(File::open(source)?)?;

    let mut order: Vec<usize> = Vec::with_capacity(archive.len());
    let mut database = None;
    for i in 0..archive.len() {
        if archive.by_index(i)?.name() == DB_FILE {
            database = Some(i);
        } else {
            order.push(i);
        }
    }
    order.extend(database);

    let mut restored = 0;
    for i in order {
        let mut entry = archive.by_index(i)?;
        let Some(relative) = entry.enclosed_name() else {
            warn!(entry = entry.name(), "Skipping unsafe archive entry");
            continue;
        };
        let target = root.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        extract_file(&mut entry, &target)?;
        restored += 1;
    }

    Ok(restored)
}

fn extract_file<R: io::Read>(entry: &mut R, target: &Path) -> SyncResult<()> {
    let partial = suffixed(target, PARTIAL_EXTENSION);
    let written = File::create(&partial).and_then(|mut out| {
        // Reading to the end is what verifies the entry's CRC.
        io::copy(entry, &mut out)?;
        out.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&partial);
        return Err(e.into());
    }
    fs::rename(&partial, target)?;
    Ok(())
}

/// Every regular file below `dir`, sorted. Missing `dir` yields nothing.
fn files_under(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    if !dir.is_dir() {
        return Ok(files);
    }
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.is_file() {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Zip entry name for a data-root relative path, always with `/`.
fn archive_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn with_default_extension(path: &Path) -> PathBuf {
    if path.extension().is_some() {
        path.to_path_buf()
    } else {
        path.with_extension(BACKUP_EXTENSION)
    }
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntryKind;
    use std::io::{Read, Write};
    use tempfile::TempDir;

    fn populated(root: &Path) -> (SqliteStorage, DataPaths) {
        let paths = DataPaths::new(root);
        let mut storage = SqliteStorage::open(&paths.database()).unwrap();
        storage.insert("alpha", EntryKind::Text).unwrap();
        storage.insert("images/img_1.png", EntryKind::Image).unwrap();
        fs::create_dir_all(paths.images_dir()).unwrap();
        fs::write(paths.images_dir().join("img_1.png"), b"png-bytes").unwrap();
        fs::write(paths.config_file(), r#"{"history": {"retention_days": 9}}"#).unwrap();
        (storage, paths)
    }

    fn entry_names(archive: &Path) -> Vec<String> {
        let mut zip = ZipArchive::new(File::open(archive).unwrap()).unwrap();
        (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect()
    }

    #[test]
    fn test_export_layout() {
        let data = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let (storage, paths) = populated(data.path());

        let summary = export_backup(&storage, &paths, &out.path().join("backup")).unwrap();
        assert_eq!(summary.path, out.path().join("backup.clipbackup"));
        assert!(summary.includes_config);
        assert_eq!(summary.images, 1);

        let names = entry_names(&summary.path);
        assert!(names.contains(&"clipboard_history.db".to_string()));
        assert!(names.contains(&"config.json".to_string()));
        assert!(names.contains(&"images/img_1.png".to_string()));
        assert!(!names.iter().any(|n| n.ends_with("-wal") || n.ends_with("-shm")));

        // Temporary database copy is cleaned up.
        let leftovers: Vec<_> = fs::read_dir(data.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with(".export-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_exported_db_is_self_contained() {
        let data = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let (storage, paths) = populated(data.path());
        let summary = export_backup(&storage, &paths, &out.path().join("b.zip")).unwrap();

        let mut zip = ZipArchive::new(File::open(&summary.path).unwrap()).unwrap();
        let mut db_bytes = Vec::new();
        zip.by_name(DB_FILE).unwrap().read_to_end(&mut db_bytes).unwrap();
        let extracted = out.path().join("extracted.db");
        fs::write(&extracted, db_bytes).unwrap();

        let copy = SqliteStorage::open(&extracted).unwrap();
        assert_eq!(copy.count(None).unwrap(), 2);
    }

    #[test]
    fn test_export_then_import_restores_state() {
        let data = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let (mut storage, paths) = populated(data.path());
        let summary = export_backup(&storage, &paths, &out.path().join("b.clipbackup")).unwrap();

        // Diverge after the backup.
        storage.insert("beta", EntryKind::Text).unwrap();
        fs::write(paths.images_dir().join("stray.png"), b"x").unwrap();
        fs::write(paths.config_file(), "{}").unwrap();

        let outcome = import_backup(storage, &paths, &summary.path).unwrap();
        assert!(matches!(outcome, ImportOutcome::RestartRequired { files_restored: 3 }));

        let reopened = SqliteStorage::open(&paths.database()).unwrap();
        assert_eq!(reopened.count(None).unwrap(), 2);
        assert_eq!(reopened.count(Some("beta")).unwrap(), 0);
        assert!(paths.images_dir().join("img_1.png").is_file());
        assert!(!paths.images_dir().join("stray.png").exists());
        assert!(fs::read_to_string(paths.config_file()).unwrap().contains("retention_days"));
    }

    #[test]
    fn test_traversal_entries_rejected() {
        let dir = TempDir::new().unwrap();
        let evil = dir.path().join("evil.zip");
        {
            let mut zip = ZipWriter::new(File::create(&evil).unwrap());
            let options = SimpleFileOptions::default();
            zip.start_file(DB_FILE, options).unwrap();
            zip.write_all(b"db").unwrap();
            zip.start_file("../outside.txt", options).unwrap();
            zip.write_all(b"gotcha").unwrap();
            zip.finish().unwrap();
        }

        let err = validate_archive(&evil).unwrap_err();
        assert!(matches!(err, SyncError::InvalidArchive(_)));
    }

    #[test]
    fn test_archive_without_database_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nodb.zip");
        {
            let mut zip = ZipWriter::new(File::create(&path).unwrap());
            zip.start_file(CONFIG_FILE, SimpleFileOptions::default()).unwrap();
            zip.write_all(b"{}").unwrap();
            zip.finish().unwrap();
        }
        assert!(matches!(
            validate_archive(&path),
            Err(SyncError::InvalidArchive(_))
        ));
    }

    #[test]
    fn test_corrupt_database_entry_leaves_an_openable_store() {
        let data = TempDir::new().unwrap();
        let (storage, paths) = populated(data.path());

        let good = data.path().join("good.db");
        storage.backup_to(&good).unwrap();
        let db_bytes = fs::read(&good).unwrap();
        fs::remove_file(&good).unwrap();

        // Stored entries keep the payload verbatim, so a byte can be flipped
        // in place without breaking the zip structure.
        let broken = data.path().join("broken.zip");
        {
            let mut zip = ZipWriter::new(File::create(&broken).unwrap());
            let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
            zip.start_file(CONFIG_FILE, stored).unwrap();
            zip.write_all(br#"{"history": {"retention_days": 3}}"#).unwrap();
            zip.start_file(DB_FILE, stored).unwrap();
            zip.write_all(&db_bytes).unwrap();
            zip.finish().unwrap();
        }
        let mut raw = fs::read(&broken).unwrap();
        let magic = raw
            .windows(15)
            .position(|w| w == b"SQLite format 3")
            .unwrap();
        raw[magic] ^= 0x20;
        fs::write(&broken, raw).unwrap();

        assert!(validate_archive(&broken).is_ok());
        assert!(import_backup(storage, &paths, &broken).is_err());

        assert!(!paths.database().exists());
        assert!(!suffixed(&paths.database(), PARTIAL_EXTENSION).exists());
        let reopened = SqliteStorage::open(&paths.database()).unwrap();
        assert_eq!(reopened.count(None).unwrap(), 0);
    }

    #[test]
    fn test_capture_releases_store_before_zipping() {
        let data = TempDir::new().unwrap();
        let out = TempDir::new().unwrap();
        let (mut storage, paths) = populated(data.path());
        fs::write(paths.images_dir().join("img_2.png"), b"second").unwrap();

        let source = BackupSource::capture(&storage, &paths).unwrap();

        // The store is free again while the archive is still unwritten.
        storage.insert("after capture", EntryKind::Text).unwrap();
        fs::remove_file(paths.images_dir().join("img_2.png")).unwrap();

        let summary = source.write(&out.path().join("snap.zip")).unwrap();
        assert_eq!(summary.images, 1);
        assert!(!entry_names(&summary.path).contains(&"images/img_2.png".to_string()));

        drop(source);
        let leftovers = fs::read_dir(data.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().starts_with(".export-"))
            .count();
        assert_eq!(leftovers, 0);

        let mut zip = ZipArchive::new(File::open(&summary.path).unwrap()).unwrap();
        let mut db_bytes = Vec::new();
        zip.by_name(DB_FILE).unwrap().read_to_end(&mut db_bytes).unwrap();
        let extracted = out.path().join("snap.db");
        fs::write(&extracted, db_bytes).unwrap();
        assert_eq!(SqliteStorage::open(&extracted).unwrap().count(None).unwrap(), 2);
    }

    #[test]
    fn test_invalid_import_leaves_data_untouched() {
        let data = TempDir::new().unwrap();
        let (storage, paths) = populated(data.path());
        let junk = data.path().join("junk.zip");
        fs::write(&junk, b"not a zip at all").unwrap();

        assert!(import_backup(storage, &paths, &junk).is_err());

        let reopened = SqliteStorage::open(&paths.database()).unwrap();
        assert_eq!(reopened.count(None).unwrap(), 2);
        assert!(paths.images_dir().join("img_1.png").is_file());
    }
}
