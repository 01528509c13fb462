//! File helpers shared by backups, exports and sync.
//!
//! Nothing here ever leaves a half-written file at its final path.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::sync::types::SyncResult;

/// Extension used while a file is being written into place.
pub const PARTIAL_EXTENSION: &str = "partial";

/// Replace `path` with `content`, creating parent directories as needed.
///
/// The bytes go to `<path>.tmp`, are flushed to disk, then renamed over
/// `path`. An existing file is untouched on failure.
///
/// # Errors
///
/// Returns an error if creating, writing or renaming fails.
pub fn atomic_write(path: &Path, content: &[u8]) -> SyncResult<()> {
    let temp_path = with_suffix(path, "tmp");
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let written = File::create(&temp_path).and_then(|file| {
        let mut writer = BufWriter::new(file);
        writer.write_all(content)?;
        writer.flush()?;
        writer.get_ref().sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(e.into());
    }

    fs::rename(&temp_path, path)?;
    Ok(())
}

/// Copy `src` to `dest`, never leaving a truncated `dest` behind.
///
/// The bytes land in `<dest>.partial` first and are renamed once flushed.
/// Returns the number of bytes copied.
///
/// # Errors
///
/// Returns an error if reading, writing or renaming fails. The partial file
/// is removed on failure.
pub fn atomic_copy(src: &Path, dest: &Path) -> SyncResult<u64> {
    let partial = with_suffix(dest, PARTIAL_EXTENSION);

    let copied = (|| -> io::Result<u64> {
        let mut reader = File::open(src)?;
        let mut writer = File::create(&partial)?;
        let bytes = io::copy(&mut reader, &mut writer)?;
        writer.sync_all()?;
        Ok(bytes)
    })();

    match copied {
        Ok(bytes) => {
            fs::rename(&partial, dest)?;
            Ok(bytes)
        }
        Err(e) => {
            let _ = fs::remove_file(&partial);
            Err(e.into())
        }
    }
}

/// `dir/<stem>.<ext>`, or `dir/<stem>_<n>.<ext>` for the first free `n`.
#[must_use]
pub fn unique_path(dir: &Path, stem: &str, extension: &str) -> PathBuf {
    let candidate = dir.join(format!("{stem}.{extension}"));
    if !candidate.exists() {
        return candidate;
    }
    (1..)
        .map(|n| dir.join(format!("{stem}_{n}.{extension}")))
        .find(|p| !p.exists())
        .unwrap_or(candidate)
}

/// Size of `path` in bytes, 0 if it is missing.
#[must_use]
pub fn file_size(path: &Path) -> u64 {
    fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Remove a file if present. Returns whether it existed.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be removed.
pub fn remove_if_exists(path: &Path) -> io::Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
