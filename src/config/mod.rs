//! Configuration management.
//!
//! This module resolves the clipstash data root and the files inside it, and
//! loads the JSON settings file.
//!
//! # Layout
//!
//! Everything lives under one data root (default `~/.clipstash/`):
//! - `clipboard_history.db` - the entry store
//! - `config.json` - settings, see [`AppConfig`]
//! - `sync_state.json` - last successful sync
//! - `ignore_next.json` - clipboard write the watcher should skip
//! - `images/` - PNG blobs referenced by image entries

mod settings;

pub use settings::{
    AppConfig, DEFAULT_RETENTION_COUNT, HistorySettings, SyncProfile, SyncSettings,
};

use std::path::{Path, PathBuf};

/// Environment variable overriding the data root.
pub const DATA_DIR_ENV: &str = "CLIPSTASH_DIR";

/// Environment variable selecting the active sync profile.
pub const PROFILE_ENV: &str = "CLIPSTASH_PROFILE";

pub const DB_FILE: &str = "clipboard_history.db";
pub const CONFIG_FILE: &str = "config.json";
pub const SYNC_STATE_FILE: &str = "sync_state.json";
pub const IGNORE_MARKER_FILE: &str = "ignore_next.json";

/// Well-known paths under a data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    root: PathBuf,
}

impl DataPaths {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn database(&self) -> PathBuf {
        self.root.join(DB_FILE)
    }

    /// SQLite side files that must never be copied on their own.
    #[must_use]
    pub fn database_side_files(&self) -> [PathBuf; 2] {
        [
            self.root.join(format!("{DB_FILE}-wal")),
            self.root.join(format!("{DB_FILE}-shm")),
        ]
    }

    #[must_use]
    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    #[must_use]
    pub fn sync_state(&self) -> PathBuf {
        self.root.join(SYNC_STATE_FILE)
    }

    #[must_use]
    pub fn images_dir(&self) -> PathBuf {
        self.root.join(crate::storage::images::IMAGES_DIR)
    }

    /// Create the data root if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created.
    pub fn ensure(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.root)
    }
}

/// Get the global clipstash directory location (`~/.clipstash/`).
#[must_use]
pub fn global_clipstash_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".clipstash"))
}

/// Resolve the data root.
///
/// Priority:
/// 1. If `explicit` is provided, use it directly
/// 2. `CLIPSTASH_DIR` environment variable
/// 3. Global location: `~/.clipstash/`
///
/// # Returns
///
/// Returns `None` only if no home directory can be determined.
#[must_use]
pub fn resolve_data_dir(explicit: Option<&Path>) -> Option<PathBuf> {
    resolve_data_dir_from(explicit, std::env::var(DATA_DIR_ENV).ok())
}

fn resolve_data_dir_from(explicit: Option<&Path>, env_value: Option<String>) -> Option<PathBuf> {
    // Priority 1: Explicit path from CLI flag
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Some(dir) = env_value.filter(|v| !v.trim().is_empty()) {
        return Some(PathBuf::from(dir));
    }

    // Priority 3: Home directory
    global_clipstash_dir()
}

/// Resolve the sync profile chosen for this process.
///
/// The flag wins over `CLIPSTASH_PROFILE`. The choice is never written
/// back to the config file.
#[must_use]
pub fn resolve_profile(explicit: Option<&str>) -> Option<String> {
    resolve_profile_from(explicit, std::env::var(PROFILE_ENV).ok())
}

fn resolve_profile_from(explicit: Option<&str>, env_value: Option<String>) -> Option<String> {
    explicit
        .map(ToString::to_string)
        .or(env_value)
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_data_dir_with_explicit() {
        let explicit = PathBuf::from("/custom/dir");
        let resolved = resolve_data_dir_from(Some(&explicit), Some("/from/env".into()));
        assert_eq!(resolved, Some(explicit));
    }

    #[test]
    fn test_resolve_data_dir_env_then_home() {
        assert_eq!(
            resolve_data_dir_from(None, Some("/from/env".into())),
            Some(PathBuf::from("/from/env"))
        );

        let fallback = resolve_data_dir_from(None, Some("  ".into()));
        assert_eq!(fallback, global_clipstash_dir());
        if let Some(path) = fallback {
            assert!(path.ends_with(".clipstash"));
        }
    }

    #[test]
    fn test_resolve_profile_priority() {
        assert_eq!(
            resolve_profile_from(Some("work"), Some("home".into())).as_deref(),
            Some("work")
        );
        assert_eq!(
            resolve_profile_from(None, Some("home".into())).as_deref(),
            Some("home")
        );
        assert_eq!(resolve_profile_from(Some(" "), None), None);
        assert_eq!(resolve_profile_from(None, None), None);
    }

    #[test]
    fn test_data_paths_layout() {
        let paths = DataPaths::new("/data");
        assert_eq!(paths.database(), PathBuf::from("/data/clipboard_history.db"));
        assert_eq!(paths.config_file(), PathBuf::from("/data/config.json"));
        assert_eq!(paths.sync_state(), PathBuf::from("/data/sync_state.json"));
        assert_eq!(paths.images_dir(), PathBuf::from("/data/images"));
        assert_eq!(
            paths.database_side_files()[0],
            PathBuf::from("/data/clipboard_history.db-wal")
        );
    }
}
