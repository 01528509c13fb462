//! The `config.json` settings file.
//!
//! Keys this crate does not know about (theme, hotkeys, integrations written
//! by other front ends) are kept in `extra` maps and written back untouched.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::sync::SyncError;

/// Snapshots kept per profile unless told otherwise.
pub const DEFAULT_RETENTION_COUNT: usize = 5;

const MIN_POLL_INTERVAL_MS: u64 = 100;

/// Whole settings file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub history: HistorySettings,
    pub sync: SyncSettings,
    pub poll_interval_ms: u64,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            history: HistorySettings::default(),
            sync: SyncSettings::default(),
            poll_interval_ms: 1_000,
            extra: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistorySettings {
    /// Unprotected entries older than this many days are pruned. `0` keeps all.
    pub retention_days: u32,
    pub log_images: bool,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for HistorySettings {
    fn default() -> Self {
        Self {
            retention_days: 30,
            log_images: true,
            extra: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    pub auto_sync: bool,
    pub sync_interval_minutes: u64,
    pub timeout_secs: u64,
    pub profiles: Vec<SyncProfile>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            auto_sync: false,
            sync_interval_minutes: 15,
            timeout_secs: 120,
            profiles: Vec::new(),
            extra: serde_json::Map::new(),
        }
    }
}

/// A named shared folder that receives snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProfile {
    pub name: String,
    pub path: PathBuf,
    /// Snapshots kept in the folder. `0` keeps all of them.
    #[serde(default = "default_retention_count")]
    pub retention_count: usize,
}

fn default_retention_count() -> usize {
    DEFAULT_RETENTION_COUNT
}

impl AppConfig {
    /// Load settings, falling back to defaults when the file is absent.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the file exists but is not valid settings JSON.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No config file, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };

        if raw.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    /// Write settings atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        crate::sync::file::atomic_write(path, json.as_bytes())?;
        Ok(())
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(MIN_POLL_INTERVAL_MS))
    }

    #[must_use]
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync.sync_interval_minutes.max(1) * 60)
    }

    #[must_use]
    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync.timeout_secs.max(1))
    }

    #[must_use]
    pub fn profile_names(&self) -> Vec<String> {
        self.sync.profiles.iter().map(|p| p.name.clone()).collect()
    }

    #[must_use]
    pub fn find_profile(&self, name: &str) -> Option<&SyncProfile> {
        self.sync.profiles.iter().find(|p| p.name == name)
    }

    /// Look up the profile selected for this process.
    ///
    /// # Errors
    ///
    /// `SyncError::NoProfile` when nothing is selected,
    /// `SyncError::ProfileNotFound` when the name is unknown.
    pub fn require_profile(&self, name: Option<&str>) -> std::result::Result<&SyncProfile, SyncError> {
        let name = name.ok_or(SyncError::NoProfile)?;
        self.find_profile(name)
            .ok_or_else(|| SyncError::ProfileNotFound {
                name: name.to_string(),
                available: self.profile_names(),
            })
    }

    /// Register a new profile.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` for an empty name or path, or a name
    /// that is already taken.
    pub fn add_profile(&mut self, profile: SyncProfile) -> Result<()> {
        let name = profile.name.trim();
        if name.is_empty() {
            return Err(Error::InvalidArgument("profile name must not be empty".into()));
        }
        if profile.path.as_os_str().is_empty() {
            return Err(Error::InvalidArgument("profile path must not be empty".into()));
        }
        if self.find_profile(name).is_some() {
            return Err(Error::InvalidArgument(format!("profile already exists: {name}")));
        }

        self.sync.profiles.push(SyncProfile {
            name: name.to_string(),
            ..profile
        });
        Ok(())
    }

    /// Remove a profile by name, returning it.
    ///
    /// # Errors
    ///
    /// Returns `SyncError::ProfileNotFound` if no profile has that name.
    pub fn remove_profile(&mut self, name: &str) -> Result<SyncProfile> {
        let Some(index) = self.sync.profiles.iter().position(|p| p.name == name) else {
            return Err(SyncError::ProfileNotFound {
                name: name.to_string(),
                available: self.profile_names(),
            }
            .into());
        };
        Ok(self.sync.profiles.remove(index))
    }

    /// Enable or disable periodic sync, optionally changing the interval.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidArgument` for a zero interval.
    pub fn set_auto_sync(&mut self, enabled: bool, interval_minutes: Option<u64>) -> Result<()> {
        if let Some(minutes) = interval_minutes {
            if minutes == 0 {
                return Err(Error::InvalidArgument(
                    "sync interval must be at least one minute".into(),
                ));
            }
            self.sync.sync_interval_minutes = minutes;
        }
        self.sync.auto_sync = enabled;
        Ok(())
    }
}
