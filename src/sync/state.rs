//! Local record of the last successful sync (`sync_state.json`).

use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::sync::file::{atomic_write, remove_if_exists};
use crate::sync::types::SyncResult;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    pub last_sync_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_profile: Option<String>,
    #[serde(default)]
    pub last_snapshot: Option<String>,
}

impl SyncState {
    /// State after a successful upload.
    #[must_use]
    pub fn synced(profile: &str, snapshot: &str, at: DateTime<Utc>) -> Self {
        Self {
            last_sync_timestamp: Some(at),
            last_profile: Some(profile.to_string()),
            last_snapshot: Some(snapshot.to_string()),
        }
    }

    /// Read the state file. A missing or unreadable file means "never synced".
    #[must_use]
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "Failed to read sync state");
                }
                return Self::default();
            }
        };

        serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "Ignoring corrupt sync state");
            Self::default()
        })
    }

    /// Overwrite the state file.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: &Path) -> SyncResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        atomic_write(path, json.as_bytes())
    }

    /// Forget the last sync. Returns whether a state file existed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn reset(path: &Path) -> SyncResult<bool> {
        Ok(remove_if_exists(path)?)
    }

    #[must_use]
    pub fn has_synced(&self) -> bool {
        self.last_sync_timestamp.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_state_is_default() {
        let dir = TempDir::new().unwrap();
        let state = SyncState::load(&dir.path().join("sync_state.json"));
        assert!(!state.has_synced());
    }

    #[test]
    fn test_save_load_reset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sync_state.json");
        let at = DateTime::parse_from_rfc3339("2024-06-01T08:30:00Z")
            .unwrap()
            .with_timezone(&Utc);

        SyncState::synced("home", "clipstash_sync_20240601_083000_000.zip", at)
            .save(&path)
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["last_sync_timestamp"], "2024-06-01T08:30:00Z");

        let loaded = SyncState::load(&path);
        assert_eq!(loaded.last_profile.as_deref(), Some("home"));
        assert_eq!(loaded.last_sync_timestamp, Some(at));

        assert!(SyncState::reset(&path).unwrap());
        assert!(!SyncState::reset(&path).unwrap());
        assert!(!SyncState::load(&path).has_synced());
    }

    #[test]
    fn test_legacy_state_shape_is_tolerated() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sync_state.json");
        std::fs::write(&path, r#"{"sync_id": null}"#).unwrap();
        assert_eq!(SyncState::load(&path), SyncState::default());
    }
}
