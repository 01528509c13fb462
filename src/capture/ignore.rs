//! Marker for clipboard writes made by clipstash itself.
//!
//! `clipstash copy` and `clipstash watch` usually run as separate processes,
//! so the writer leaves `ignore_next.json` in the data root naming what it
//! put on the clipboard. The watcher drops the marker once it samples a
//! matching clipboard and skips that sample.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::IGNORE_MARKER_FILE;
use crate::error::Result;
use crate::sync::file::{atomic_write, remove_if_exists};

/// A marker older than this never suppresses a sample.
pub const MARKER_TTL: Duration = Duration::from_secs(10);

/// Which clipboard channel a write went to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WrittenChannel {
    Text,
    Image,
}

/// Contents of the marker file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingWrite {
    pub channel: WrittenChannel,
    /// Same fingerprint the detector computes for that channel.
    pub fingerprint: String,
    pub written_at: DateTime<Utc>,
}

impl PendingWrite {
    /// Whether a sample with these fingerprints is the write this marker names.
    #[must_use]
    pub fn matches(&self, text: Option<&str>, image: Option<&str>) -> bool {
        let current = match self.channel {
            WrittenChannel::Text => text,
            WrittenChannel::Image => image,
        };
        current == Some(self.fingerprint.as_str())
    }

    fn is_stale(&self, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.written_at)
            .to_std()
            .is_ok_and(|age| age > MARKER_TTL)
    }
}

/// Handle to the marker file of one data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IgnoreMarker {
    path: PathBuf,
}

impl IgnoreMarker {
    #[must_use]
    pub fn new(data_root: &Path) -> Self {
        Self {
            path: data_root.join(IGNORE_MARKER_FILE),
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Announce a write that is about to happen.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker cannot be written.
    pub fn arm(&self, channel: WrittenChannel, fingerprint: String) -> Result<()> {
        let pending = PendingWrite {
            channel,
            fingerprint,
            written_at: Utc::now(),
        };
        atomic_write(&self.path, &serde_json::to_vec(&pending)?)?;
        debug!(?channel, "Ignore marker armed");
        Ok(())
    }

    /// Remove the marker, if any.
    pub fn clear(&self) {
        if let Err(e) = remove_if_exists(&self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove ignore marker");
        }
    }

    /// The announced write, if one is waiting.
    ///
    /// Stale or unreadable markers are removed and yield `None`.
    #[must_use]
    pub fn pending(&self) -> Option<PendingWrite> {
        let raw = match std::fs::read(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    debug!(error = %e, "Ignore marker unreadable");
                }
                return None;
            }
        };

        let pending = match serde_json::from_slice::<PendingWrite>(&raw) {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "Discarding corrupt ignore marker");
                self.clear();
                return None;
            }
        };

        if pending.is_stale(Utc::now()) {
            debug!("Discarding stale ignore marker");
            self.clear();
            return None;
        }
        Some(pending)
    }
}
