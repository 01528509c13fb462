//! Error types for clipstash.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=db, 3=not_found, 4=validation, etc.)
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

use crate::sync::SyncError;

/// Result type alias for clipstash operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Database (exit 2)
    DatabaseError,

    // Not Found (exit 3)
    EntryNotFound,
    ProfileNotFound,
    NoActiveProfile,
    SnapshotNotFound,

    // Validation (exit 4)
    InvalidArgument,
    ConfirmationRequired,

    // Clipboard (exit 5)
    ClipboardError,
    ImageError,

    // Sync (exit 6)
    SyncError,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::DatabaseError => "DATABASE_ERROR",
            Self::EntryNotFound => "ENTRY_NOT_FOUND",
            Self::ProfileNotFound => "PROFILE_NOT_FOUND",
            Self::NoActiveProfile => "NO_ACTIVE_PROFILE",
            Self::SnapshotNotFound => "SNAPSHOT_NOT_FOUND",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::ConfirmationRequired => "CONFIRMATION_REQUIRED",
            Self::ClipboardError => "CLIPBOARD_ERROR",
            Self::ImageError => "IMAGE_ERROR",
            Self::SyncError => "SYNC_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::DatabaseError => 2,
            Self::EntryNotFound
            | Self::ProfileNotFound
            | Self::NoActiveProfile
            | Self::SnapshotNotFound => 3,
            Self::InvalidArgument | Self::ConfirmationRequired => 4,
            Self::ClipboardError | Self::ImageError => 5,
            Self::SyncError => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether the caller can retry with corrected input.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InvalidArgument
                | Self::ConfirmationRequired
                | Self::ClipboardError
                | Self::DatabaseError
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in clipstash operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Entry not found: {id}")]
    EntryNotFound { id: i64 },

    #[error("Image file missing for entry {id}: {path}")]
    ImageMissing { id: i64, path: PathBuf },

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Clipboard error: {0}")]
    Clipboard(String),

    #[error("Image error: {0}")]
    Image(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Refusing to {0} without confirmation")]
    ConfirmationRequired(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::EntryNotFound { .. } => ErrorCode::EntryNotFound,
            Self::ImageMissing { .. } | Self::Image(_) => ErrorCode::ImageError,
            Self::Database(_) => ErrorCode::DatabaseError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Sync(e) => match e {
                SyncError::NoProfile => ErrorCode::NoActiveProfile,
                SyncError::ProfileNotFound { .. } => ErrorCode::ProfileNotFound,
                SyncError::SnapshotNotFound(_) => ErrorCode::SnapshotNotFound,
                _ => ErrorCode::SyncError,
            },
            Self::Clipboard(_) => ErrorCode::ClipboardError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::ConfirmationRequired(_) => ErrorCode::ConfirmationRequired,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::EntryNotFound { id } => Some(format!(
                "No entry with ID {id}. Use `clipstash list` to see stored entries."
            )),

            Self::ImageMissing { .. } => Some(
                "The image file was removed outside clipstash. \
                 Delete the entry or restore a backup."
                    .to_string(),
            ),

            Self::Sync(SyncError::NoProfile) => Some(
                "Select a profile with `--profile <name>` or CLIPSTASH_PROFILE.\n  \
                 Create one: clipstash profile add <name> <folder>"
                    .to_string(),
            ),

            Self::Sync(SyncError::ProfileNotFound { available, .. }) => {
                if available.is_empty() {
                    Some("No sync profiles exist yet. Create one: clipstash profile add <name> <folder>".to_string())
                } else {
                    Some(format!("Known profiles: {}", available.join(", ")))
                }
            }

            Self::Sync(SyncError::TargetUnavailable { path, .. }) => Some(format!(
                "Make sure {} exists and is mounted, or update the profile.",
                path.display()
            )),

            Self::ConfirmationRequired(_) => {
                Some("Re-run with `--yes` to confirm.".to_string())
            }

            Self::Clipboard(_) => Some(
                "The clipboard may be locked by another application. Try again.".to_string(),
            ),

            Self::Database(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::Sync(_)
            | Self::Image(_)
            | Self::InvalidArgument(_)
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
