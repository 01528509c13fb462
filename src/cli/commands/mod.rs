//! Command implementations.

pub mod backup;
pub mod completions;
pub mod config;
pub mod entries;
pub mod profile;
pub mod snippet;
pub mod sync;
pub mod version;
pub mod watch;

use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::capture::ArboardClipboard;
use crate::cli::Cli;
use crate::config::{AppConfig, DataPaths, resolve_data_dir, resolve_profile};
use crate::error::{Error, Result};
use crate::events::EventBus;
use crate::history::History;
use crate::storage::{ImageStore, SqliteStorage};
use crate::sync::Reconciler;

/// What every command needs: where the data lives, the settings snapshot,
/// the selected profile and the output mode.
#[derive(Debug, Clone)]
pub struct Context {
    pub paths: DataPaths,
    pub config: AppConfig,
    pub profile: Option<String>,
    pub json: bool,
}

impl Context {
    /// Resolve the data root and load settings.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if no data root can be determined or the
    /// settings file is invalid.
    pub fn from_cli(cli: &Cli, json: bool) -> Result<Self> {
        let root = resolve_data_dir(cli.data_dir.as_deref()).ok_or_else(|| {
            Error::Config("cannot determine a home directory; pass --data-dir".to_string())
        })?;
        let paths = DataPaths::new(root);
        paths.ensure()?;
        let config = AppConfig::load(&paths.config_file())?;

        Ok(Self {
            paths,
            config,
            profile: resolve_profile(cli.profile.as_deref()),
            json,
        })
    }

    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_storage(&self) -> Result<SqliteStorage> {
        SqliteStorage::open(&self.paths.database())
    }

    /// History service over the system clipboard.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn history(&self) -> Result<History> {
        Ok(History::new(
            self.open_storage()?,
            ImageStore::new(self.paths.root()),
            Box::new(ArboardClipboard::new()),
            EventBus::default(),
        ))
    }

    #[must_use]
    pub fn reconciler(&self, storage: Arc<Mutex<SqliteStorage>>, events: EventBus) -> Reconciler {
        Reconciler::new(storage, self.paths.clone(), self.config.clone(), events)
    }

    /// Persist a modified settings snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_config(&self, config: &AppConfig) -> Result<()> {
        config.save(&self.paths.config_file())
    }
}

/// Print one JSON document on stdout.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string(value)?);
    Ok(())
}

/// Fail unless a destructive command was confirmed.
///
/// # Errors
///
/// Returns `Error::ConfirmationRequired` when `yes` is false.
pub fn require_confirmation(yes: bool, action: &str) -> Result<()> {
    if yes {
        Ok(())
    } else {
        Err(Error::ConfirmationRequired(action.to_string()))
    }
}
