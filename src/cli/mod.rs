//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::sync::{ExportFormat, ImportFormat};

pub mod commands;

/// clipstash - clipboard history with snippets, backups and folder sync
#[derive(Parser, Debug)]
#[command(name = "clipstash", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Data directory (default: ~/.clipstash)
    #[arg(long, global = true, env = "CLIPSTASH_DIR")]
    pub data_dir: Option<PathBuf>,

    /// Sync profile to use for this invocation
    #[arg(long, global = true, env = "CLIPSTASH_PROFILE")]
    pub profile: Option<String>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch the clipboard and record changes until interrupted
    Watch {
        /// Do not run automatic sync even if enabled in the config
        #[arg(long)]
        no_sync: bool,
    },

    /// List history, newest first
    List(ListArgs),

    /// Show one entry in full
    Show {
        /// Entry ID
        id: i64,
    },

    /// Copy an entry back to the clipboard
    Copy {
        /// Entry ID
        id: i64,
    },

    /// Record text and copy it to the clipboard
    CopyText {
        /// Text to copy
        text: String,
    },

    /// Toggle the pinned flag of an entry
    Pin {
        /// Entry ID
        id: i64,
    },

    /// Delete an entry (and its image file if unused)
    Delete {
        /// Entry ID
        id: i64,
    },

    /// Delete every entry that is neither pinned nor a snippet
    Clear {
        /// Skip confirmation
        #[arg(long)]
        yes: bool,
    },

    /// Apply the retention window now
    Prune {
        /// Override the configured retention in days
        #[arg(long)]
        days: Option<u32>,
    },

    /// Delete image files no entry references
    GcImages,

    /// Snippet management
    Snippet {
        #[command(subcommand)]
        command: SnippetCommands,
    },

    /// Full backups of the data directory
    Backup {
        #[command(subcommand)]
        command: BackupCommands,
    },

    /// Export history rows to another format
    Export {
        /// Destination file
        path: PathBuf,

        /// Output format
        #[arg(long, value_enum, default_value = "json")]
        format: ExportFormat,
    },

    /// Merge history rows from another format
    Import {
        /// Source file
        path: PathBuf,

        /// Input format
        #[arg(long, value_enum, default_value = "json")]
        format: ImportFormat,
    },

    /// Folder sync
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },

    /// Sync profile management
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },

    /// Settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Print version information
    Version,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Supported shells for completions.
#[derive(clap::ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Case-insensitive substring filter
    #[arg(short, long)]
    pub search: Option<String>,

    /// Page number (1-based)
    #[arg(long, default_value_t = 1)]
    pub page: usize,

    /// Entries per page
    #[arg(long, default_value_t = 20)]
    pub page_size: usize,
}

// ============================================================================
// Snippet Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum SnippetCommands {
    /// Create a new text snippet
    Add {
        /// Snippet text
        content: String,

        /// Short label
        #[arg(short, long)]
        key: Option<String>,
    },

    /// Mark an existing entry as a snippet
    Set {
        /// Entry ID
        id: i64,

        /// Short label
        #[arg(short, long)]
        key: Option<String>,
    },

    /// Return a snippet to plain history
    Unset {
        /// Entry ID
        id: i64,
    },
}

// ============================================================================
// Backup Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum BackupCommands {
    /// Write a full backup archive
    Export {
        /// Destination (".clipbackup" is added if there is no extension)
        path: PathBuf,
    },

    /// Replace all local data with a backup archive
    Import {
        /// Backup archive
        path: PathBuf,

        /// Skip confirmation
        #[arg(long)]
        yes: bool,
    },
}

// ============================================================================
// Sync Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum SyncCommands {
    /// Upload a snapshot to the active profile's folder
    Run,

    /// Show sync status
    Status,

    /// Forget the record of the last sync
    Reset,

    /// List snapshots in the active profile's folder
    Snapshots,

    /// Replace local data with a snapshot (latest if none given)
    Restore {
        /// Snapshot file name
        file: Option<String>,

        /// Skip confirmation
        #[arg(long)]
        yes: bool,
    },
}

// ============================================================================
// Profile Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum ProfileCommands {
    /// Add a sync profile
    Add {
        /// Unique profile name
        name: String,

        /// Folder that receives snapshots
        path: PathBuf,

        /// Snapshots to keep (0 keeps all)
        #[arg(long, default_value_t = crate::config::DEFAULT_RETENTION_COUNT)]
        retention: usize,
    },

    /// Remove a sync profile
    Remove {
        /// Profile name
        name: String,
    },

    /// List sync profiles
    List,
}

// ============================================================================
// Config Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the effective settings
    Show,

    /// Days to keep unprotected entries (0 keeps everything)
    SetRetention {
        days: u32,
    },

    /// Record images from the clipboard
    SetLogImages {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,
    },

    /// Enable or disable periodic sync while watching
    SetAutoSync {
        #[arg(action = clap::ArgAction::Set)]
        enabled: bool,

        /// Minutes between syncs
        #[arg(long)]
        interval: Option<u64>,
    },
}
