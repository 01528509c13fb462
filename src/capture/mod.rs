//! Clipboard capture.
//!
//! - [`clipboard`] - access to the system clipboard behind a trait
//! - [`detector`] - fingerprint-based change detection
//! - [`ignore`] - marker for the app's own clipboard writes
//! - [`monitor`] - the background poll loop

pub mod clipboard;
pub mod detector;
pub mod ignore;
pub mod monitor;

pub use clipboard::{ArboardClipboard, ClipboardAccess, MemoryClipboard};
pub use detector::{ChangeDetector, ClipboardChange};
pub use ignore::{IgnoreMarker, PendingWrite, WrittenChannel};
pub use monitor::{AutoSync, Watcher, WatcherOptions};
