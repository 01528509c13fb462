//! History service.
//!
//! [`History`] is what front ends talk to. It ties the entry store to the
//! image blobs (so removing rows also removes files nobody references) and to
//! the clipboard (so copying an entry back does not get recorded again, even
//! by a watcher running in another process).
//!
//! Clones share the same store, clipboard, ignore marker and event bus.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::capture::{ClipboardAccess, ClipboardChange, IgnoreMarker, WrittenChannel};
use crate::error::{Error, Result};
use crate::events::{CoreEvent, EventBus};
use crate::model::{ClipboardEntry, EntryId, EntryKind, page_count};
use crate::storage::images::fingerprint;
use crate::storage::{DeletedEntry, ImageStore, PruneOutcome, SqliteStorage};

/// Shared clipboard handle used for writes.
pub type SharedClipboard = Arc<Mutex<Box<dyn ClipboardAccess + Send>>>;

/// One page of history plus what is needed to render a pager.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub entries: Vec<ClipboardEntry>,
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub pages: usize,
}

#[derive(Clone)]
pub struct History {
    storage: Arc<Mutex<SqliteStorage>>,
    images: ImageStore,
    clipboard: SharedClipboard,
    ignore: IgnoreMarker,
    events: EventBus,
}

impl History {
    pub fn new(
        storage: SqliteStorage,
        images: ImageStore,
        clipboard: Box<dyn ClipboardAccess + Send>,
        events: EventBus,
    ) -> Self {
        Self {
            storage: Arc::new(Mutex::new(storage)),
            ignore: IgnoreMarker::new(images.root()),
            images,
            clipboard: Arc::new(Mutex::new(clipboard)),
            events,
        }
    }

    /// Shared store handle, for the reconciler.
    #[must_use]
    pub fn storage(&self) -> Arc<Mutex<SqliteStorage>> {
        Arc::clone(&self.storage)
    }

    /// Marker to hand to the change detector watching the same clipboard.
    #[must_use]
    pub fn ignore_marker(&self) -> IgnoreMarker {
        self.ignore.clone()
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    #[must_use]
    pub fn images(&self) -> &ImageStore {
        &self.images
    }

    /// Take the store back out, e.g. to close it before a restore.
    ///
    /// # Errors
    ///
    /// Returns `Error::Other` if another clone still holds the store.
    pub fn into_storage(self) -> Result<SqliteStorage> {
        Arc::try_unwrap(self.storage)
            .map_err(|_| Error::Other("history store is still in use".to_string()))?
            .into_inner()
            .map_err(|_| poisoned())
    }

    fn lock(&self) -> Result<MutexGuard<'_, SqliteStorage>> {
        self.storage.lock().map_err(|_| poisoned())
    }

    // ==================
    // Capture
    // ==================

    /// Store a detected clipboard change.
    ///
    /// Returns the new id, or `None` when the store collapsed it into a
    /// recent duplicate.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn record(&self, change: ClipboardChange) -> Result<Option<EntryId>> {
        let (content, kind) = match change {
            ClipboardChange::TextChanged(text) => (text, EntryKind::Text),
            ClipboardChange::ImageChanged(path) => (path, EntryKind::Image),
        };

        let id = self.lock()?.insert(&content, kind)?;
        match id {
            Some(id) => {
                debug!(id, %kind, "Recorded clipboard entry");
                self.events.publish(CoreEvent::EntryAdded { id, kind });
            }
            None if kind == EntryKind::Image => {
                // The blob was written for a row that was never created.
                if let Err(e) = self.images.delete(&content) {
                    warn!(path = %content, error = %e, "Failed to remove duplicate image");
                }
            }
            None => {}
        }
        Ok(id)
    }

    // ==================
    // Browsing
    // ==================

    /// One page of history, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list(&self, search: Option<&str>, page: usize, page_size: usize) -> Result<HistoryPage> {
        let storage = self.lock()?;
        let total = storage.count(search)?;
        let pages = page_count(total, page_size);
        let page = page.clamp(1, pages);
        let entries = storage.list(search, page, page_size)?;
        Ok(HistoryPage {
            entries,
            page,
            page_size,
            total,
            pages,
        })
    }

    /// # Errors
    ///
    /// Returns `Error::EntryNotFound` if no entry has this id.
    pub fn get(&self, id: EntryId) -> Result<ClipboardEntry> {
        self.lock()?.get(id)?.ok_or(Error::EntryNotFound { id })
    }

    // ==================
    // Clipboard writes
    // ==================

    /// Put an entry back on the clipboard without recording it again.
    ///
    /// # Errors
    ///
    /// Returns `EntryNotFound`, `ImageMissing` when the blob is gone, or a
    /// clipboard error.
    pub fn copy_to_clipboard(&self, id: EntryId) -> Result<ClipboardEntry> {
        let entry = self.get(id)?;
        match entry.kind {
            EntryKind::Text => self.write_text(&entry.content)?,
            EntryKind::Image => {
                if !self.images.exists(&entry.content) {
                    return Err(Error::ImageMissing {
                        id,
                        path: self.images.resolve(&entry.content)?,
                    });
                }
                let raw = self.images.load(&entry.content)?;
                let fp = fingerprint(&raw.encode_png()?);
                self.with_clipboard(WrittenChannel::Image, fp, |clipboard| {
                    clipboard.write_image(&raw)
                })?;
            }
        }
        info!(id, kind = %entry.kind, "Copied entry to clipboard");
        Ok(entry)
    }

    /// Record `text` and put it on the clipboard.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert or the clipboard write fails.
    pub fn copy_text(&self, text: &str) -> Result<Option<EntryId>> {
        let id = self.record(ClipboardChange::TextChanged(text.to_string()))?;
        self.write_text(text)?;
        Ok(id)
    }

    fn write_text(&self, text: &str) -> Result<()> {
        let fp = fingerprint(text.as_bytes());
        self.with_clipboard(WrittenChannel::Text, fp, |clipboard| clipboard.write_text(text))
    }

    /// Run a clipboard write with the ignore marker armed, clearing it again
    /// if the write fails.
    fn with_clipboard<F>(&self, channel: WrittenChannel, fingerprint: String, write: F) -> Result<()>
    where
        F: FnOnce(&mut Box<dyn ClipboardAccess + Send>) -> Result<()>,
    {
        let mut clipboard = self
            .clipboard
            .lock()
            .map_err(|_| Error::Clipboard("clipboard lock poisoned".to_string()))?;
        self.ignore.arm(channel, fingerprint)?;
        write(&mut *clipboard).inspect_err(|_| self.ignore.clear())
    }

    // ==================
    // Flags
    // ==================

    /// Flip the pinned flag. Returns the new state.
    ///
    /// # Errors
    ///
    /// Returns `Error::EntryNotFound` if no entry has this id.
    pub fn toggle_pin(&self, id: EntryId) -> Result<bool> {
        self.lock()?.toggle_pin(id)?.ok_or(Error::EntryNotFound { id })
    }

    /// Create a new text snippet.
    ///
    /// # Errors
    ///
    /// Returns an error for empty content or if the insert fails.
    pub fn add_snippet(&self, content: &str, key: Option<&str>) -> Result<EntryId> {
        let id = self.lock()?.insert_snippet(content, key)?;
        self.events.publish(CoreEvent::EntryAdded {
            id,
            kind: EntryKind::Text,
        });
        Ok(id)
    }

    /// # Errors
    ///
    /// Returns `Error::EntryNotFound` if no entry has this id.
    pub fn set_snippet(&self, id: EntryId, key: Option<&str>) -> Result<()> {
        if self.lock()?.set_snippet(id, key)? {
            Ok(())
        } else {
            Err(Error::EntryNotFound { id })
        }
    }

    /// # Errors
    ///
    /// Returns `Error::EntryNotFound` if no entry has this id.
    pub fn clear_snippet(&self, id: EntryId) -> Result<()> {
        if self.lock()?.clear_snippet(id)? {
            Ok(())
        } else {
            Err(Error::EntryNotFound { id })
        }
    }

    // ==================
    // Removal
    // ==================

    /// Delete one entry and, if it was the last reference, its image file.
    ///
    /// # Errors
    ///
    /// Returns `Error::EntryNotFound` if no entry has this id.
    pub fn delete(&self, id: EntryId) -> Result<DeletedEntry> {
        let deleted = self.lock()?.delete(id)?.ok_or(Error::EntryNotFound { id })?;
        if let Some(path) = deleted.orphaned_image() {
            if let Err(e) = self.images.delete(path) {
                warn!(path, error = %e, "Failed to delete image");
            }
        }
        Ok(deleted)
    }

    /// Remove every entry that is neither pinned nor a snippet.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn clear(&self) -> Result<PruneOutcome> {
        let outcome = self.lock()?.clear_history()?;
        self.images.delete_all(&outcome.orphaned_images);
        self.events.publish(CoreEvent::HistoryCleared {
            removed: outcome.removed,
        });
        Ok(outcome)
    }

    /// Remove unprotected entries older than `days`. `0` keeps everything.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn apply_retention(&self, days: u32) -> Result<PruneOutcome> {
        let outcome = self.lock()?.apply_retention(days)?;
        self.images.delete_all(&outcome.orphaned_images);
        Ok(outcome)
    }

    /// Delete image files that no entry references.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or the images directory cannot be read.
    pub fn collect_orphaned_images(&self) -> Result<Vec<String>> {
        let referenced = self.lock()?.image_paths()?;
        let removed = self.images.collect_orphans(&referenced)?;
        if !removed.is_empty() {
            info!(count = removed.len(), "Removed orphaned images");
        }
        Ok(removed)
    }
}

fn poisoned() -> Error {
    Error::Other("history store lock poisoned".to_string())
}
