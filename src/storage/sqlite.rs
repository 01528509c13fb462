//! SQLite storage implementation.
//!
//! This module provides the clipboard history store for clipstash using SQLite.
//! It follows the MutationContext pattern for transaction discipline: every
//! write runs inside one IMMEDIATE transaction, and mutations that remove
//! image rows report which blob files are no longer referenced.

use crate::error::{Error, Result};
use crate::model::{
    ClipboardEntry, EntryId, EntryKind, EntryRecord, format_timestamp, now_timestamp,
    parse_timestamp,
};
use crate::storage::schema::apply_schema;
use chrono::NaiveDateTime;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Transaction};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Identical `(content, kind)` captured within this many milliseconds of an
/// existing row is collapsed into that row.
pub const DEDUP_WINDOW_MS: i64 = 2_000;

const ENTRY_COLUMNS: &str = "id, content, type, timestamp, pinned, is_snippet, snippet_key";

/// Rows that retention and bulk clear may remove.
const UNPROTECTED: &str = "COALESCE(pinned, 0) = 0 AND COALESCE(is_snippet, 0) = 0";

/// SQLite-based clipboard history store.
#[derive(Debug)]
pub struct SqliteStorage {
    conn: Connection,
    path: Option<PathBuf>,
}

/// Context for a mutation operation, tracking side effects.
///
/// Mutations that delete image rows record the removed paths here. Before
/// commit, [`MutationContext::orphaned_images`] filters out paths that a
/// surviving row still references, so callers only unlink files that are
/// truly unused.
pub struct MutationContext {
    /// Name of the operation being performed.
    pub op_name: String,
    /// Rows inserted, updated or deleted.
    pub rows_affected: usize,
    removed_images: BTreeSet<String>,
}

impl MutationContext {
    /// Create a new mutation context.
    #[must_use]
    pub fn new(op_name: &str) -> Self {
        Self {
            op_name: op_name.to_string(),
            rows_affected: 0,
            removed_images: BTreeSet::new(),
        }
    }

    /// Count rows touched by this operation.
    pub fn record_rows(&mut self, rows: usize) {
        self.rows_affected += rows;
    }

    /// Remember an image path whose row this operation removed.
    pub fn record_removed_image(&mut self, path: &str) {
        self.removed_images.insert(path.to_string());
    }

    /// Removed image paths that no remaining row references.
    ///
    /// # Errors
    ///
    /// Returns an error if the lookup query fails.
    pub fn orphaned_images(&self, tx: &Transaction) -> Result<Vec<String>> {
        let mut stmt =
            tx.prepare("SELECT 1 FROM clipboard WHERE type = 'image' AND content = ?1 LIMIT 1")?;
        let mut orphans = Vec::new();
        for path in &self.removed_images {
            if !stmt.exists([path])? {
                orphans.push(path.clone());
            }
        }
        Ok(orphans)
    }
}

/// What [`SqliteStorage::delete`] removed.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DeletedEntry {
    pub id: EntryId,
    pub content: String,
    pub kind: EntryKind,
    /// Another row still points at the same image file.
    pub still_referenced: bool,
}

impl DeletedEntry {
    /// Image path that can be unlinked, if any.
    #[must_use]
    pub fn orphaned_image(&self) -> Option<&str> {
        (self.kind == EntryKind::Image && !self.still_referenced).then_some(self.content.as_str())
    }
}

/// Result of a bulk removal (clear or retention).
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct PruneOutcome {
    /// Number of rows deleted.
    pub removed: usize,
    /// Image paths whose last referencing row was deleted.
    pub orphaned_images: Vec<String>,
}

/// Counts of rows by flag, for status output.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct EntryCounts {
    pub text: usize,
    pub images: usize,
    pub pinned: usize,
    pub snippets: usize,
}

impl EntryCounts {
    /// Returns total number of rows.
    #[must_use]
    pub fn total(&self) -> usize {
        self.text + self.images
    }
}

impl SqliteStorage {
    /// Open a database at the given path.
    ///
    /// Creates the database and applies schema if it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open(path: &Path) -> Result<Self> {
        Self::open_with_timeout(path, None)
    }

    /// Open a database with an optional busy timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established or schema fails.
    pub fn open_with_timeout(path: &Path, timeout_ms: Option<u64>) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;

        if let Some(timeout) = timeout_ms {
            conn.busy_timeout(Duration::from_millis(timeout))?;
        } else {
            // Default 5 second timeout
            conn.busy_timeout(Duration::from_secs(5))?;
        }

        apply_schema(&conn)?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(Self { conn, path: None })
    }

    /// Get a reference to the underlying connection (for read operations).
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Database file path, `None` for in-memory stores.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Execute a mutation with the transaction protocol.
    ///
    /// This method:
    /// 1. Begins an IMMEDIATE transaction (for write locking)
    /// 2. Executes the mutation closure
    /// 3. Commits (or rolls back on error)
    ///
    /// # Errors
    ///
    /// Returns an error if any step fails. The transaction is rolled back on error.
    pub fn mutate<F, R>(&mut self, op: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .conn
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let mut ctx = MutationContext::new(op);

        let result = f(&tx, &mut ctx)?;

        tx.commit()?;

        debug!(op = %ctx.op_name, rows = ctx.rows_affected, "Mutation committed");
        Ok(result)
    }

    // ==================
    // Insert Operations
    // ==================

    /// Insert a captured item stamped with the current time.
    ///
    /// Returns `None` when the item duplicates a row captured within
    /// [`DEDUP_WINDOW_MS`].
    ///
    /// # Errors
    ///
    /// Returns an error if `content` is empty or the insert fails.
    pub fn insert(&mut self, content: &str, kind: EntryKind) -> Result<Option<EntryId>> {
        self.insert_at(content, kind, now_timestamp())
    }

    /// Insert a captured item with an explicit capture time.
    ///
    /// # Errors
    ///
    /// Returns an error if `content` is empty or the insert fails.
    pub fn insert_at(
        &mut self,
        content: &str,
        kind: EntryKind,
        timestamp: NaiveDateTime,
    ) -> Result<Option<EntryId>> {
        if content.is_empty() {
            return Err(Error::InvalidArgument(
                "entry content must not be empty".to_string(),
            ));
        }

        let window = chrono::Duration::milliseconds(DEDUP_WINDOW_MS);
        let lower = format_timestamp(&(timestamp - window));
        let upper = format_timestamp(&(timestamp + window));
        let ts = format_timestamp(&timestamp);

        self.mutate("insert", |tx, ctx| {
            let duplicate: Option<EntryId> = tx
                .query_row(
                    "SELECT id FROM clipboard
                     WHERE content = ?1 AND type = ?2 AND timestamp > ?3 AND timestamp < ?4
                     LIMIT 1",
                    rusqlite::params![content, kind.as_str(), lower, upper],
                    |row| row.get(0),
                )
                .optional()?;

            if let Some(existing) = duplicate {
                debug!(existing, kind = %kind, "Duplicate inside dedup window, skipped");
                return Ok(None);
            }

            tx.execute(
                "INSERT INTO clipboard (content, type, timestamp, pinned, is_snippet)
                 VALUES (?1, ?2, ?3, 0, 0)",
                rusqlite::params![content, kind.as_str(), ts],
            )?;
            ctx.record_rows(1);

            Ok(Some(tx.last_insert_rowid()))
        })
    }

    /// Insert a text snippet. Snippets bypass de-duplication.
    ///
    /// # Errors
    ///
    /// Returns an error if `content` is empty or the insert fails.
    pub fn insert_snippet(&mut self, content: &str, key: Option<&str>) -> Result<EntryId> {
        if content.is_empty() {
            return Err(Error::InvalidArgument(
                "snippet content must not be empty".to_string(),
            ));
        }
        let key = normalize_key(key);
        let ts = format_timestamp(&now_timestamp());

        self.mutate("insert_snippet", |tx, ctx| {
            tx.execute(
                "INSERT INTO clipboard (content, type, timestamp, pinned, is_snippet, snippet_key)
                 VALUES (?1, 'text', ?2, 0, 1, ?3)",
                rusqlite::params![content, ts, key],
            )?;
            ctx.record_rows(1);
            Ok(tx.last_insert_rowid())
        })
    }

    /// Merge imported rows, skipping any whose timestamp is already stored.
    ///
    /// Returns the number of rows inserted.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails. Nothing is inserted in that case.
    pub fn merge_entries(&mut self, records: &[EntryRecord]) -> Result<usize> {
        self.mutate("merge_entries", |tx, ctx| {
            let mut exists = tx.prepare("SELECT 1 FROM clipboard WHERE timestamp = ?1 LIMIT 1")?;
            let mut insert = tx.prepare(
                "INSERT INTO clipboard (content, type, timestamp, pinned, is_snippet)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;

            let mut inserted = 0;
            for record in records {
                if record.content.is_empty() {
                    continue;
                }
                let ts = format_timestamp(&record.timestamp);
                if exists.exists([&ts])? {
                    continue;
                }
                insert.execute(rusqlite::params![
                    record.content,
                    record.kind.as_str(),
                    ts,
                    record.pinned,
                    record.is_snippet
                ])?;
                inserted += 1;
            }

            ctx.record_rows(inserted);
            Ok(inserted)
        })
    }

    // ==================
    // Read Operations
    // ==================

    /// Page through history, newest first.
    ///
    /// `search` is a case-insensitive substring match; `%` and `_` match
    /// literally. Pages are 1-indexed and page 0 is treated as page 1.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list(
        &self,
        search: Option<&str>,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<ClipboardEntry>> {
        let offset = (page.max(1) - 1).saturating_mul(page_size);
        let sql = format!(
            r"SELECT {ENTRY_COLUMNS} FROM clipboard
              WHERE content LIKE ?1 ESCAPE '\'
              ORDER BY timestamp DESC, id DESC
              LIMIT ?2 OFFSET ?3"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            rusqlite::params![like_pattern(search), to_i64(page_size), to_i64(offset)],
            map_entry_row,
        )?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    /// Number of rows matching `search` (all rows when `None`).
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count(&self, search: Option<&str>) -> Result<usize> {
        let count: i64 = self.conn.query_row(
            r"SELECT COUNT(*) FROM clipboard WHERE content LIKE ?1 ESCAPE '\'",
            [like_pattern(search)],
            |row| row.get(0),
        )?;
        Ok(usize::try_from(count).unwrap_or(0))
    }

    /// Get an entry by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get(&self, id: EntryId) -> Result<Option<ClipboardEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM clipboard WHERE id = ?1");
        let entry = self
            .conn
            .query_row(&sql, [id], map_entry_row)
            .optional()?;
        Ok(entry)
    }

    /// Most recent entry, optionally of one kind.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn latest(&self, kind: Option<EntryKind>) -> Result<Option<ClipboardEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM clipboard
             WHERE ?1 IS NULL OR type = ?1
             ORDER BY timestamp DESC, id DESC LIMIT 1"
        );
        let entry = self
            .conn
            .query_row(&sql, [kind.map(|k| k.as_str())], map_entry_row)
            .optional()?;
        Ok(entry)
    }

    /// Every entry in capture order (oldest first), for tabular exports.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn all_entries(&self) -> Result<Vec<ClipboardEntry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM clipboard ORDER BY timestamp ASC, id ASC");
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], map_entry_row)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Error::from)
    }

    /// Every distinct image path referenced by a row.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn image_paths(&self) -> Result<BTreeSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT content FROM clipboard WHERE type = 'image'")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<std::result::Result<BTreeSet<_>, _>>()
            .map_err(Error::from)
    }

    /// Row counts by kind and flag.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn counts(&self) -> Result<EntryCounts> {
        let (text, images, pinned, snippets): (i64, i64, i64, i64) = self.conn.query_row(
            "SELECT
                COALESCE(SUM(CASE WHEN type = 'text' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN type = 'image' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN pinned = 1 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN is_snippet = 1 THEN 1 ELSE 0 END), 0)
             FROM clipboard",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;

        Ok(EntryCounts {
            text: usize::try_from(text).unwrap_or(0),
            images: usize::try_from(images).unwrap_or(0),
            pinned: usize::try_from(pinned).unwrap_or(0),
            snippets: usize::try_from(snippets).unwrap_or(0),
        })
    }

    // ==================
    // Flag Operations
    // ==================

    /// Flip the pinned flag. Returns the new state, or `None` if the ID is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn toggle_pin(&mut self, id: EntryId) -> Result<Option<bool>> {
        self.mutate("toggle_pin", |tx, ctx| {
            let changed = tx.execute(
                "UPDATE clipboard SET pinned = CASE WHEN pinned = 1 THEN 0 ELSE 1 END WHERE id = ?1",
                [id],
            )?;
            if changed == 0 {
                return Ok(None);
            }
            ctx.record_rows(changed);

            let pinned: Option<i64> =
                tx.query_row("SELECT pinned FROM clipboard WHERE id = ?1", [id], |row| {
                    row.get(0)
                })?;
            Ok(Some(pinned.unwrap_or(0) != 0))
        })
    }

    /// Mark an entry as a snippet, optionally setting its key.
    ///
    /// An existing key is kept when `key` is `None`. Returns `false` if the
    /// ID is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn set_snippet(&mut self, id: EntryId, key: Option<&str>) -> Result<bool> {
        let key = normalize_key(key);
        self.mutate("set_snippet", |tx, ctx| {
            let changed = tx.execute(
                "UPDATE clipboard SET is_snippet = 1, snippet_key = COALESCE(?2, snippet_key)
                 WHERE id = ?1",
                rusqlite::params![id, key],
            )?;
            ctx.record_rows(changed);
            Ok(changed > 0)
        })
    }

    /// Return a snippet to plain history. Returns `false` if the ID is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn clear_snippet(&mut self, id: EntryId) -> Result<bool> {
        self.mutate("clear_snippet", |tx, ctx| {
            let changed = tx.execute(
                "UPDATE clipboard SET is_snippet = 0, snippet_key = NULL WHERE id = ?1",
                [id],
            )?;
            ctx.record_rows(changed);
            Ok(changed > 0)
        })
    }

    // ==================
    // Delete Operations
    // ==================

    /// Delete one entry. Returns `None` if the ID is unknown.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete(&mut self, id: EntryId) -> Result<Option<DeletedEntry>> {
        self.mutate("delete", |tx, ctx| {
            let row: Option<(String, String)> = tx
                .query_row(
                    "SELECT content, type FROM clipboard WHERE id = ?1",
                    [id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((content, kind)) = row else {
                return Ok(None);
            };
            let kind = kind.parse::<EntryKind>().map_err(Error::Other)?;

            tx.execute("DELETE FROM clipboard WHERE id = ?1", [id])?;
            ctx.record_rows(1);

            let still_referenced = if kind == EntryKind::Image {
                ctx.record_removed_image(&content);
                ctx.orphaned_images(tx)?.is_empty()
            } else {
                false
            };

            Ok(Some(DeletedEntry {
                id,
                content,
                kind,
                still_referenced,
            }))
        })
    }

    /// Delete every entry that is neither pinned nor a snippet.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn clear_history(&mut self) -> Result<PruneOutcome> {
        let outcome = self.mutate("clear_history", |tx, ctx| {
            delete_unprotected(tx, ctx, None)
        })?;
        info!(removed = outcome.removed, "History cleared");
        Ok(outcome)
    }

    /// Delete unprotected entries older than `days` days. `0` keeps everything.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn apply_retention(&mut self, days: u32) -> Result<PruneOutcome> {
        self.apply_retention_at(days, now_timestamp())
    }

    /// [`Self::apply_retention`] against an explicit "now".
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn apply_retention_at(&mut self, days: u32, now: NaiveDateTime) -> Result<PruneOutcome> {
        if days == 0 {
            return Ok(PruneOutcome::default());
        }

        let cutoff = format_timestamp(&(now - chrono::Duration::days(i64::from(days))));
        let outcome = self.mutate("apply_retention", |tx, ctx| {
            delete_unprotected(tx, ctx, Some(&cutoff))
        })?;

        if outcome.removed > 0 {
            info!(days, removed = outcome.removed, "Retention applied");
        }
        Ok(outcome)
    }

    // ==================
    // File Operations
    // ==================

    /// Fold the WAL into the main database file.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint fails.
    pub fn checkpoint(&self) -> Result<()> {
        self.conn
            .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        Ok(())
    }

    /// Write a consistent, self-contained copy of the database to `dest`.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint or the online backup fails.
    pub fn backup_to(&self, dest: &Path) -> Result<()> {
        self.checkpoint()?;
        self.conn.backup(rusqlite::DatabaseName::Main, dest, None)?;
        Ok(())
    }

    /// Close the connection, releasing the database file.
    ///
    /// # Errors
    ///
    /// Returns an error if SQLite refuses to close the handle.
    pub fn close(self) -> Result<()> {
        self.conn.close().map_err(|(_, e)| Error::Database(e))
    }
}

fn delete_unprotected(
    tx: &Transaction,
    ctx: &mut MutationContext,
    older_than: Option<&str>,
) -> Result<PruneOutcome> {
    // NULL cutoff means no age limit.
    let images_sql = format!(
        "SELECT DISTINCT content FROM clipboard
         WHERE type = 'image' AND {UNPROTECTED} AND (?1 IS NULL OR timestamp < ?1)"
    );
    let mut stmt = tx.prepare(&images_sql)?;
    let images = stmt
        .query_map([older_than], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    for path in &images {
        ctx.record_removed_image(path);
    }

    let delete_sql =
        format!("DELETE FROM clipboard WHERE {UNPROTECTED} AND (?1 IS NULL OR timestamp < ?1)");
    let removed = tx.execute(&delete_sql, [older_than])?;
    ctx.record_rows(removed);

    Ok(PruneOutcome {
        removed,
        orphaned_images: ctx.orphaned_images(tx)?,
    })
}

/// Build a LIKE pattern matching `search` as a literal substring.
fn like_pattern(search: Option<&str>) -> String {
    match search.map(str::trim).filter(|s| !s.is_empty()) {
        Some(term) => {
            let mut escaped = String::with_capacity(term.len() + 2);
            escaped.push('%');
            for c in term.chars() {
                if matches!(c, '\\' | '%' | '_') {
                    escaped.push('\\');
                }
                escaped.push(c);
            }
            escaped.push('%');
            escaped
        }
        None => "%".to_string(),
    }
}

fn normalize_key(key: Option<&str>) -> Option<String> {
    key.map(str::trim)
        .filter(|k| !k.is_empty())
        .map(ToString::to_string)
}

fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn map_entry_row(row: &rusqlite::Row) -> rusqlite::Result<ClipboardEntry> {
    let kind_raw: String = row.get(2)?;
    let kind = kind_raw
        .parse::<EntryKind>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, e.into()))?;

    let ts_raw: String = row.get(3)?;
    let timestamp = parse_timestamp(&ts_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            Type::Text,
            format!("invalid timestamp: {ts_raw}").into(),
        )
    })?;

    Ok(ClipboardEntry {
        id: row.get(0)?,
        content: row.get(1)?,
        kind,
        timestamp,
        pinned: row.get::<_, Option<i64>>(4)?.unwrap_or(0) != 0,
        is_snippet: row.get::<_, Option<i64>>(5)?.unwrap_or(0) != 0,
        snippet_key: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn base() -> NaiveDateTime {
        parse_timestamp("2024-03-01 12:00:00.000000").unwrap()
    }

    fn secs(s: i64) -> chrono::Duration {
        chrono::Duration::milliseconds(s * 1000)
    }

    #[test]
    fn test_open_memory() {
        let storage = SqliteStorage::open_memory();
        assert!(storage.is_ok());
    }

    #[test]
    fn test_dedup_window_collapses_repeats() {
        let mut storage = SqliteStorage::open_memory().unwrap();

        let first = storage.insert_at("hello", EntryKind::Text, base()).unwrap();
        assert!(first.is_some());

        let repeat = storage
            .insert_at("hello", EntryKind::Text, base() + chrono::Duration::milliseconds(500))
            .unwrap();
        assert_eq!(repeat, None);
        assert_eq!(storage.count(None).unwrap(), 1);

        let later = storage
            .insert_at("hello", EntryKind::Text, base() + secs(3))
            .unwrap();
        assert!(later.is_some());
        assert_eq!(storage.count(None).unwrap(), 2);
    }

    #[test]
    fn test_dedup_is_per_kind() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        storage.insert_at("images/a.png", EntryKind::Text, base()).unwrap();
        let image = storage
            .insert_at("images/a.png", EntryKind::Image, base())
            .unwrap();
        assert!(image.is_some());
    }

    #[test]
    fn test_insert_rejects_empty_content() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        assert!(storage.insert("", EntryKind::Text).is_err());
        assert!(storage.insert_snippet("", None).is_err());
    }

    #[test]
    fn test_pagination_newest_first() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        for i in 0..25 {
            storage
                .insert_at(&format!("item {i}"), EntryKind::Text, base() + secs(i * 10))
                .unwrap();
        }

        let total = storage.count(None).unwrap();
        assert_eq!(total, 25);
        assert_eq!(crate::model::page_count(total, 10), 3);

        let first = storage.list(None, 1, 10).unwrap();
        assert_eq!(first.len(), 10);
        assert_eq!(first[0].content, "item 24");

        let last = storage.list(None, 3, 10).unwrap();
        assert_eq!(last.len(), 5);
        assert_eq!(last[4].content, "item 0");

        // Page 0 behaves like page 1.
        assert_eq!(storage.list(None, 0, 10).unwrap(), first);

        // Pages never overlap and together cover every row.
        let mut seen: Vec<EntryId> = Vec::new();
        for page in 1..=3 {
            seen.extend(storage.list(None, page, 10).unwrap().iter().map(|e| e.id));
        }
        seen.sort_unstable();
        seen.dedup();
        assert_eq!(seen.len(), 25);
    }

    #[test]
    fn test_pages_concatenate_in_descending_timestamp_order() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        // Inserted out of order so the ordering cannot come from rowids.
        for i in [7_i64, 2, 11, 0, 5, 9, 1, 12, 3, 10, 6, 4, 8] {
            storage
                .insert_at(&format!("item {i}"), EntryKind::Text, base() + secs(i * 3))
                .unwrap();
        }

        let total = storage.count(None).unwrap();
        let pages = crate::model::page_count(total, 4);
        let joined: Vec<ClipboardEntry> = (1..=pages)
            .flat_map(|page| storage.list(None, page, 4).unwrap())
            .collect();

        assert_eq!(joined.len(), total);
        assert!(joined.windows(2).all(|w| w[0].timestamp > w[1].timestamp));
        assert_eq!(joined.first().unwrap().content, "item 12");
        assert_eq!(joined.last().unwrap().content, "item 0");
    }

    #[test]
    fn test_search_is_case_insensitive_substring() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        storage.insert_at("Hello World", EntryKind::Text, base()).unwrap();
        storage.insert_at("goodbye", EntryKind::Text, base() + secs(5)).unwrap();

        let hits = storage.list(Some("hello"), 1, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content, "Hello World");
        assert_eq!(storage.count(Some("WORLD")).unwrap(), 1);
        assert_eq!(storage.count(Some("   ")).unwrap(), 2);
    }

    #[test]
    fn test_search_wildcards_match_literally() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        storage.insert_at("100% done", EntryKind::Text, base()).unwrap();
        storage.insert_at("100 done", EntryKind::Text, base() + secs(5)).unwrap();
        storage.insert_at("snake_case", EntryKind::Text, base() + secs(10)).unwrap();
        storage.insert_at("snakeXcase", EntryKind::Text, base() + secs(15)).unwrap();

        assert_eq!(storage.count(Some("100%")).unwrap(), 1);
        assert_eq!(storage.count(Some("e_c")).unwrap(), 1);
    }

    #[test]
    fn test_toggle_pin() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let id = storage.insert_at("pin me", EntryKind::Text, base()).unwrap().unwrap();

        assert_eq!(storage.toggle_pin(id).unwrap(), Some(true));
        assert!(storage.get(id).unwrap().unwrap().pinned);
        assert_eq!(storage.toggle_pin(id).unwrap(), Some(false));
        assert!(!storage.get(id).unwrap().unwrap().pinned);

        assert_eq!(storage.toggle_pin(9999).unwrap(), None);
    }

    #[test]
    fn test_snippet_flags_and_key() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let id = storage
            .insert_snippet("git log --oneline", Some("  gl "))
            .unwrap();
        let entry = storage.get(id).unwrap().unwrap();
        assert!(entry.is_snippet);
        assert_eq!(entry.snippet_key.as_deref(), Some("gl"));

        // Snippets bypass de-duplication.
        storage.insert_snippet("git log --oneline", None).unwrap();
        assert_eq!(storage.count(None).unwrap(), 2);

        assert!(storage.clear_snippet(id).unwrap());
        let entry = storage.get(id).unwrap().unwrap();
        assert!(!entry.is_snippet);
        assert_eq!(entry.snippet_key, None);

        assert!(storage.set_snippet(id, None).unwrap());
        assert!(storage.get(id).unwrap().unwrap().is_snippet);
        assert!(!storage.set_snippet(4242, Some("x")).unwrap());
    }

    #[test]
    fn test_retention_spares_pinned_and_snippets() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let now = base();
        let old = now - chrono::Duration::days(40);

        let a = storage.insert_at("old plain", EntryKind::Text, old).unwrap().unwrap();
        let b = storage
            .insert_at("old pinned", EntryKind::Text, old + secs(5))
            .unwrap()
            .unwrap();
        let c = storage
            .insert_at("old snippet", EntryKind::Text, old + secs(10))
            .unwrap()
            .unwrap();
        let d = storage
            .insert_at("fresh", EntryKind::Text, now - chrono::Duration::days(1))
            .unwrap()
            .unwrap();
        storage.toggle_pin(b).unwrap();
        storage.set_snippet(c, None).unwrap();

        let outcome = storage.apply_retention_at(30, now).unwrap();
        assert_eq!(outcome.removed, 1);

        assert!(storage.get(a).unwrap().is_none());
        assert!(storage.get(b).unwrap().is_some());
        assert!(storage.get(c).unwrap().is_some());
        assert!(storage.get(d).unwrap().is_some());
    }

    #[test]
    fn test_retention_twice_changes_nothing_more() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let now = base();
        for age in [45_i64, 31, 29, 2] {
            storage
                .insert_at(&format!("aged {age}"), EntryKind::Text, now - chrono::Duration::days(age))
                .unwrap();
        }
        let pinned = storage
            .insert_at("old pinned", EntryKind::Text, now - chrono::Duration::days(60))
            .unwrap()
            .unwrap();
        storage.toggle_pin(pinned).unwrap();

        let first = storage.apply_retention_at(30, now).unwrap();
        assert_eq!(first.removed, 2);
        let after_first = storage.all_entries().unwrap();

        let second = storage.apply_retention_at(30, now).unwrap();
        assert_eq!(second, PruneOutcome::default());
        assert_eq!(storage.all_entries().unwrap(), after_first);
    }

    #[test]
    fn test_retention_zero_days_is_noop() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        storage
            .insert_at("ancient", EntryKind::Text, base() - chrono::Duration::days(3650))
            .unwrap();
        let outcome = storage.apply_retention_at(0, base()).unwrap();
        assert_eq!(outcome, PruneOutcome::default());
        assert_eq!(storage.count(None).unwrap(), 1);
    }

    #[test]
    fn test_retention_reports_orphaned_images_only() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let old = base() - chrono::Duration::days(10);

        storage.insert_at("images/a.png", EntryKind::Image, old).unwrap();
        let shared_old = storage
            .insert_at("images/b.png", EntryKind::Image, old + secs(5))
            .unwrap()
            .unwrap();
        let shared_pinned = storage
            .insert_at("images/b.png", EntryKind::Image, old + secs(60))
            .unwrap()
            .unwrap();
        storage.toggle_pin(shared_pinned).unwrap();

        let outcome = storage.apply_retention_at(7, base()).unwrap();
        assert_eq!(outcome.removed, 2);
        assert_eq!(outcome.orphaned_images, vec!["images/a.png".to_string()]);
        assert!(storage.get(shared_old).unwrap().is_none());
    }

    #[test]
    fn test_clear_history_keeps_protected() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        storage.insert_at("one", EntryKind::Text, base()).unwrap();
        storage.insert_at("images/x.png", EntryKind::Image, base() + secs(5)).unwrap();
        let pinned = storage
            .insert_at("two", EntryKind::Text, base() + secs(10))
            .unwrap()
            .unwrap();
        storage.toggle_pin(pinned).unwrap();
        storage.insert_snippet("three", None).unwrap();

        let outcome = storage.clear_history().unwrap();
        assert_eq!(outcome.removed, 2);
        assert_eq!(outcome.orphaned_images, vec!["images/x.png".to_string()]);
        assert_eq!(storage.count(None).unwrap(), 2);
    }

    #[test]
    fn test_delete_reports_shared_image() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let first = storage
            .insert_at("images/shared.png", EntryKind::Image, base())
            .unwrap()
            .unwrap();
        let second = storage
            .insert_at("images/shared.png", EntryKind::Image, base() + secs(30))
            .unwrap()
            .unwrap();

        let deleted = storage.delete(first).unwrap().unwrap();
        assert!(deleted.still_referenced);
        assert_eq!(deleted.orphaned_image(), None);

        let deleted = storage.delete(second).unwrap().unwrap();
        assert!(!deleted.still_referenced);
        assert_eq!(deleted.orphaned_image(), Some("images/shared.png"));

        assert_eq!(storage.delete(second).unwrap(), None);
    }

    #[test]
    fn test_latest_by_kind() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        storage.insert_at("images/1.png", EntryKind::Image, base()).unwrap();
        storage.insert_at("newest text", EntryKind::Text, base() + secs(5)).unwrap();

        assert_eq!(storage.latest(None).unwrap().unwrap().content, "newest text");
        assert_eq!(
            storage.latest(Some(EntryKind::Image)).unwrap().unwrap().content,
            "images/1.png"
        );
    }

    #[test]
    fn test_merge_entries_skips_known_timestamps() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        storage.insert_at("existing", EntryKind::Text, base()).unwrap();

        let records = vec![
            EntryRecord {
                content: "same moment".into(),
                kind: EntryKind::Text,
                timestamp: base(),
                pinned: false,
                is_snippet: false,
            },
            EntryRecord {
                content: "new".into(),
                kind: EntryKind::Text,
                timestamp: base() + secs(1),
                pinned: true,
                is_snippet: false,
            },
            EntryRecord {
                content: String::new(),
                kind: EntryKind::Text,
                timestamp: base() + secs(2),
                pinned: false,
                is_snippet: false,
            },
        ];

        assert_eq!(storage.merge_entries(&records).unwrap(), 1);
        assert_eq!(storage.merge_entries(&records).unwrap(), 0);
        assert!(storage.latest(None).unwrap().unwrap().pinned);
    }

    #[test]
    fn test_counts() {
        let mut storage = SqliteStorage::open_memory().unwrap();
        storage.insert_at("t", EntryKind::Text, base()).unwrap();
        let img = storage
            .insert_at("images/c.png", EntryKind::Image, base() + secs(5))
            .unwrap()
            .unwrap();
        storage.toggle_pin(img).unwrap();
        storage.insert_snippet("s", None).unwrap();

        let counts = storage.counts().unwrap();
        assert_eq!(counts.total(), 3);
        assert_eq!(counts.images, 1);
        assert_eq!(counts.pinned, 1);
        assert_eq!(counts.snippets, 1);
    }

    #[test]
    fn test_file_backed_reopen_and_backup() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("clipboard_history.db");

        let mut storage = SqliteStorage::open(&db_path).unwrap();
        storage.insert_at("persisted", EntryKind::Text, base()).unwrap();

        let copy = dir.path().join("copy.db");
        storage.backup_to(&copy).unwrap();
        storage.close().unwrap();

        let reopened = SqliteStorage::open(&db_path).unwrap();
        assert_eq!(reopened.count(None).unwrap(), 1);

        let from_copy = SqliteStorage::open(&copy).unwrap();
        assert_eq!(from_copy.list(None, 1, 10).unwrap()[0].content, "persisted");
    }

    #[test]
    fn test_open_missing_file_creates_empty_db() {
        let dir = TempDir::new().unwrap();
        let storage = SqliteStorage::open(&dir.path().join("nested/new.db")).unwrap();
        assert_eq!(storage.count(None).unwrap(), 0);
    }
}
