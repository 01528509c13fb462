//! Tabular import and export formats.
//!
//! These move history rows (not images, not settings) in and out of other
//! tools. Every format carries the same five columns:
//! `content, type, timestamp, pinned, is_snippet`.
//!
//! Imports merge: a row is inserted only if no existing row has the same
//! timestamp, so importing the same file twice is harmless.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use tracing::{info, warn};

use crate::model::{EntryRecord, format_timestamp, parse_timestamp};
use crate::storage::SqliteStorage;
use crate::storage::schema::column_exists;
use crate::sync::file::atomic_write;
use crate::sync::types::{SyncError, SyncResult};

/// Formats history can be written to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Json,
    Csv,
    Markdown,
    Sqlite,
}

/// Formats history can be merged from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ImportFormat {
    Json,
    Csv,
    Sqlite,
}

/// What a tabular export wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormatExport {
    pub path: PathBuf,
    pub rows: usize,
}

/// Write every history row to `destination` in `format`.
///
/// The SQLite format copies the whole database and gets a `.db` extension
/// when the destination has none.
///
/// # Errors
///
/// Returns an error if reading the store or writing the file fails.
pub fn export_entries(
    storage: &SqliteStorage,
    format: ExportFormat,
    destination: &Path,
) -> SyncResult<FormatExport> {
    let entries = storage.all_entries()?;
    let records: Vec<EntryRecord> = entries.iter().map(EntryRecord::from).collect();

    let path = match format {
        ExportFormat::Json => {
            let json = serde_json::to_string_pretty(&records)?;
            atomic_write(destination, json.as_bytes())?;
            destination.to_path_buf()
        }
        ExportFormat::Csv => {
            atomic_write(destination, &to_csv(&records)?)?;
            destination.to_path_buf()
        }
        ExportFormat::Markdown => {
            atomic_write(destination, to_markdown(&records).as_bytes())?;
            destination.to_path_buf()
        }
        ExportFormat::Sqlite => {
            let path = if destination.extension().is_some() {
                destination.to_path_buf()
            } else {
                destination.with_extension("db")
            };
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            storage.backup_to(&path)?;
            path
        }
    };

    info!(path = %path.display(), ?format, rows = records.len(), "History exported");
    Ok(FormatExport {
        path,
        rows: records.len(),
    })
}

/// Merge rows from `source` into the store. Returns how many were inserted.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or the store
/// rejects the merge. Nothing is inserted on error.
pub fn import_entries(
    storage: &mut SqliteStorage,
    format: ImportFormat,
    source: &Path,
) -> SyncResult<usize> {
    let records = match format {
        ImportFormat::Json => {
            let reader = BufReader::new(File::open(source)?);
            serde_json::from_reader::<_, Vec<EntryRecord>>(reader)?
        }
        ImportFormat::Csv => csv::Reader::from_path(source)?
            .deserialize()
            .collect::<Result<Vec<EntryRecord>, _>>()?,
        ImportFormat::Sqlite => read_sqlite(source)?,
    };

    let inserted = storage.merge_entries(&records)?;
    info!(
        source = %source.display(),
        ?format,
        read = records.len(),
        inserted,
        "History imported"
    );
    Ok(inserted)
}

fn to_csv(records: &[EntryRecord]) -> SyncResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for record in records {
        writer.serialize(record)?;
    }
    writer
        .into_inner()
        .map_err(|e| SyncError::Io(e.into_error()))
}

fn to_markdown(records: &[EntryRecord]) -> String {
    let mut out = String::from("| Pinned | Snippet | Type | Timestamp | Content |\n");
    out.push_str("|---|---|---|---|---|\n");
    for record in records {
        out.push_str(&format!(
            "| {} | {} | {} | {} | {} |\n",
            yes_no(record.pinned),
            yes_no(record.is_snippet),
            record.kind,
            format_timestamp(&record.timestamp),
            markdown_cell(&record.content),
        ));
    }
    out
}

const fn yes_no(flag: bool) -> &'static str {
    if flag { "Yes" } else { "No" }
}

/// Keep a cell on one line and stop `|` from closing it.
fn markdown_cell(content: &str) -> String {
    content
        .replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
        .replace('|', "\\|")
}

/// Read rows from another clipstash database, including ones created before
/// the snippet column existed.
fn read_sqlite(source: &Path) -> SyncResult<Vec<EntryRecord>> {
    if !source.is_file() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} does not exist", source.display()),
        )
        .into());
    }
    let conn = Connection::open_with_flags(source, OpenFlags::SQLITE_OPEN_READ_ONLY)?;

    let snippet_column = if column_exists(&conn, "clipboard", "is_snippet")? {
        "COALESCE(is_snippet, 0)"
    } else {
        "0"
    };
    let sql = format!(
        "SELECT content, type, timestamp, COALESCE(pinned, 0), {snippet_column}
         FROM clipboard ORDER BY timestamp ASC"
    );

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map([], |row| {
        Ok((
            row.get::<_, Option<String>>(0)?,
            row.get::<_, Option<String>>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, i64>(3)?,
            row.get::<_, i64>(4)?,
        ))
    })?;

    let mut records = Vec::new();
    for row in rows {
        let (content, kind, timestamp, pinned, is_snippet) = row?;
        let parsed = (|| {
            let content = content.filter(|c| !c.is_empty())?;
            let kind = kind?.parse().ok()?;
            let timestamp = parse_timestamp(&timestamp?)?;
            Some(EntryRecord {
                content,
                kind,
                timestamp,
                pinned: pinned != 0,
                is_snippet: is_snippet != 0,
            })
        })();
        match parsed {
            Some(record) => records.push(record),
            None => warn!(source = %source.display(), "Skipping unreadable row"),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntryKind;
    use tempfile::TempDir;

    fn seeded() -> SqliteStorage {
        let mut storage = SqliteStorage::open_memory().unwrap();
        let base = parse_timestamp("2024-03-01 09:00:00").unwrap();
        storage
            .insert_at("plain text", EntryKind::Text, base)
            .unwrap();
        storage
            .insert_at(
                "a | b\nsecond line",
                EntryKind::Text,
                base + chrono::Duration::seconds(10),
            )
            .unwrap();
        let pinned = storage
            .insert_at(
                "images/img_1.png",
                EntryKind::Image,
                base + chrono::Duration::seconds(20),
            )
            .unwrap()
            .unwrap();
        storage.toggle_pin(pinned).unwrap();
        storage.insert_snippet("sig", Some("signature")).unwrap();
        storage
    }

    #[test]
    fn test_json_export_then_merge() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        let source = seeded();

        let export = export_entries(&source, ExportFormat::Json, &path).unwrap();
        assert_eq!(export.rows, 4);

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw[0]["type"], "text");
        assert_eq!(raw[2]["pinned"], 1);

        let mut target = SqliteStorage::open_memory().unwrap();
        assert_eq!(import_entries(&mut target, ImportFormat::Json, &path).unwrap(), 4);
        // Same timestamps are already present the second time.
        assert_eq!(import_entries(&mut target, ImportFormat::Json, &path).unwrap(), 0);
        assert_eq!(target.counts().unwrap().pinned, 1);
        assert_eq!(target.counts().unwrap().snippets, 1);
    }

    #[test]
    fn test_csv_merge_skips_existing_timestamps() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.csv");
        export_entries(&seeded(), ExportFormat::Csv, &path).unwrap();

        let header = std::fs::read_to_string(&path).unwrap();
        assert!(header.starts_with("content,type,timestamp,pinned,is_snippet"));

        let mut target = SqliteStorage::open_memory().unwrap();
        target
            .insert_at(
                "already here",
                EntryKind::Text,
                parse_timestamp("2024-03-01 09:00:00").unwrap(),
            )
            .unwrap();

        assert_eq!(import_entries(&mut target, ImportFormat::Csv, &path).unwrap(), 3);
        assert_eq!(target.count(None).unwrap(), 4);
        assert_eq!(target.count(Some("second line")).unwrap(), 1);
    }

    #[test]
    fn test_markdown_escapes_cells() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.md");
        export_entries(&seeded(), ExportFormat::Markdown, &path).unwrap();

        let md = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = md.lines().collect();
        assert_eq!(lines[0], "| Pinned | Snippet | Type | Timestamp | Content |");
        assert_eq!(lines.len(), 6);
        assert!(md.contains("a \\| b second line"));
        assert!(md.contains("| Yes | No | image |"));
    }

    #[test]
    fn test_sqlite_export_adds_extension_and_imports() {
        let dir = TempDir::new().unwrap();
        let export = export_entries(&seeded(), ExportFormat::Sqlite, &dir.path().join("copy")).unwrap();
        assert_eq!(export.path, dir.path().join("copy.db"));

        let mut target = SqliteStorage::open_memory().unwrap();
        assert_eq!(
            import_entries(&mut target, ImportFormat::Sqlite, &export.path).unwrap(),
            4
        );
    }

    #[test]
    fn test_sqlite_import_from_legacy_table() {
        let dir = TempDir::new().unwrap();
        let legacy = dir.path().join("legacy.db");
        {
            let conn = Connection::open(&legacy).unwrap();
            conn.execute_batch(
                "CREATE TABLE clipboard (id INTEGER PRIMARY KEY, content TEXT, type TEXT,
                                         timestamp DATETIME, pinned INTEGER DEFAULT 0);
                 INSERT INTO clipboard (content, type, timestamp, pinned)
                 VALUES ('old', 'text', '2023-01-01 00:00:00.000000', 1),
                        ('', 'text', '2023-01-01 00:00:01.000000', 0),
                        ('bad', 'video', '2023-01-01 00:00:02.000000', 0);",
            )
            .unwrap();
        }

        let mut target = SqliteStorage::open_memory().unwrap();
        assert_eq!(
            import_entries(&mut target, ImportFormat::Sqlite, &legacy).unwrap(),
            1
        );
        let entry = target.latest(None).unwrap().unwrap();
        assert!(entry.pinned);
        assert!(!entry.is_snippet);
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "[{\"content\": 1}]").unwrap();
        let mut target = SqliteStorage::open_memory().unwrap();
        assert!(matches!(
            import_entries(&mut target, ImportFormat::Json, &path),
            Err(SyncError::Json(_))
        ));
        assert_eq!(target.count(None).unwrap(), 0);
    }
}
