//! Data models for clipstash.
//!
//! - [`ClipboardEntry`] - one captured clipboard item
//! - [`EntryKind`] - text or image payload
//! - [`EntryRecord`] - id-less row used by import/export formats

pub mod entry;

pub use entry::{
    ClipboardEntry, EntryId, EntryKind, EntryRecord, TIMESTAMP_FORMAT, format_timestamp,
    now_timestamp, page_count, parse_timestamp,
};
