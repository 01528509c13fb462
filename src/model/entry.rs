//! Clipboard entry model.
//!
//! An entry is one captured clipboard item. Text entries carry the literal
//! text; image entries carry a data-root relative path to a PNG blob.

use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Storage format for entry timestamps.
///
/// Local wall-clock time with microseconds. Lexicographic order of the
/// formatted strings equals chronological order, which the store relies on
/// for `ORDER BY` and retention cutoffs.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// Database row identity.
pub type EntryId = i64;

/// Kind of clipboard payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Text,
    Image,
}

impl EntryKind {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            other => Err(format!("Unknown entry type: {other}")),
        }
    }
}

/// A persisted clipboard history entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClipboardEntry {
    pub id: EntryId,
    pub content: String,
    pub kind: EntryKind,
    #[serde(with = "timestamp_serde")]
    pub timestamp: NaiveDateTime,
    pub pinned: bool,
    pub is_snippet: bool,
    /// Short label for snippets; `None` for plain history.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet_key: Option<String>,
}

impl ClipboardEntry {
    /// Whether retention pruning and bulk clear must skip this entry.
    #[must_use]
    pub const fn is_protected(&self) -> bool {
        self.pinned || self.is_snippet
    }

    /// Single-line preview for list output.
    #[must_use]
    pub fn preview(&self, max_chars: usize) -> String {
        let flat: String = self
            .content
            .chars()
            .map(|c| if c == '\n' || c == '\r' || c == '\t' { ' ' } else { c })
            .collect();
        if flat.chars().count() > max_chars {
            let cut: String = flat.chars().take(max_chars).collect();
            format!("{cut}...")
        } else {
            flat
        }
    }
}

/// Portable row shape shared by the tabular import and export formats.
///
/// Carries no id: imported rows get fresh ids, and rows are matched by
/// timestamp instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRecord {
    pub content: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(with = "timestamp_serde")]
    pub timestamp: NaiveDateTime,
    #[serde(default, with = "flag_serde")]
    pub pinned: bool,
    #[serde(default, with = "flag_serde")]
    pub is_snippet: bool,
}

impl From<&ClipboardEntry> for EntryRecord {
    fn from(entry: &ClipboardEntry) -> Self {
        Self {
            content: entry.content.clone(),
            kind: entry.kind,
            timestamp: entry.timestamp,
            pinned: entry.pinned,
            is_snippet: entry.is_snippet,
        }
    }
}

/// Current local time truncated to the stored precision.
#[must_use]
pub fn now_timestamp() -> NaiveDateTime {
    let now = Local::now().naive_local();
    // Round-trip through the storage format so in-memory values compare
    // equal to what is read back from the database.
    parse_timestamp(&format_timestamp(&now)).unwrap_or(now)
}

/// Format a timestamp for storage.
#[must_use]
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored or imported timestamp.
///
/// Accepts the storage format, the same without fractional seconds, and
/// ISO-8601 with a `T` separator (as written by other exporters).
#[must_use]
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f"))
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Local).naive_local())
        })
}

/// Number of pages needed to show `total` rows, never less than one.
#[must_use]
pub fn page_count(total: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 1;
    }
    total.div_ceil(page_size).max(1)
}

mod timestamp_serde {
    use chrono::NaiveDateTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveDateTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_timestamp(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {raw}")))
    }
}

/// Flags are written as `0`/`1` and read from integers, booleans or
/// their string forms, matching what SQLite-derived exports contain.
mod flag_serde {
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};
    use std::fmt;

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(flag: &bool, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u8(u8::from(*flag))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<bool, D::Error> {
        d.deserialize_any(FlagVisitor)
    }

    struct FlagVisitor;

    impl Visitor<'_> for FlagVisitor {
        type Value = bool;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a boolean, 0/1, or \"true\"/\"false\"")
        }

        fn visit_bool<E: de::Error>(self, v: bool) -> Result<bool, E> {
            Ok(v)
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<bool, E> {
            Ok(v != 0)
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<bool, E> {
            Ok(v != 0)
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<bool, E> {
            match v.trim().to_ascii_lowercase().as_str() {
                "" | "0" | "false" | "no" => Ok(false),
                "1" | "true" | "yes" => Ok(true),
                other => Err(E::custom(format!("invalid flag: {other}"))),
            }
        }

        fn visit_unit<E: de::Error>(self) -> Result<bool, E> {
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trip_strings() {
        assert_eq!("text".parse::<EntryKind>().unwrap(), EntryKind::Text);
        assert_eq!("IMAGE".parse::<EntryKind>().unwrap(), EntryKind::Image);
        assert!("video".parse::<EntryKind>().is_err());
        assert_eq!(EntryKind::Image.to_string(), "image");
    }

    #[test]
    fn test_timestamp_format_sorts_chronologically() {
        let a = parse_timestamp("2024-01-02 03:04:05.000001").unwrap();
        let b = parse_timestamp("2024-01-02 03:04:05.100000").unwrap();
        assert!(format_timestamp(&a) < format_timestamp(&b));
    }

    #[test]
    fn test_parse_timestamp_accepts_legacy_forms() {
        assert!(parse_timestamp("2024-05-06 07:08:09").is_some());
        assert!(parse_timestamp("2024-05-06T07:08:09.123").is_some());
        assert!(parse_timestamp("2024-05-06T07:08:09+00:00").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_page_count_minimum_one() {
        assert_eq!(page_count(0, 10), 1);
        assert_eq!(page_count(10, 10), 1);
        assert_eq!(page_count(11, 10), 2);
        assert_eq!(page_count(5, 0), 1);
    }

    #[test]
    fn test_record_reads_integer_and_boolean_flags() {
        let json = r#"[
            {"content": "a", "type": "text", "timestamp": "2024-01-01 10:00:00.000000", "pinned": 1, "is_snippet": 0},
            {"content": "b", "type": "image", "timestamp": "2024-01-01T10:00:01", "pinned": false, "is_snippet": true},
            {"content": "c", "type": "text", "timestamp": "2024-01-01 10:00:02"}
        ]"#;
        let records: Vec<EntryRecord> = serde_json::from_str(json).unwrap();
        assert!(records[0].pinned && !records[0].is_snippet);
        assert_eq!(records[1].kind, EntryKind::Image);
        assert!(!records[1].pinned && records[1].is_snippet);
        assert!(!records[2].pinned);

        let out = serde_json::to_value(&records[0]).unwrap();
        assert_eq!(out["pinned"], 1);
        assert_eq!(out["type"], "text");
    }

    #[test]
    fn test_preview_flattens_and_truncates() {
        let entry = ClipboardEntry {
            id: 1,
            content: "line one\nline two".into(),
            kind: EntryKind::Text,
            timestamp: now_timestamp(),
            pinned: false,
            is_snippet: false,
            snippet_key: None,
        };
        assert_eq!(entry.preview(8), "line one...");
        assert_eq!(entry.preview(100), "line one line two");
    }
}
