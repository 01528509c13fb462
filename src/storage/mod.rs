//! SQLite storage layer for clipstash.
//!
//! This module provides the persistence layer using SQLite with:
//! - WAL mode for concurrent reads
//! - Transaction discipline for atomic writes
//! - Additive, embedded schema migrations
//! - PNG blob files for image entries
//!
//! # Submodules
//!
//! - [`images`] - Image blob files under `images/`
//! - [`schema`] - Database schema definitions
//! - [`sqlite`] - Main SQLite storage implementation

pub mod images;
pub mod migrations;
pub mod schema;
pub mod sqlite;

pub use images::{ImageOrigin, ImageStore, RawImage};
pub use sqlite::{
    DEDUP_WINDOW_MS, DeletedEntry, EntryCounts, MutationContext, PruneOutcome, SqliteStorage,
};
