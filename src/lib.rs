//! clipstash - clipboard history with snippets, backups and folder sync
//!
//! This crate provides the core behind the `clipstash` CLI. Any other front
//! end (a tray app, a picker window) is expected to drive the same
//! [`history::History`] service and subscribe to [`events::EventBus`].
//!
//! # Architecture
//!
//! - [`capture`] - clipboard access, change detection, background watcher
//! - [`history`] - the service front ends talk to
//! - [`storage`] - SQLite entry store and image blobs
//! - [`sync`] - full backups, tabular formats, folder sync
//! - [`config`] - data root resolution and `config.json`
//! - [`events`] - broadcast notifications
//! - [`model`] - entry types and timestamp handling
//! - [`cli`] - command-line interface using clap
//! - [`error`] - error types and handling

#![forbid(unsafe_code)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod capture;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod history;
pub mod model;
pub mod storage;
pub mod sync;

pub use error::{Error, Result};
