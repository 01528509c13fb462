//! Version command implementation.

use serde::Serialize;

use crate::cli::commands::print_json;
use crate::config::{CONFIG_FILE, DB_FILE};
use crate::error::Result;
use crate::storage::schema::CURRENT_SCHEMA_VERSION;

#[derive(Serialize)]
struct VersionOutput<'a> {
    version: &'a str,
    build: &'a str,
    schema_version: i32,
    database: &'a str,
    config: &'a str,
}

/// Execute the version command.
///
/// # Errors
///
/// Returns an error if JSON serialization fails.
pub fn execute(json: bool) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    let build = if cfg!(debug_assertions) {
        "dev"
    } else {
        "release"
    };

    if json {
        return print_json(&VersionOutput {
            version,
            build,
            schema_version: CURRENT_SCHEMA_VERSION,
            database: DB_FILE,
            config: CONFIG_FILE,
        });
    }

    println!("clipstash version {version} ({build}, schema v{CURRENT_SCHEMA_VERSION})");
    Ok(())
}
