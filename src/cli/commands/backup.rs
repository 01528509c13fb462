//! Backup and tabular import/export commands.

use std::path::Path;

use serde::Serialize;

use crate::cli::BackupCommands;
use crate::cli::commands::{Context, print_json, require_confirmation};
use crate::error::Result;
use crate::sync::{self, ExportFormat, ImportFormat, ImportOutcome};

#[derive(Serialize)]
struct ImportOutput {
    imported: usize,
    format: ImportFormat,
}

#[derive(Serialize)]
struct RestoreOutput<'a> {
    source: &'a str,
    files_restored: usize,
    restart_required: bool,
}

/// Execute backup commands.
///
/// # Errors
///
/// Returns an error if the archive cannot be written or read, or
/// `ConfirmationRequired` for an unconfirmed import.
pub fn execute(command: &BackupCommands, ctx: &Context) -> Result<()> {
    match command {
        BackupCommands::Export { path } => export_backup(path, ctx),
        BackupCommands::Import { path, yes } => import_backup(path, *yes, ctx),
    }
}

fn export_backup(path: &Path, ctx: &Context) -> Result<()> {
    let storage = ctx.open_storage()?;
    let summary = sync::export_backup(&storage, &ctx.paths, path)?;

    if ctx.json {
        return print_json(&summary);
    }

    println!("Backup written: {}", summary.path.display());
    println!("  Images: {}", summary.images);
    println!(
        "  Config: {}",
        if summary.includes_config { "included" } else { "none" }
    );
    println!("  Size:   {} bytes", summary.size);
    Ok(())
}

fn import_backup(path: &Path, yes: bool, ctx: &Context) -> Result<()> {
    // Validate first so a bad archive fails before asking for confirmation.
    sync::validate_archive(path)?;
    require_confirmation(yes, "replace all local data")?;

    let storage = ctx.open_storage()?;
    let outcome = sync::import_backup(storage, &ctx.paths, path)?;
    print_restore(outcome, &path.display().to_string(), ctx)
}

/// Shared output for backup import and sync restore.
pub(super) fn print_restore(outcome: ImportOutcome, source: &str, ctx: &Context) -> Result<()> {
    let ImportOutcome::RestartRequired { files_restored } = outcome;

    if ctx.json {
        return print_json(&RestoreOutput {
            source,
            files_restored,
            restart_required: true,
        });
    }

    println!("Restored {files_restored} files from {source}");
    println!("Restart any running `clipstash watch` so it picks up the restored data.");
    Ok(())
}

/// `export <path> --format <fmt>`
///
/// # Errors
///
/// Returns an error if the store cannot be read or the file written.
pub fn export(path: &Path, format: ExportFormat, ctx: &Context) -> Result<()> {
    let storage = ctx.open_storage()?;
    let written = sync::export_entries(&storage, format, path)?;

    if ctx.json {
        print_json(&written)
    } else {
        println!("Exported {} entries to {}", written.rows, written.path.display());
        Ok(())
    }
}

/// `import <path> --format <fmt>`
///
/// Rows whose timestamp already exists are skipped.
///
/// # Errors
///
/// Returns an error if the file cannot be parsed or the merge fails.
pub fn import(path: &Path, format: ImportFormat, ctx: &Context) -> Result<()> {
    let mut storage = ctx.open_storage()?;
    let imported = sync::import_entries(&mut storage, format, path)?;

    if ctx.json {
        print_json(&ImportOutput { imported, format })
    } else {
        println!("Imported {imported} new entries from {}", path.display());
        Ok(())
    }
}
