//! Folder sync command implementations.
//!
//! Every command acts on the profile selected with `--profile` or
//! `CLIPSTASH_PROFILE`; the selection is never stored.

use std::sync::{Arc, Mutex};

use colored::Colorize;
use serde::Serialize;

use crate::cli::SyncCommands;
use crate::cli::commands::backup::print_restore;
use crate::cli::commands::{Context, print_json, require_confirmation};
use crate::error::Result;
use crate::events::EventBus;
use crate::sync::{Reconciler, SnapshotInfo, SyncError, SyncState};

#[derive(Serialize)]
struct SnapshotsOutput<'a> {
    profile: &'a str,
    snapshots: &'a [SnapshotInfo],
    count: usize,
}

#[derive(Serialize)]
struct ResetOutput {
    reset: bool,
}

/// Execute sync commands.
///
/// # Errors
///
/// Returns an error if no usable profile is selected or the operation fails.
pub fn execute(command: &SyncCommands, ctx: &Context) -> Result<()> {
    match command {
        SyncCommands::Run => run(ctx),
        SyncCommands::Status => status(ctx),
        SyncCommands::Reset => reset(ctx),
        SyncCommands::Snapshots => snapshots(ctx),
        SyncCommands::Restore { file, yes } => restore(file.as_deref(), *yes, ctx),
    }
}

fn reconciler(ctx: &Context) -> Result<Reconciler> {
    let storage = Arc::new(Mutex::new(ctx.open_storage()?));
    Ok(ctx.reconciler(storage, EventBus::default()))
}

fn run(ctx: &Context) -> Result<()> {
    let profile = ctx.config.require_profile(ctx.profile.as_deref())?.name.clone();
    let reconciler = Arc::new(reconciler(ctx)?);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let report = runtime.block_on(reconciler.sync_with_timeout(Some(profile)));

    if ctx.json {
        print_json(&report)?;
    } else if report.success {
        println!("{} {}", "✓".green(), report.message);
        for name in &report.pruned {
            println!("  {} {}", "pruned".dimmed(), name);
        }
    }

    if report.success {
        Ok(())
    } else {
        Err(SyncError::Failed(report.message).into())
    }
}

fn status(ctx: &Context) -> Result<()> {
    let status = reconciler(ctx)?.status(ctx.profile.as_deref());

    if ctx.json {
        return print_json(&status);
    }

    println!("{}", "Sync Status".bold());
    match (&status.active_profile, &status.target) {
        (Some(name), Some(target)) => {
            let availability = if status.target_available {
                "available".green()
            } else {
                "unavailable".red()
            };
            println!("  Profile:   {name}");
            println!("  Folder:    {} ({availability})", target.display());
            println!("  Snapshots: {}", status.snapshots);
        }
        (Some(name), None) => println!("  Profile:   {name} {}", "(not configured)".red()),
        _ => println!("  Profile:   {}", "(none selected)".dimmed()),
    }

    match status.last_sync {
        Some(at) => {
            println!(
                "  Last sync: {} via {}",
                at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M:%S"),
                status.last_profile.as_deref().unwrap_or("?")
            );
            if let Some(snapshot) = &status.last_snapshot {
                println!("             {}", snapshot.dimmed());
            }
        }
        None => println!("  Last sync: never"),
    }

    let auto = if status.auto_sync {
        format!("every {} min", status.sync_interval_minutes)
    } else {
        "off".to_string()
    };
    println!("  Auto sync: {auto}");
    Ok(())
}

fn reset(ctx: &Context) -> Result<()> {
    let reset = SyncState::reset(&ctx.paths.sync_state())?;

    if ctx.json {
        print_json(&ResetOutput { reset })
    } else {
        if reset {
            println!("Sync state reset");
        } else {
            println!("No sync state to reset");
        }
        Ok(())
    }
}

fn snapshots(ctx: &Context) -> Result<()> {
    let profile = ctx.config.require_profile(ctx.profile.as_deref())?.name.clone();
    let snapshots = reconciler(ctx)?.list_snapshots(Some(&profile))?;

    if ctx.json {
        return print_json(&SnapshotsOutput {
            profile: &profile,
            snapshots: &snapshots,
            count: snapshots.len(),
        });
    }

    if snapshots.is_empty() {
        println!("No snapshots for profile {profile}.");
        return Ok(());
    }

    // Newest first reads better in a terminal.
    for snapshot in snapshots.iter().rev() {
        println!(
            "{}  {}  {}",
            snapshot.name,
            snapshot
                .modified
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string()
                .dimmed(),
            format!("{} bytes", snapshot.size).dimmed()
        );
    }
    Ok(())
}

fn restore(file: Option<&str>, yes: bool, ctx: &Context) -> Result<()> {
    let profile = ctx.config.require_profile(ctx.profile.as_deref())?.name.clone();
    require_confirmation(yes, "replace all local data with a snapshot")?;

    let reconciler = reconciler(ctx)?;
    let outcome = match file {
        Some(name) => reconciler.restore(Some(&profile), name)?,
        None => reconciler.restore_latest(Some(&profile))?,
    };

    let source = file.map_or_else(|| format!("latest snapshot of {profile}"), str::to_string);
    print_restore(outcome, &source, ctx)
}
