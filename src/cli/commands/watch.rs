//! `watch` - record clipboard changes until interrupted.

use std::sync::Arc;

use colored::Colorize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::capture::{ArboardClipboard, AutoSync, ChangeDetector, Watcher, WatcherOptions};
use crate::cli::commands::Context;
use crate::error::Result;
use crate::events::CoreEvent;
use crate::history::History;

/// Execute the watch command.
///
/// # Errors
///
/// Returns an error if the store cannot be opened or the runtime fails to
/// start.
pub fn execute(no_sync: bool, ctx: &Context) -> Result<()> {
    let history = ctx.history()?;
    let options = watcher_options(&history, no_sync, ctx);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(watch(history, options, ctx.config.history.log_images, ctx.json))
}

fn watcher_options(history: &History, no_sync: bool, ctx: &Context) -> WatcherOptions {
    let options = WatcherOptions::from_config(&ctx.config);
    if no_sync || !ctx.config.sync.auto_sync {
        return options;
    }

    match ctx.config.require_profile(ctx.profile.as_deref()) {
        Ok(profile) => {
            info!(profile = %profile.name, "Automatic sync enabled");
            options.with_auto_sync(AutoSync {
                reconciler: Arc::new(ctx.reconciler(history.storage(), history.events().clone())),
                profile: profile.name.clone(),
                interval: ctx.config.sync_interval(),
            })
        }
        Err(e) => {
            warn!(error = %e, "Automatic sync is enabled but no usable profile is selected");
            options
        }
    }
}

async fn watch(
    history: History,
    options: WatcherOptions,
    log_images: bool,
    json: bool,
) -> Result<()> {
    let mut events = history.events().subscribe();
    let detector = ChangeDetector::new(
        ArboardClipboard::new(),
        history.images().clone(),
        log_images,
        history.ignore_marker(),
    );
    let watcher = Watcher::spawn(detector, history.clone(), options);

    if !json {
        println!("Watching the clipboard. Press Ctrl-C to stop.");
    }

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => print_event(&history, &event, json),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event listener lagged"),
                Err(RecvError::Closed) => break,
            },
            signal = tokio::signal::ctrl_c() => {
                if let Err(e) = signal {
                    warn!(error = %e, "Failed to listen for Ctrl-C");
                }
                break;
            }
        }
    }

    watcher.stop().await?;
    if !json {
        println!("Stopped.");
    }
    Ok(())
}

fn print_event(history: &History, event: &CoreEvent, json: bool) {
    if json {
        if let Ok(line) = serde_json::to_string(event) {
            println!("{line}");
        }
        return;
    }

    match event {
        CoreEvent::EntryAdded { id, kind } => {
            let preview = history
                .get(*id)
                .map(|entry| entry.preview(60))
                .unwrap_or_default();
            println!("{} {} {preview}", format!("+{id}").green(), format!("[{kind}]").dimmed());
        }
        CoreEvent::SyncCompleted { success: true, message } => {
            println!("{} {message}", "sync".cyan());
        }
        CoreEvent::SyncCompleted { success: false, message } => {
            println!("{} {message}", "sync failed".red());
        }
        CoreEvent::HistoryCleared { removed } => {
            println!("{} {removed} entries", "cleared".yellow());
        }
    }
}
