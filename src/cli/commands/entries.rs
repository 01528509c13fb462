//! History browsing and editing commands.

use colored::Colorize;
use serde::Serialize;

use crate::cli::ListArgs;
use crate::cli::commands::{Context, print_json, require_confirmation};
use crate::error::{Error, Result};
use crate::model::{ClipboardEntry, EntryId, EntryKind, format_timestamp};

const PREVIEW_CHARS: usize = 70;

#[derive(Serialize)]
struct CopyOutput {
    id: EntryId,
    kind: EntryKind,
    copied: bool,
}

#[derive(Serialize)]
struct CopyTextOutput {
    id: Option<EntryId>,
    copied: bool,
}

#[derive(Serialize)]
struct PinOutput {
    id: EntryId,
    pinned: bool,
}

#[derive(Serialize)]
struct DeleteOutput {
    id: EntryId,
    image_removed: bool,
}

#[derive(Serialize)]
struct PruneOutput {
    removed: usize,
    images_removed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    retention_days: Option<u32>,
}

#[derive(Serialize)]
struct GcOutput {
    removed: Vec<String>,
    count: usize,
}

/// `list`
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub fn list(args: &ListArgs, ctx: &Context) -> Result<()> {
    if args.page_size == 0 {
        return Err(Error::InvalidArgument("--page-size must be at least 1".to_string()));
    }
    let history = ctx.history()?;
    let page = history.list(args.search.as_deref(), args.page, args.page_size)?;

    if ctx.json {
        return print_json(&page);
    }

    if page.entries.is_empty() {
        match &args.search {
            Some(search) => println!("No entries match \"{search}\"."),
            None => println!("History is empty."),
        }
        return Ok(());
    }

    for entry in &page.entries {
        print_row(entry);
    }
    println!();
    println!(
        "{}",
        format!(
            "Page {}/{} ({} entries)",
            page.page, page.pages, page.total
        )
        .dimmed()
    );
    Ok(())
}

fn print_row(entry: &ClipboardEntry) {
    let mut markers = String::new();
    if entry.pinned {
        markers.push('*');
    }
    if entry.is_snippet {
        markers.push('#');
    }
    let body = match entry.kind {
        EntryKind::Text => entry.preview(PREVIEW_CHARS),
        EntryKind::Image => format!("[image] {}", entry.content),
    };
    let label = entry
        .snippet_key
        .as_deref()
        .map(|key| format!("({key}) ").cyan().to_string())
        .unwrap_or_default();

    println!(
        "{:>6} {:<2} {} {label}{body}",
        entry.id.to_string().bold(),
        markers.yellow(),
        entry.timestamp.format("%Y-%m-%d %H:%M").to_string().dimmed(),
    );
}

/// `show <id>`
///
/// # Errors
///
/// Returns `Error::EntryNotFound` for an unknown id.
pub fn show(id: EntryId, ctx: &Context) -> Result<()> {
    let entry = ctx.history()?.get(id)?;

    if ctx.json {
        return print_json(&entry);
    }

    println!("{} {}", "ID:".bold(), entry.id);
    println!("{} {}", "Type:".bold(), entry.kind);
    println!("{} {}", "Time:".bold(), format_timestamp(&entry.timestamp));
    println!("{} {}", "Pinned:".bold(), entry.pinned);
    println!("{} {}", "Snippet:".bold(), entry.is_snippet);
    if let Some(key) = &entry.snippet_key {
        println!("{} {key}", "Key:".bold());
    }
    match entry.kind {
        EntryKind::Text => {
            println!();
            println!("{}", entry.content);
        }
        EntryKind::Image => {
            println!("{} {}", "File:".bold(), ctx.paths.root().join(&entry.content).display());
        }
    }
    Ok(())
}

/// `copy <id>`
///
/// # Errors
///
/// Returns `EntryNotFound`, `ImageMissing` or a clipboard error.
pub fn copy(id: EntryId, ctx: &Context) -> Result<()> {
    let entry = ctx.history()?.copy_to_clipboard(id)?;

    if ctx.json {
        print_json(&CopyOutput {
            id,
            kind: entry.kind,
            copied: true,
        })
    } else {
        println!("Copied entry {id} to the clipboard");
        Ok(())
    }
}

/// `copy-text <text>`
///
/// # Errors
///
/// Returns an error if the insert or clipboard write fails.
pub fn copy_text(text: &str, ctx: &Context) -> Result<()> {
    if text.is_empty() {
        return Err(Error::InvalidArgument("text must not be empty".to_string()));
    }
    let id = ctx.history()?.copy_text(text)?;

    if ctx.json {
        print_json(&CopyTextOutput { id, copied: true })
    } else {
        match id {
            Some(id) => println!("Recorded entry {id} and copied it to the clipboard"),
            None => println!("Copied to the clipboard (same as the latest entry)"),
        }
        Ok(())
    }
}

/// `pin <id>`
///
/// # Errors
///
/// Returns `Error::EntryNotFound` for an unknown id.
pub fn pin(id: EntryId, ctx: &Context) -> Result<()> {
    let pinned = ctx.history()?.toggle_pin(id)?;

    if ctx.json {
        print_json(&PinOutput { id, pinned })
    } else {
        let state = if pinned { "Pinned" } else { "Unpinned" };
        println!("{state} entry {id}");
        Ok(())
    }
}

/// `delete <id>`
///
/// # Errors
///
/// Returns `Error::EntryNotFound` for an unknown id.
pub fn delete(id: EntryId, ctx: &Context) -> Result<()> {
    let deleted = ctx.history()?.delete(id)?;
    let image_removed = deleted.orphaned_image().is_some();

    if ctx.json {
        print_json(&DeleteOutput { id, image_removed })
    } else {
        println!("Deleted entry {id}");
        Ok(())
    }
}

/// `clear --yes`
///
/// # Errors
///
/// Returns `ConfirmationRequired` without `--yes`.
pub fn clear(yes: bool, ctx: &Context) -> Result<()> {
    require_confirmation(yes, "clear history")?;
    let outcome = ctx.history()?.clear()?;

    if ctx.json {
        print_json(&PruneOutput {
            removed: outcome.removed,
            images_removed: outcome.orphaned_images.len(),
            retention_days: None,
        })
    } else {
        println!(
            "Cleared {} entries (pinned entries and snippets kept)",
            outcome.removed
        );
        Ok(())
    }
}

/// `prune [--days N]`
///
/// # Errors
///
/// Returns an error if the delete fails.
pub fn prune(days: Option<u32>, ctx: &Context) -> Result<()> {
    let days = days.unwrap_or(ctx.config.history.retention_days);
    let outcome = ctx.history()?.apply_retention(days)?;

    if ctx.json {
        return print_json(&PruneOutput {
            removed: outcome.removed,
            images_removed: outcome.orphaned_images.len(),
            retention_days: Some(days),
        });
    }

    if days == 0 {
        println!("Retention is disabled; nothing pruned.");
    } else {
        println!(
            "Pruned {} entries older than {days} days",
            outcome.removed
        );
    }
    Ok(())
}

/// `gc-images`
///
/// # Errors
///
/// Returns an error if the images directory cannot be read.
pub fn gc_images(ctx: &Context) -> Result<()> {
    let removed = ctx.history()?.collect_orphaned_images()?;

    if ctx.json {
        let count = removed.len();
        return print_json(&GcOutput { removed, count });
    }

    if removed.is_empty() {
        println!("No orphaned images.");
    } else {
        for path in &removed {
            println!("  {}", path.dimmed());
        }
        println!("Removed {} orphaned images", removed.len());
    }
    Ok(())
}
