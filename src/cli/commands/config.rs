//! Settings commands.

use colored::Colorize;

use crate::cli::ConfigCommands;
use crate::cli::commands::{Context, print_json};
use crate::error::Result;

/// Execute config commands.
///
/// # Errors
///
/// Returns an error for invalid values or if the config cannot be written.
pub fn execute(command: &ConfigCommands, ctx: &Context) -> Result<()> {
    let mut config = ctx.config.clone();

    match command {
        ConfigCommands::Show => return show(ctx),
        ConfigCommands::SetRetention { days } => config.history.retention_days = *days,
        ConfigCommands::SetLogImages { enabled } => config.history.log_images = *enabled,
        ConfigCommands::SetAutoSync { enabled, interval } => {
            config.set_auto_sync(*enabled, *interval)?;
        }
    }

    ctx.save_config(&config)?;

    if ctx.json {
        print_json(&config)
    } else {
        println!("Saved {}", ctx.paths.config_file().display());
        Ok(())
    }
}

fn show(ctx: &Context) -> Result<()> {
    let config = &ctx.config;

    if ctx.json {
        return print_json(config);
    }

    let retention = if config.history.retention_days == 0 {
        "keep everything".to_string()
    } else {
        format!("{} days", config.history.retention_days)
    };

    println!("{}", "History".bold());
    println!("  Data dir:       {}", ctx.paths.root().display());
    println!("  Retention:      {retention}");
    println!("  Log images:     {}", config.history.log_images);
    println!("  Poll interval:  {} ms", config.poll_interval().as_millis());
    println!();
    println!("{}", "Sync".bold());
    println!("  Auto sync:      {}", config.sync.auto_sync);
    println!("  Interval:       {} min", config.sync.sync_interval_minutes);
    println!("  Timeout:        {} s", config.sync_timeout().as_secs());
    println!(
        "  Profiles:       {}",
        if config.sync.profiles.is_empty() {
            "(none)".dimmed().to_string()
        } else {
            config.profile_names().join(", ")
        }
    );
    if let Some(profile) = &ctx.profile {
        println!("  Active:         {profile}");
    }
    Ok(())
}
