//! Sync profile management.

use std::path::Path;

use colored::Colorize;
use serde::Serialize;

use crate::cli::ProfileCommands;
use crate::cli::commands::{Context, print_json};
use crate::config::SyncProfile;
use crate::error::Result;

#[derive(Serialize)]
struct ProfileListOutput<'a> {
    profiles: &'a [SyncProfile],
    active: Option<&'a str>,
    count: usize,
}

#[derive(Serialize)]
struct ProfileChangeOutput<'a> {
    name: &'a str,
    action: &'a str,
}

/// Execute profile commands.
///
/// # Errors
///
/// Returns an error for invalid or duplicate profiles, unknown names, or a
/// config write failure.
pub fn execute(command: &ProfileCommands, ctx: &Context) -> Result<()> {
    match command {
        ProfileCommands::Add {
            name,
            path,
            retention,
        } => add(name, path, *retention, ctx),
        ProfileCommands::Remove { name } => remove(name, ctx),
        ProfileCommands::List => list(ctx),
    }
}

fn add(name: &str, path: &Path, retention: usize, ctx: &Context) -> Result<()> {
    let mut config = ctx.config.clone();
    config.add_profile(SyncProfile {
        name: name.to_string(),
        path: path.to_path_buf(),
        retention_count: retention,
    })?;
    ctx.save_config(&config)?;

    if ctx.json {
        return print_json(&ProfileChangeOutput {
            name: name.trim(),
            action: "added",
        });
    }

    println!("Added profile {} -> {}", name.trim().bold(), path.display());
    if !path.is_dir() {
        println!(
            "{}",
            "Warning: the folder does not exist yet; sync will fail until it does.".yellow()
        );
    }
    Ok(())
}

fn remove(name: &str, ctx: &Context) -> Result<()> {
    let mut config = ctx.config.clone();
    config.remove_profile(name)?;
    ctx.save_config(&config)?;

    if ctx.json {
        print_json(&ProfileChangeOutput {
            name,
            action: "removed",
        })
    } else {
        println!("Removed profile {name}");
        Ok(())
    }
}

fn list(ctx: &Context) -> Result<()> {
    let profiles = &ctx.config.sync.profiles;
    let active = ctx.profile.as_deref();

    if ctx.json {
        return print_json(&ProfileListOutput {
            profiles,
            active,
            count: profiles.len(),
        });
    }

    if profiles.is_empty() {
        println!("No sync profiles. Create one: clipstash profile add <name> <folder>");
        return Ok(());
    }

    for profile in profiles {
        let marker = if Some(profile.name.as_str()) == active {
            "*".green().to_string()
        } else {
            " ".to_string()
        };
        let keep = if profile.retention_count == 0 {
            "keep all".to_string()
        } else {
            format!("keep {}", profile.retention_count)
        };
        println!(
            "{marker} {} {} {}",
            profile.name.bold(),
            profile.path.display(),
            format!("({keep})").dimmed()
        );
    }
    Ok(())
}
