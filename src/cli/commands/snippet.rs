//! Snippet command implementations.

use serde::Serialize;

use crate::cli::SnippetCommands;
use crate::cli::commands::{Context, print_json};
use crate::error::{Error, Result};
use crate::model::EntryId;

#[derive(Serialize)]
struct SnippetOutput<'a> {
    id: EntryId,
    is_snippet: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    key: Option<&'a str>,
}

/// Execute snippet commands.
///
/// # Errors
///
/// Returns an error for empty content or an unknown id.
pub fn execute(command: &SnippetCommands, ctx: &Context) -> Result<()> {
    match command {
        SnippetCommands::Add { content, key } => add(content, key.as_deref(), ctx),
        SnippetCommands::Set { id, key } => set(*id, key.as_deref(), ctx),
        SnippetCommands::Unset { id } => unset(*id, ctx),
    }
}

fn add(content: &str, key: Option<&str>, ctx: &Context) -> Result<()> {
    if content.trim().is_empty() {
        return Err(Error::InvalidArgument("snippet content must not be empty".to_string()));
    }
    let id = ctx.history()?.add_snippet(content, key)?;

    if ctx.json {
        print_json(&SnippetOutput {
            id,
            is_snippet: true,
            key,
        })
    } else {
        println!("Created snippet {id}");
        Ok(())
    }
}

fn set(id: EntryId, key: Option<&str>, ctx: &Context) -> Result<()> {
    ctx.history()?.set_snippet(id, key)?;

    if ctx.json {
        print_json(&SnippetOutput {
            id,
            is_snippet: true,
            key,
        })
    } else {
        println!("Entry {id} is now a snippet");
        Ok(())
    }
}

fn unset(id: EntryId, ctx: &Context) -> Result<()> {
    ctx.history()?.clear_snippet(id)?;

    if ctx.json {
        print_json(&SnippetOutput {
            id,
            is_snippet: false,
            key: None,
        })
    } else {
        println!("Entry {id} is no longer a snippet");
        Ok(())
    }
}
