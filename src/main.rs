//! clipstash CLI entry point.

use std::io::IsTerminal;
use std::process::ExitCode;

use clap::Parser;
use clipstash::cli::commands::{self, Context};
use clipstash::cli::{Cli, Commands};
use clipstash::error::Error;

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Set up tracing based on verbosity
    init_tracing(cli.verbose, cli.quiet);

    // JSON when asked for, or when stdout is not a terminal
    let json = cli.json || !std::io::stdout().is_terminal();

    match run(&cli, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                eprintln!("{}", e.to_structured_json());
            } else if !cli.quiet {
                if let Some(hint) = e.hint() {
                    eprintln!("Error: {e}\n  Hint: {hint}");
                } else {
                    eprintln!("Error: {e}");
                }
            }
            ExitCode::from(e.exit_code())
        }
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    use tracing_subscriber::EnvFilter;

    if quiet {
        return;
    }

    // Honor RUST_LOG if set, otherwise use verbosity flag
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        match verbose {
            0 => EnvFilter::new("warn"),
            1 => EnvFilter::new("info"),
            2 => EnvFilter::new("debug,rusqlite=info"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();
}

fn run(cli: &Cli, json: bool) -> Result<(), Error> {
    // These need no data directory.
    match &cli.command {
        Commands::Version => return commands::version::execute(json),
        Commands::Completions { shell } => return commands::completions::execute(shell),
        _ => {}
    }

    let ctx = Context::from_cli(cli, json)?;

    match &cli.command {
        Commands::Watch { no_sync } => commands::watch::execute(*no_sync, &ctx),

        // History
        Commands::List(args) => commands::entries::list(args, &ctx),
        Commands::Show { id } => commands::entries::show(*id, &ctx),
        Commands::Copy { id } => commands::entries::copy(*id, &ctx),
        Commands::CopyText { text } => commands::entries::copy_text(text, &ctx),
        Commands::Pin { id } => commands::entries::pin(*id, &ctx),
        Commands::Delete { id } => commands::entries::delete(*id, &ctx),
        Commands::Clear { yes } => commands::entries::clear(*yes, &ctx),
        Commands::Prune { days } => commands::entries::prune(*days, &ctx),
        Commands::GcImages => commands::entries::gc_images(&ctx),
        Commands::Snippet { command } => commands::snippet::execute(command, &ctx),

        // Backups and formats
        Commands::Backup { command } => commands::backup::execute(command, &ctx),
        Commands::Export { path, format } => commands::backup::export(path, *format, &ctx),
        Commands::Import { path, format } => commands::backup::import(path, *format, &ctx),

        // Sync
        Commands::Sync { command } => commands::sync::execute(command, &ctx),
        Commands::Profile { command } => commands::profile::execute(command, &ctx),
        Commands::Config { command } => commands::config::execute(command, &ctx),

        Commands::Version | Commands::Completions { .. } => Ok(()),
    }
}
