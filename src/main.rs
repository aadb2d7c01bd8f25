mod agents;
mod cli;
mod config;
mod error;
mod npm;
mod repository;
#[cfg(test)]
mod testutil;
mod utils;
mod workflow;

use clap::Parser;
use cli::{Cli, Commands};
use colored::Colorize;
use config::Settings;
use std::process;
use tracing_subscriber::EnvFilter;
use workflow::UpdateOptions;

fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let settings = Settings::new(&cli.path)
        .with_registry(cli.registry)
        .with_strict_exit_status(cli.strict_exit_status);

    let result = match cli.command {
        Commands::Analyze { security } => workflow::execute_analyze(&settings, security),
        Commands::Update {
            interactive,
            security,
            safe,
            all,
            packages,
            filter,
            yes,
        } => workflow::execute_update(
            &settings,
            UpdateOptions {
                interactive,
                security,
                safe,
                all,
                packages,
                filter,
                yes,
            },
        ),
        Commands::Test { package } => workflow::execute_test(&settings, &package),
        Commands::Rollback { id, yes } => {
            workflow::execute_rollback(&settings, id.as_deref(), yes)
        }
        Commands::Snapshots { prune_keep } => workflow::execute_snapshots(&settings, prune_keep),
        Commands::Why { package } => workflow::execute_why(&settings, &package),
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        process::exit(1);
    }
}
