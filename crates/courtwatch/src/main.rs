// SPDX-FileCopyrightText: 2026 Courtwatch Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Courtwatch - watches tennis court booking sites and alerts on free slots.
//!
//! This is the binary entry point for the Courtwatch service.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod admin;
mod notifier;
mod scraper;
mod serve;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use courtwatch_config::CourtwatchConfig;
use courtwatch_core::CourtwatchError;

use crate::admin::Admin;

/// Courtwatch - watches tennis court booking sites and alerts on free slots.
#[derive(Parser, Debug)]
#[command(name = "courtwatch", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the XDG hierarchy.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the scheduler, scrape workers and retention until stopped.
    Serve,
    /// Sync venues from config and run a single scheduler pass.
    Tick,
    /// Show scheduler, venue and queue status.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
        /// Disable colors.
        #[arg(long)]
        plain: bool,
    },
    /// Stop enqueueing new scrapes. Running scrapes finish normally.
    Pause,
    /// Resume enqueueing.
    Resume,
    /// Slot history retention.
    Retention {
        #[command(subcommand)]
        action: RetentionCommands,
    },
    /// Inspect and recover dead-lettered tasks.
    DeadLetters {
        #[command(subcommand)]
        action: DeadLetterCommands,
    },
}

#[derive(Subcommand, Debug)]
enum RetentionCommands {
    /// Run one retention pass now.
    Run {
        /// Report what would be deleted without deleting.
        #[arg(long)]
        dry_run: bool,
        /// Output the run report as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum DeadLetterCommands {
    /// List dead-lettered tasks, oldest first.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Move a dead-lettered task back to the queue with a fresh attempt budget.
    Requeue {
        /// Task id as shown by `dead-letters list`.
        id: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            courtwatch_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    serve::init_tracing(&config.logging);

    if let Err(e) = run(cli.command, config).await {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn load_config(
    path: Option<&std::path::Path>,
) -> Result<CourtwatchConfig, Vec<courtwatch_config::ConfigError>> {
    match path {
        Some(path) => courtwatch_config::load_and_validate_path(path),
        None => courtwatch_config::load_and_validate(),
    }
}

async fn run(command: Option<Commands>, config: CourtwatchConfig) -> Result<(), CourtwatchError> {
    let Some(command) = command else {
        println!("courtwatch: use --help for available commands");
        return Ok(());
    };

    match command {
        Commands::Serve => serve::run_serve(config).await,
        command => {
            let admin = Admin::open(&config).await?;
            let result = run_admin(&admin, command).await;
            admin.db.close().await?;
            result
        }
    }
}

async fn run_admin(admin: &Admin, command: Commands) -> Result<(), CourtwatchError> {
    match command {
        Commands::Serve => Err(CourtwatchError::Internal(
            "serve is not a one-shot command".to_string(),
        )),
        Commands::Tick => admin.tick().await,
        Commands::Status { json, plain } => status::run_status(&admin.scheduler(), json, plain).await,
        Commands::Pause => admin.set_paused(true).await,
        Commands::Resume => admin.set_paused(false).await,
        Commands::Retention {
            action: RetentionCommands::Run { dry_run, json },
        } => admin.retention_run(dry_run, json).await,
        Commands::DeadLetters { action } => match action {
            DeadLetterCommands::List { json } => admin.dead_letters(json).await,
            DeadLetterCommands::Requeue { id } => admin.requeue(&id).await,
        },
    }
}
