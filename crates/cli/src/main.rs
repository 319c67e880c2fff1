// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! pilot - Pilot orchestration CLI
//!
//! Thin front end over the state tree and the hub: daemon lifecycle, task
//! claims for the current session, and overnight reports. Output is JSON
//! on stdout; exit code 0 on success, 1 on operational failure.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "pilot",
    version,
    about = "Pilot - multi-agent orchestration for this repository"
)]
struct Cli {
    /// Change to <dir> before doing anything
    #[arg(short = 'C', global = true, value_name = "DIR")]
    directory: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Daemon management
    Daemon {
        #[command(subcommand)]
        action: commands::daemon::DaemonAction,
    },
    /// Claim a task for the current session
    ClaimTask {
        /// Task id to claim
        id: String,
    },
    /// Release the current session's claim
    ReleaseTask,
    /// Show an overnight run report
    Report {
        /// Run id (defaults to the most recent report)
        #[arg(long)]
        run: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Some(dir) = &cli.directory {
        if let Err(e) = std::env::set_current_dir(dir) {
            fail(&format!("cannot change to {}: {e}", dir.display()));
        }
    }

    let result = run(cli).await;
    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => fail(&e.to_string()),
    }
}

async fn run(cli: Cli) -> Result<bool> {
    let repo_root = std::env::current_dir()?;
    match cli.command {
        Commands::Daemon { action } => commands::daemon::run(&repo_root, action).await,
        Commands::ClaimTask { id } => commands::task::claim(&repo_root, &id),
        Commands::ReleaseTask => commands::task::release(&repo_root),
        Commands::Report { run } => commands::report::run(&repo_root, run.as_deref()),
    }
}

fn fail(message: &str) -> ! {
    println!(
        "{}",
        serde_json::json!({ "success": false, "error": message })
    );
    std::process::exit(1);
}
