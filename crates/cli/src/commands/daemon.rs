// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `pilot daemon start|stop|status`

use anyhow::Result;
use clap::Subcommand;
use pilot_adapters::{discover_hub_port, http_get, ProcessWorld, SystemProcessWorld};
use pilot_daemon::lifecycle::Config;
use std::path::Path;

#[derive(Subcommand)]
pub enum DaemonAction {
    /// Launch pilotd for this repository
    Start {
        /// Run a single tick and exit
        #[arg(long)]
        once: bool,
        /// Record spawn intents without spawning agents
        #[arg(long)]
        dry_run: bool,
    },
    /// Ask the running daemon to shut down
    Stop,
    /// Report daemon liveness and hub status
    Status,
}

pub async fn run(repo_root: &Path, action: DaemonAction) -> Result<bool> {
    let config = Config::load(repo_root);
    let world = SystemProcessWorld;

    match action {
        DaemonAction::Start { once, dry_run } => {
            if let Some(pid) = running_pid(&config, &world) {
                println!(
                    "{}",
                    serde_json::json!({ "success": false, "error": "already running", "pid": pid })
                );
                return Ok(false);
            }

            let bin = std::env::var("PILOT_DAEMON_BIN").unwrap_or_else(|_| "pilotd".to_string());
            let mut cmd = std::process::Command::new(&bin);
            cmd.current_dir(repo_root)
                .stdin(std::process::Stdio::null())
                .stdout(std::process::Stdio::null())
                .stderr(std::process::Stdio::null());
            if once {
                cmd.arg("--once");
            }
            if dry_run {
                cmd.arg("--dry-run");
            }
            let child = cmd.spawn()?;
            println!(
                "{}",
                serde_json::json!({ "success": true, "pid": child.id() })
            );
            Ok(true)
        }
        DaemonAction::Stop => match running_pid(&config, &world) {
            Some(pid) => {
                let signaled = world.terminate(pid);
                println!(
                    "{}",
                    serde_json::json!({ "success": signaled, "pid": pid })
                );
                Ok(signaled)
            }
            None => {
                println!(
                    "{}",
                    serde_json::json!({ "success": false, "error": "not running" })
                );
                Ok(false)
            }
        },
        DaemonAction::Status => {
            let pid = running_pid(&config, &world);
            let hub = match pid {
                Some(_) => {
                    let port = discover_hub_port(repo_root);
                    match http_get(&format!("127.0.0.1:{port}"), "/api/status").await {
                        Ok(response) if response.is_success() => {
                            serde_json::from_str(&response.body).unwrap_or(serde_json::Value::Null)
                        }
                        _ => serde_json::Value::Null,
                    }
                }
                None => serde_json::Value::Null,
            };
            println!(
                "{}",
                serde_json::json!({
                    "success": true,
                    "running": pid.is_some(),
                    "pid": pid,
                    "hub": hub,
                })
            );
            Ok(true)
        }
    }
}

/// PID from the daemon PID file, when that process is live.
fn running_pid<P: ProcessWorld>(config: &Config, world: &P) -> Option<u32> {
    let text = std::fs::read_to_string(&config.pid_path).ok()?;
    let pid: u32 = text.trim().parse().ok()?;
    world.is_alive(pid).then_some(pid)
}
