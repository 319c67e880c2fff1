// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pilot PM Daemon (pilotd)
//!
//! Single orchestrating process: owns the tick loop and the hub. All
//! global decisions — escalations, budgets, spawns — happen on the tick
//! thread; the hub serves connections in spawned tasks and feeds state
//! back through the engine's single-writer components.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use pilot_adapters::{CliTracker, SystemProcessWorld, TaskTracker};
use pilot_bus::MessageBus;
use pilot_core::clock::SystemClock;
use pilot_daemon::hub::{Hub, HubState};
use pilot_daemon::lifecycle::{setup_logging, Config, PidGuard};
use pilot_engine::{PmEngine, PmOptions};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info};

fn print_help() {
    println!("pilotd {}", env!("CARGO_PKG_VERSION"));
    println!("Pilot PM daemon - orchestrates agent sessions for this repository");
    println!();
    println!("USAGE:");
    println!("    pilotd [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    --once                    Run a single tick and exit");
    println!("    --dry-run                 Record spawn intents without spawning");
    println!("    --max-agents <N>          Concurrent agent ceiling");
    println!("    --tick-interval-ms <N>    Milliseconds between ticks");
    println!("    --port <N>                Hub port override");
    println!("    --budget-per-agent-usd <N>  Daily per-agent dollar cap");
    println!("    -h, --help                Print help information");
    println!("    -v, --version             Print version information");
}

struct Args {
    once: bool,
    dry_run: bool,
    max_agents: Option<u32>,
    tick_interval_ms: Option<u64>,
    port: Option<u16>,
    budget_per_agent_usd: Option<f64>,
}

fn parse_args() -> Result<Args, String> {
    let mut args = Args {
        once: false,
        dry_run: false,
        max_agents: None,
        tick_interval_ms: None,
        port: None,
        budget_per_agent_usd: None,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--once" => args.once = true,
            "--dry-run" => args.dry_run = true,
            "--max-agents" => {
                let value = iter.next().ok_or("--max-agents needs a value")?;
                args.max_agents = Some(value.parse().map_err(|_| "bad --max-agents value")?);
            }
            "--tick-interval-ms" => {
                let value = iter.next().ok_or("--tick-interval-ms needs a value")?;
                args.tick_interval_ms =
                    Some(value.parse().map_err(|_| "bad --tick-interval-ms value")?);
            }
            "--port" => {
                let value = iter.next().ok_or("--port needs a value")?;
                args.port = Some(value.parse().map_err(|_| "bad --port value")?);
            }
            "--budget-per-agent-usd" => {
                let value = iter.next().ok_or("--budget-per-agent-usd needs a value")?;
                args.budget_per_agent_usd =
                    Some(value.parse().map_err(|_| "bad --budget-per-agent-usd value")?);
            }
            "--version" | "-V" | "-v" => {
                println!("pilotd {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--help" | "-h" | "help" => {
                print_help();
                std::process::exit(0);
            }
            other => return Err(format!("unexpected argument '{other}'")),
        }
    }
    Ok(args)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("error: {e}");
            eprintln!("Usage: pilotd [--once | --dry-run | --max-agents N | --port N]");
            std::process::exit(1);
        }
    };

    let repo_root = std::env::current_dir()?;
    let config = Config::load(&repo_root);

    // A policy the daemon cannot read is fatal; silent defaults would mask
    // typos in budgets and escalation paths
    let policy = config.load_policy()?;

    let log_guard = setup_logging(&config)?;

    let world = SystemProcessWorld;
    let pid_guard = PidGuard::acquire(&config, &world)?;

    info!(repo = %repo_root.display(), "starting PM daemon");

    let clock = SystemClock;
    let bus = Arc::new(MessageBus::new(config.bus_paths.clone(), clock.clone()));
    let tracker: Arc<dyn TaskTracker> = Arc::new(CliTracker::new(
        std::env::var("PILOT_TRACKER_BIN").unwrap_or_else(|_| "pilot-tracker".to_string()),
    ));

    let mut options = PmOptions::from_policy(&policy);
    options.once = args.once;
    options.dry_run = args.dry_run;
    if let Some(max_agents) = args.max_agents {
        options.max_agents = max_agents;
    }
    if let Some(interval) = args.tick_interval_ms {
        options.tick_interval_ms = interval;
    }
    options.budget_per_agent_usd = args.budget_per_agent_usd;
    options.agent_command = std::env::var("PILOT_AGENT_BIN").ok();

    let hub_port = args.port.unwrap_or_else(|| {
        std::env::var("PILOT_PM_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(policy.orchestrator.hub_port)
    });

    let tick_interval = Duration::from_millis(options.tick_interval_ms.max(1));
    let once = options.once;

    let engine = Arc::new(PmEngine::new(
        &repo_root,
        policy,
        options,
        clock.clone(),
        world,
        Arc::clone(&bus),
        tracker,
    ));
    let hub_state = HubState::new(Arc::clone(&engine), clock);
    let hub = Hub::start(Arc::clone(&hub_state), hub_port).await?;

    if once {
        let report = engine.tick().await;
        info!(tick = report.tick, "single tick complete");
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "tick": report.tick,
                "scans": report.scans.iter().map(|s| {
                    serde_json::json!({"scan": s.scan, "ok": s.ok, "detail": s.detail})
                }).collect::<Vec<_>>(),
            })
        );
        hub.stop(&hub_state);
        drop(pid_guard);
        drop(log_guard);
        return Ok(());
    }

    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut interval = tokio::time::interval(tick_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    // A tick that overruns the interval simply delays the next one; ticks
    // never overlap because each is awaited here
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = engine.tick().await;
                if report.scans.iter().any(|s| !s.ok) {
                    error!(tick = report.tick, "tick had failing scans");
                }
            }
            _ = sigterm.recv() => {
                info!("SIGTERM: finishing current scan and shutting down");
                break;
            }
            _ = sigint.recv() => {
                info!("SIGINT: shutting down");
                break;
            }
        }
    }

    info!(ticks = engine.ticks_run(), "daemon stopping");
    hub.stop(&hub_state);
    drop(pid_guard);
    drop(log_guard);
    Ok(())
}
