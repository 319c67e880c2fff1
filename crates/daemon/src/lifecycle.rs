// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: paths, single-instance PID file, logging.

use fs2::FileExt;
use pilot_adapters::ProcessWorld;
use pilot_bus::BusPaths;
use pilot_engine::StateTree;
use pilot_policy::{Policy, PolicyError};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Daemon log rotation threshold (5 MB).
const MAX_LOG_SIZE: u64 = 5 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("daemon already running (pid {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Policy(#[from] PolicyError),
}

/// Daemon configuration, all paths repo-relative.
#[derive(Debug, Clone)]
pub struct Config {
    pub repo_root: PathBuf,
    pub tree: StateTree,
    pub bus_paths: BusPaths,
    pub policy_path: PathBuf,
    pub pid_path: PathBuf,
    pub log_path: PathBuf,
}

impl Config {
    /// Derive every path from the repository root.
    pub fn load(repo_root: &Path) -> Self {
        let tree = StateTree::under_repo(repo_root);
        Self {
            repo_root: repo_root.to_path_buf(),
            bus_paths: BusPaths::under_repo(repo_root),
            policy_path: repo_root.join("policy.yaml"),
            pid_path: tree.daemon_pid_file(),
            log_path: tree.daemon_log_file(),
            tree,
        }
    }

    /// Load the policy. A malformed file refuses startup.
    pub fn load_policy(&self) -> Result<Policy, LifecycleError> {
        Ok(Policy::load(&self.policy_path)?)
    }
}

/// Exclusive PID file held for the daemon's lifetime; removed on drop.
pub struct PidGuard {
    // NOTE(lifetime): held to maintain the exclusive file lock
    #[allow(dead_code)]
    file: File,
    path: PathBuf,
}

impl PidGuard {
    /// Acquire the PID file. A live PID inside an existing file refuses
    /// startup; a stale PID file is overwritten.
    pub fn acquire<P: ProcessWorld>(config: &Config, world: &P) -> Result<Self, LifecycleError> {
        let path = config.pid_path.clone();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        if file.try_lock_exclusive().is_err() {
            let mut text = String::new();
            let _ = file.read_to_string(&mut text);
            let pid = text.trim().parse().unwrap_or(0);
            return Err(LifecycleError::AlreadyRunning { pid });
        }

        // Locked but possibly stale content from a crashed daemon
        let mut text = String::new();
        let _ = file.read_to_string(&mut text);
        if let Ok(old_pid) = text.trim().parse::<u32>() {
            if old_pid != world.current_pid() && world.is_alive(old_pid) {
                return Err(LifecycleError::AlreadyRunning { pid: old_pid });
            }
            if old_pid != 0 {
                tracing::warn!(old_pid, "overwriting stale PID file");
            }
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        writeln!(file, "{}", world.current_pid())?;
        file.sync_all()?;

        Ok(Self { file, path })
    }
}

impl Drop for PidGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

/// Rotate the daemon log once it grows past the cap (one `.1` generation).
pub fn rotate_log_if_needed(log_path: &Path) {
    let Ok(meta) = std::fs::metadata(log_path) else {
        return;
    };
    if meta.len() > MAX_LOG_SIZE {
        let rotated = log_path.with_extension("log.1");
        let _ = std::fs::rename(log_path, rotated);
    }
}

/// File logging via tracing-appender; the returned guard must be held for
/// the daemon's lifetime.
pub fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, LifecycleError> {
    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    rotate_log_if_needed(&config.log_path);

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)?;
    let (writer, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Ok(guard)
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
