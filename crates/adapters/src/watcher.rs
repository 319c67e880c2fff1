// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background bus watcher using file notifications.
//!
//! Watches `messages/bus.jsonl` for appends (where the platform supports
//! it), debounces bursts into one read, and falls back to interval polling.
//! A short nudge tick turns blocking-priority sends into immediate reads.

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use pilot_bus::{take_nudge, MessageBus, ReadFilter};
use pilot_core::clock::Clock;
use pilot_core::message::BusMessage;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Coalescing window for filesystem events.
const DEBOUNCE: Duration = Duration::from_millis(50);

/// How often the nudge marker is checked.
const NUDGE_TICK: Duration = Duration::from_millis(250);

/// Configuration for one reader's bus watcher.
pub struct WatcherConfig {
    pub reader_id: String,
    pub filter: ReadFilter,
    /// Poll interval when no filesystem event arrives.
    pub poll_interval: Duration,
}

/// Running watcher; dropping the handle (or sending on `stop`) ends it.
pub struct BusWatcher {
    stop: Option<oneshot::Sender<()>>,
}

impl BusWatcher {
    /// Start watching. Delivered batches arrive on the returned receiver;
    /// messages are acknowledged after the batch is handed over.
    pub fn start<C: Clock>(
        bus: Arc<MessageBus<C>>,
        config: WatcherConfig,
    ) -> (Self, mpsc::Receiver<Vec<BusMessage>>) {
        let (batch_tx, batch_rx) = mpsc::channel(32);
        let (stop_tx, stop_rx) = oneshot::channel();

        tokio::spawn(watch_bus(bus, config, batch_tx, stop_rx));

        (Self { stop: Some(stop_tx) }, batch_rx)
    }

    /// Stop the watcher task.
    pub fn stop(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

impl Drop for BusWatcher {
    fn drop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }
}

async fn watch_bus<C: Clock>(
    bus: Arc<MessageBus<C>>,
    config: WatcherConfig,
    batch_tx: mpsc::Sender<Vec<BusMessage>>,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let WatcherConfig {
        reader_id,
        filter,
        poll_interval,
    } = config;

    let (fs_tx, mut fs_rx) = mpsc::channel::<()>(8);
    let _watcher_guard = match create_file_watcher(&bus, fs_tx) {
        Ok(w) => Some(w),
        Err(e) => {
            tracing::warn!(reader_id, error = %e, "file watcher unavailable, polling only");
            None
        }
    };

    let mut poll = tokio::time::interval(poll_interval);
    poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut nudge_tick = tokio::time::interval(NUDGE_TICK);
    nudge_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        let woke_by_event = tokio::select! {
            _ = &mut stop_rx => break,
            _ = poll.tick() => false,
            _ = nudge_tick.tick() => {
                if !take_nudge(bus.paths(), &reader_id) {
                    continue;
                }
                false
            }
            event = fs_rx.recv() => {
                if event.is_none() {
                    break;
                }
                true
            }
        };

        if woke_by_event {
            // Coalesce the burst: drain whatever lands inside the window
            tokio::time::sleep(DEBOUNCE).await;
            while fs_rx.try_recv().is_ok() {}
        }

        match bus.read(&reader_id, &filter) {
            Ok(result) if !result.messages.is_empty() => {
                let ids: Vec<String> = result.messages.iter().map(|m| m.id.to_string()).collect();
                if batch_tx.send(result.messages).await.is_err() {
                    break;
                }
                let mut cursor = result.cursor;
                if let Err(e) = bus.acknowledge(&mut cursor, &ids) {
                    tracing::warn!(reader_id, error = %e, "cursor ack failed");
                }
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(reader_id, error = %e, "bus read failed"),
        }
    }
}

fn create_file_watcher<C: Clock>(
    bus: &MessageBus<C>,
    fs_tx: mpsc::Sender<()>,
) -> notify::Result<RecommendedWatcher> {
    // Watch the messages directory: the bus file is replaced by rename
    // during compaction, which would silently detach a file-level watch
    let dir = bus.paths().root().to_path_buf();
    std::fs::create_dir_all(&dir).ok();

    let bus_file = bus.paths().bus_file();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        if let Ok(event) = res {
            if event.paths.iter().any(|p| p == &bus_file) {
                let _ = fs_tx.try_send(());
            }
        }
    })?;
    watcher.watch(&dir, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}

#[cfg(test)]
#[path = "watcher_tests.rs"]
mod tests;
