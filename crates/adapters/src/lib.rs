// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! pilot-adapters: OS and transport adapters.
//!
//! Everything that touches the process table, the network, spawned child
//! processes, or filesystem notifications lives here behind small traits,
//! with fake implementations for tests.

pub mod connector;
pub mod http;
pub mod process;
pub mod spawner;
pub mod tracker;
pub mod watcher;

pub use connector::{discover_hub_port, AgentConnector, ConnectorConfig, ConnectorError};
pub use http::{http_get, http_post, HttpError, HttpResponse};
pub use process::{ProcessWorld, SystemProcessWorld};
pub use spawner::{AgentSpawner, SpawnError, SpawnSpec};
pub use tracker::{CliTracker, TaskTracker, TrackerTask};
pub use watcher::{BusWatcher, WatcherConfig};

#[cfg(any(test, feature = "test-support"))]
pub use process::FakeProcessWorld;
#[cfg(any(test, feature = "test-support"))]
pub use tracker::FakeTracker;
