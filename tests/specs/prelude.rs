//! Shared fixtures for the behavioral specs.

use pilot_adapters::{FakeProcessWorld, FakeTracker, TaskTracker};
use pilot_bus::{BusPaths, MessageBus};
use pilot_core::clock::FakeClock;
use pilot_core::session::SessionRecord;
use pilot_engine::{PmEngine, PmOptions, SessionRegistry, StateTree};
use pilot_policy::Policy;
use std::sync::Arc;

pub struct Repo {
    pub dir: tempfile::TempDir,
    pub clock: FakeClock,
    pub world: FakeProcessWorld,
    pub bus: Arc<MessageBus<FakeClock>>,
    pub tracker: Arc<FakeTracker>,
}

impl Repo {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let clock = FakeClock::new();
        let world = FakeProcessWorld::new(100, 50);
        let bus = Arc::new(MessageBus::new(
            BusPaths::under_repo(dir.path()),
            clock.clone(),
        ));
        Self {
            dir,
            clock,
            world,
            bus,
            tracker: Arc::new(FakeTracker::default()),
        }
    }

    pub fn tree(&self) -> StateTree {
        StateTree::under_repo(self.dir.path())
    }

    pub fn engine(&self, policy: Policy) -> PmEngine<FakeClock, FakeProcessWorld> {
        let mut options = PmOptions::from_policy(&policy);
        options.dry_run = true;
        PmEngine::new(
            self.dir.path(),
            policy,
            options,
            self.clock.clone(),
            self.world.clone(),
            Arc::clone(&self.bus),
            Arc::clone(&self.tracker) as Arc<dyn TaskTracker>,
        )
    }

    pub fn registry(&self) -> SessionRegistry<FakeClock, FakeProcessWorld> {
        SessionRegistry::new(
            self.tree(),
            Arc::clone(&self.bus),
            self.clock.clone(),
            self.world.clone(),
            pilot_core::session::DEFAULT_LEASE_MS,
        )
    }

    /// An active session with a live PID and lock file.
    pub fn session(&self, sid: &str, pid: u32) -> SessionRecord {
        self.world.add(pid, 1);
        let record = pilot_core::test_support::session_record_at(&self.clock, sid, pid, "backend");
        let registry = self.registry();
        registry.save(&record).unwrap();
        let lock = self.tree().lock_file(sid);
        std::fs::create_dir_all(lock.parent().unwrap()).unwrap();
        std::fs::write(lock, pid.to_string()).unwrap();
        record
    }
}
