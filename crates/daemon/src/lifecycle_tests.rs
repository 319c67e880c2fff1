// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use pilot_adapters::FakeProcessWorld;

#[test]
fn config_paths_are_repo_relative() {
    let config = Config::load(Path::new("/repo"));
    assert_eq!(
        config.pid_path,
        PathBuf::from("/repo/state/orchestrator/pm-daemon.pid")
    );
    assert_eq!(config.policy_path, PathBuf::from("/repo/policy.yaml"));
    assert_eq!(
        config.bus_paths.bus_file(),
        PathBuf::from("/repo/messages/bus.jsonl")
    );
}

#[test]
fn missing_policy_file_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(dir.path());
    let policy = config.load_policy().unwrap();
    assert_eq!(policy.orchestrator.max_agents, 6);
}

#[test]
fn malformed_policy_refuses_startup() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("policy.yaml"), "orchestrator: [broken").unwrap();
    let config = Config::load(dir.path());
    assert!(matches!(
        config.load_policy(),
        Err(LifecycleError::Policy(_))
    ));
}

#[test]
fn pid_guard_acquires_and_releases() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(dir.path());
    let world = FakeProcessWorld::new(100, 50);

    let guard = PidGuard::acquire(&config, &world).unwrap();
    let written = std::fs::read_to_string(&config.pid_path).unwrap();
    assert_eq!(written.trim(), "100");

    drop(guard);
    assert!(!config.pid_path.exists());
}

#[test]
fn second_acquire_in_process_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(dir.path());
    let world = FakeProcessWorld::new(100, 50);

    let _guard = PidGuard::acquire(&config, &world).unwrap();
    assert!(matches!(
        PidGuard::acquire(&config, &world),
        Err(LifecycleError::AlreadyRunning { .. })
    ));
}

#[test]
fn stale_pid_file_is_overwritten() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(dir.path());
    std::fs::create_dir_all(config.pid_path.parent().unwrap()).unwrap();
    std::fs::write(&config.pid_path, "999999\n").unwrap();

    // 999999 is not alive in the fake world: stale, overwritten
    let world = FakeProcessWorld::new(100, 50);
    let _guard = PidGuard::acquire(&config, &world).unwrap();
    let written = std::fs::read_to_string(&config.pid_path).unwrap();
    assert_eq!(written.trim(), "100");
}

#[test]
fn live_foreign_pid_refuses_startup() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(dir.path());
    std::fs::create_dir_all(config.pid_path.parent().unwrap()).unwrap();
    std::fs::write(&config.pid_path, "777\n").unwrap();

    let world = FakeProcessWorld::new(100, 50);
    world.add(777, 1);
    let err = PidGuard::acquire(&config, &world).err().expect("refused");
    match err {
        LifecycleError::AlreadyRunning { pid } => assert_eq!(pid, 777),
        other => panic!("expected AlreadyRunning, got {other:?}"),
    }
}

#[test]
fn log_rotation_renames_once_over_cap() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("pm-daemon.log");
    std::fs::write(&log, vec![b'x'; 6 * 1024 * 1024]).unwrap();

    rotate_log_if_needed(&log);
    assert!(!log.exists());
    assert!(log.with_extension("log.1").exists());

    // Small logs stay put
    std::fs::write(&log, b"small").unwrap();
    rotate_log_if_needed(&log);
    assert!(log.exists());
}
