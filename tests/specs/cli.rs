//! Black-box CLI specs: invoke the `pilot` binary and check stdout JSON
//! and exit codes.

use assert_cmd::Command;

fn pilot() -> Command {
    Command::cargo_bin("pilot").unwrap()
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    let text = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(text.trim()).unwrap_or(serde_json::Value::Null)
}

#[test]
fn help_lists_commands() {
    let output = pilot().arg("--help").output().unwrap();
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.contains("claim-task"));
    assert!(text.contains("release-task"));
    assert!(text.contains("daemon"));
    assert!(text.contains("report"));
}

#[test]
fn daemon_status_when_not_running() {
    let dir = tempfile::tempdir().unwrap();
    let output = pilot()
        .args(["-C", dir.path().to_str().unwrap(), "daemon", "status"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value = stdout_json(&output);
    assert_eq!(value["success"], true);
    assert_eq!(value["running"], false);
}

#[test]
fn claim_then_release_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_str().unwrap();

    let output = pilot().args(["-C", root, "claim-task", "T-7"]).output().unwrap();
    assert!(output.status.success(), "claim failed: {output:?}");
    let value = stdout_json(&output);
    assert_eq!(value["success"], true);
    assert_eq!(value["task_id"], "T-7");
    let session_id = value["session_id"].as_str().unwrap().to_string();

    // The second invocation pins the session by id and releases the claim
    let output = pilot()
        .env("PILOT_SESSION_ID", &session_id)
        .args(["-C", root, "release-task"])
        .output()
        .unwrap();
    assert!(output.status.success(), "release failed: {output:?}");
    let value = stdout_json(&output);
    assert_eq!(value["success"], true);
    assert_eq!(value["session_id"], session_id.as_str());
    assert_eq!(value["released"], "T-7");
}

#[test]
fn report_without_runs_fails_operationally() {
    let dir = tempfile::tempdir().unwrap();
    let output = pilot()
        .args(["-C", dir.path().to_str().unwrap(), "report"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(1));
    let value = stdout_json(&output);
    assert_eq!(value["success"], false);
}
