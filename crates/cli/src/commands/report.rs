// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `pilot report [--run <id>]`

use anyhow::Result;
use pilot_engine::StateTree;
use std::path::Path;

pub fn run(repo_root: &Path, run_id: Option<&str>) -> Result<bool> {
    let tree = StateTree::under_repo(repo_root);
    let reports_dir = tree.overnight_dir().join("reports");

    let path = match run_id {
        Some(run_id) => tree.overnight_report_file(run_id),
        None => match latest_report(&reports_dir) {
            Some(path) => path,
            None => {
                println!(
                    "{}",
                    serde_json::json!({ "success": false, "error": "no reports" })
                );
                return Ok(false);
            }
        },
    };

    match std::fs::read_to_string(&path) {
        Ok(text) => {
            let report: serde_json::Value = serde_json::from_str(&text)?;
            println!(
                "{}",
                serde_json::json!({ "success": true, "report": report })
            );
            Ok(true)
        }
        Err(_) => {
            println!(
                "{}",
                serde_json::json!({
                    "success": false,
                    "error": format!("no report at {}", path.display()),
                })
            );
            Ok(false)
        }
    }
}

/// Most recently modified report file.
fn latest_report(dir: &Path) -> Option<std::path::PathBuf> {
    let entries = std::fs::read_dir(dir).ok()?;
    entries
        .flatten()
        .filter(|e| e.path().extension().and_then(|s| s.to_str()) == Some("json"))
        .max_by_key(|e| {
            e.metadata()
                .and_then(|m| m.modified())
                .unwrap_or(std::time::UNIX_EPOCH)
        })
        .map(|e| e.path())
}
