//! Integration tests for the plur-sweep daemon

use assert_cmd::Command;
use chrono::{Duration, Utc};
use predicates::prelude::*;
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;

/// Setup test environment with an archive export and a config pointing at it
fn setup_test_env(prune_section: &str) -> (TempDir, String, String) {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    let archive_path = temp_dir.path().join("mastodon.json");

    let posts: Vec<Value> = [("fresh", 1), ("old", 100), ("older", 200)]
        .iter()
        .map(|(id, days)| {
            json!({
                "id": id,
                "author": "alice",
                "created_at": (Utc::now() - Duration::days(*days)).to_rfc3339(),
                "kind": "original",
            })
        })
        .collect();
    fs::write(&archive_path, json!({ "posts": posts }).to_string()).unwrap();

    let config_content = format!(
        r#"
[prune]
{}

[[platforms]]
name = "mastodon"
kind = "archive"
path = "{}"

[[platforms]]
name = "smoke"
kind = "mock"

[[platforms]]
name = "retired"
kind = "mock"
enabled = false
"#,
        prune_section,
        archive_path.display().to_string().replace('\\', "/")
    );
    fs::write(&config_path, config_content).unwrap();

    (
        temp_dir,
        config_path.to_str().unwrap().to_string(),
        archive_path.to_str().unwrap().to_string(),
    )
}

fn summaries(stdout: &[u8]) -> Vec<Value> {
    String::from_utf8(stdout.to_vec())
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn find<'a>(summaries: &'a [Value], platform: &str) -> &'a Value {
    summaries
        .iter()
        .find(|s| s["run"]["platform"] == platform)
        .unwrap()
}

#[test]
fn test_help_flag() {
    Command::cargo_bin("plur-sweep")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--once"))
        .stdout(predicate::str::contains("--bind"));
}

#[test]
fn test_once_dry_run_reports_every_enabled_platform() {
    let (_temp_dir, config_path, archive_path) =
        setup_test_env("max_age = \"30d\"\ndelay = \"0s\"\ndrain = true");
    let before = fs::read_to_string(&archive_path).unwrap();

    let output = Command::cargo_bin("plur-sweep")
        .unwrap()
        .args(["--config", &config_path, "--once", "--dry-run"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let summaries = summaries(&output.stdout);
    assert_eq!(summaries.len(), 2);

    let mastodon = find(&summaries, "mastodon");
    assert_eq!(mastodon["run"]["dry_run"], true);
    assert_eq!(mastodon["totals"]["to_delete"], 2);
    assert_eq!(mastodon["totals"]["deleted"], 0);

    let smoke = find(&summaries, "smoke");
    assert_eq!(smoke["run"]["termination"], "exhausted");

    assert_eq!(fs::read_to_string(&archive_path).unwrap(), before);
}

#[test]
fn test_once_live_run_rewrites_archive() {
    let (_temp_dir, config_path, archive_path) =
        setup_test_env("max_age = \"30d\"\ndelay = \"0s\"\ndrain = true");

    let output = Command::cargo_bin("plur-sweep")
        .unwrap()
        .args(["--config", &config_path, "--once"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let summaries = summaries(&output.stdout);
    assert_eq!(find(&summaries, "mastodon")["totals"]["deleted"], 2);

    let remaining = fs::read_to_string(&archive_path).unwrap();
    assert!(remaining.contains("\"fresh\""));
    assert!(!remaining.contains("\"older\""));
}

#[test]
fn test_config_from_env_var() {
    let (_temp_dir, config_path, _archive_path) =
        setup_test_env("before = \"2000-01-01\"\ndelay = \"0s\"");

    Command::cargo_bin("plur-sweep")
        .unwrap()
        .env("PLURPRUNE_CONFIG", &config_path)
        .args(["--once"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"platform\":\"mastodon\""));
}

#[test]
fn test_missing_threshold_exits_3() {
    let (_temp_dir, config_path, _archive_path) = setup_test_env("unlike = true");

    Command::cargo_bin("plur-sweep")
        .unwrap()
        .args(["--config", &config_path, "--once"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("No pruning threshold"));
}

#[test]
fn test_unknown_kind_exits_3() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        "[prune]\nmax_age = \"30d\"\n\n[[platforms]]\nname = \"space\"\nkind = \"myspace\"\n",
    )
    .unwrap();

    Command::cargo_bin("plur-sweep")
        .unwrap()
        .args(["--config", config_path.to_str().unwrap(), "--once"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Unknown platform kind 'myspace'"));
}

#[test]
fn test_no_enabled_platforms_exits_3() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "[prune]\nmax_age = \"30d\"\n").unwrap();

    Command::cargo_bin("plur-sweep")
        .unwrap()
        .args(["--config", config_path.to_str().unwrap(), "--once"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("no enabled platforms"));
}

#[test]
fn test_missing_config_file_exits_3() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("absent.toml");

    Command::cargo_bin("plur-sweep")
        .unwrap()
        .args(["--config", config_path.to_str().unwrap(), "--once"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Failed to read config file"));
}
