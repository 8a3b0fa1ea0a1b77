//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run against the development data
//! directory and verify outputs.

use std::process::Command;

/// Run a CLI command and return (exit code, stdout, stderr).
fn run_cli(args: &[&str]) -> (i32, String, String) {
    let output = Command::new("cargo")
        .args(["run", "-q", "-p", "huddle-cli", "--"])
        .args(args)
        .env("HUDDLE_ENV", "dev")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (code, stdout, stderr)
}

#[test]
fn test_help_lists_commands() {
    let (code, stdout, _) = run_cli(&["--help"]);
    assert_eq!(code, 0);
    for command in ["plan", "show", "cancel", "review", "team", "config"] {
        assert!(stdout.contains(command), "help is missing '{command}'");
    }
}

#[test]
fn test_config_path_uses_dev_dir() {
    let (code, stdout, _) = run_cli(&["config", "path"]);
    assert_eq!(code, 0, "config path failed");
    assert!(stdout.contains("huddle-dev"));
    assert!(stdout.trim_end().ends_with("huddles.toml"));
}

#[test]
fn test_config_check_accepts_defaults() {
    let (code, stdout, stderr) = run_cli(&["config", "check"]);
    assert_eq!(code, 0, "config check failed: {stderr}");
    assert!(stdout.contains(": ok"));
}

#[test]
fn test_show_rejects_bad_date() {
    let (code, _, stderr) = run_cli(&["show", "--team", "Community Care", "--date", "not-a-date"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("error:"));
}

#[test]
fn test_dry_run_plan_prints_json() {
    let (code, _, stderr) = run_cli(&["team", "create", "Community Care"]);
    assert_eq!(code, 0, "team create failed: {stderr}");

    let (code, stdout, stderr) = run_cli(&["plan", "--team", "Community Care", "--dry-run"]);
    assert_eq!(code, 0, "plan failed: {stderr}");
    let parsed: serde_json::Value = serde_json::from_str(&stdout).expect("plan output is JSON");
    let teams = parsed.as_array().expect("one entry per team");
    assert_eq!(teams.len(), 1);
    assert_eq!(teams[0]["team"], "Community Care");
    assert!(teams[0]["meetings"].as_array().is_some_and(|m| !m.is_empty()));
}
