//! Basic CLI E2E tests.
//!
//! Tests invoke the built `followup` binary against a throwaway data
//! directory and verify its JSON output.

use std::path::Path;
use std::process::Command;

use serde_json::Value;

// 2026-06-10 is a Wednesday.
const WED_10: &str = "2026-06-10T10:00:00Z";

/// Run a CLI command and return (exit code, stdout, stderr).
fn run_cli(data_dir: &Path, args: &[&str]) -> (i32, String, String) {
    let output = Command::new(env!("CARGO_BIN_EXE_followup"))
        .args(["--user", "u1"])
        .args(args)
        .env("FOLLOWUP_DATA_DIR", data_dir)
        .env_remove("FOLLOWUP_LOG")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (code, stdout, stderr)
}

fn run_json(data_dir: &Path, args: &[&str]) -> Value {
    let (code, stdout, stderr) = run_cli(data_dir, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("{args:?} printed invalid JSON ({e}): {stdout}"))
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn test_config_list_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let config = run_json(dir.path(), &["config", "list"]);
    assert_eq!(config["engine"]["default_timezone"], "UTC");
    assert!(dir.path().join("config.toml").exists());
}

#[test]
fn test_config_set_then_get() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, _) = run_cli(dir.path(), &["config", "set", "engine.inactivity_days", "5"]);
    assert_eq!(code, 0);
    let (code, stdout, _) = run_cli(dir.path(), &["config", "get", "engine.inactivity_days"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "5");
}

#[test]
fn test_config_unknown_key_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run_cli(dir.path(), &["config", "get", "no.such.key"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("error:"));
}

// ============================================================================
// Reminders
// ============================================================================

#[test]
fn test_reminder_add_list_fire() {
    let dir = tempfile::tempdir().unwrap();
    let added = run_json(
        dir.path(),
        &["--now", WED_10, "reminder", "add", "Call Ana", "--at", WED_10, "--contact", "ana"],
    );
    let id = added["reminder"]["id"].as_str().unwrap().to_string();
    assert_eq!(added["conflicts"]["should_bundle"], false);

    let listed = run_json(dir.path(), &["reminder", "list", "--status", "pending"]);
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let fired = run_json(dir.path(), &["--now", WED_10, "reminder", "fire", &id]);
    assert_eq!(fired["outcome"], "delivered");

    let again = run_json(dir.path(), &["--now", WED_10, "reminder", "fire", &id]);
    assert_eq!(again["outcome"], "skipped");
}

#[test]
fn test_reminder_in_quiet_hours_is_suppressed() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, _) = run_cli(dir.path(), &["prefs", "set", "schedule.quiet_hours_start", "09:30:00"]);
    assert_eq!(code, 0);
    let (code, _, _) = run_cli(dir.path(), &["prefs", "set", "schedule.quiet_hours_end", "11:00:00"]);
    assert_eq!(code, 0);

    let added = run_json(dir.path(), &["--now", WED_10, "reminder", "add", "Ping", "--at", WED_10]);
    let id = added["reminder"]["id"].as_str().unwrap().to_string();
    let fired = run_json(dir.path(), &["--now", WED_10, "reminder", "fire", &id]);
    assert_eq!(fired["outcome"], "suppressed");
    assert_eq!(fired["reason"], "quiet_hours");
    assert_eq!(fired["next_attempt_time"], "2026-06-10T11:00:00Z");
}

#[test]
fn test_reminder_snooze_uses_suggestion_when_minutes_omitted() {
    let dir = tempfile::tempdir().unwrap();
    let added = run_json(dir.path(), &["--now", WED_10, "reminder", "add", "Ping", "--at", WED_10]);
    let id = added["reminder"]["id"].as_str().unwrap().to_string();

    let snoozed = run_json(dir.path(), &["--now", WED_10, "reminder", "snooze", &id]);
    assert_eq!(snoozed["minutes"], 10);
    assert_eq!(snoozed["reason"], "smart_suggestion");

    let history = run_json(dir.path(), &["--now", WED_10, "snooze", "history"]);
    assert_eq!(history.as_array().unwrap().len(), 1);
}

// ============================================================================
// Events and popups
// ============================================================================

#[test]
fn test_event_popup_action_flow() {
    let dir = tempfile::tempdir().unwrap();
    let ingested = run_json(
        dir.path(),
        &[
            "--now",
            WED_10,
            "event",
            "emit",
            "follow_up_required",
            "--data",
            r#"{"contact_id":"ana","contact_name":"Ana"}"#,
        ],
    );
    assert_eq!(ingested["popups"].as_array().unwrap().len(), 1);

    let shown = run_json(dir.path(), &["--now", WED_10, "popup", "next"]);
    assert_eq!(shown["transitioned"], true);
    assert_eq!(shown["popup"]["title"], "Follow up with Ana");
    let popup_id = shown["popup"]["id"].as_str().unwrap().to_string();

    let outcome = run_json(
        dir.path(),
        &["--now", WED_10, "popup", "act", &popup_id, "follow-up-now"],
    );
    assert_eq!(outcome["status"], "acted");
    assert_eq!(outcome["action_url"], "/contacts/ana");

    let empty = run_json(dir.path(), &["--now", WED_10, "popup", "next"]);
    assert!(empty.is_null());
}

#[test]
fn test_unknown_popup_action_fails() {
    let dir = tempfile::tempdir().unwrap();
    run_json(
        dir.path(),
        &["--now", WED_10, "event", "emit", "streak_achieved", "--data", r#"{"streak_days":3}"#],
    );
    let shown = run_json(dir.path(), &["--now", WED_10, "popup", "next"]);
    let popup_id = shown["popup"]["id"].as_str().unwrap().to_string();

    let (code, _, stderr) = run_cli(dir.path(), &["--now", WED_10, "popup", "act", &popup_id, "EXPLODE"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("error:"));
}

#[test]
fn test_event_with_missing_field_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, _) = run_cli(dir.path(), &["event", "emit", "reminder_completed"]);
    assert_ne!(code, 0);
}

// ============================================================================
// Rules and sweeps
// ============================================================================

#[test]
fn test_rule_add_validates_template() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, _) = run_cli(dir.path(), &["rule", "add", "reminder_overdue", "no_such_template"]);
    assert_ne!(code, 0);

    let rule = run_json(
        dir.path(),
        &["rule", "add", "reminder_overdue", "overdue", "--conditions", r#"[{"type":"has_reminder"}]"#],
    );
    assert_eq!(rule["priority"], 5);
    let rules = run_json(dir.path(), &["rule", "list"]);
    assert_eq!(rules.as_array().unwrap().len(), 1);
}

#[test]
fn test_overdue_sweep_flags_once() {
    let dir = tempfile::tempdir().unwrap();
    let added = run_json(
        dir.path(),
        &["--now", "2026-06-10T08:00:00Z", "reminder", "add", "Ping", "--at", "2026-06-10T09:00:00Z"],
    );
    let id = added["reminder"]["id"].as_str().unwrap().to_string();

    let first = run_json(dir.path(), &["--now", WED_10, "sweep", "overdue"]);
    assert_eq!(first["flagged"], serde_json::json!([id]));
    let second = run_json(dir.path(), &["--now", WED_10, "sweep", "overdue"]);
    assert_eq!(second["skipped"], 1);
}
