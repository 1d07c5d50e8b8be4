//! CLI smoke tests against the built `qtel` binary.

mod common;

use std::fs;

use serde_json::Value;

fn json_line(stdout: &str) -> Value {
    let line = stdout.lines().last().unwrap_or_default();
    serde_json::from_str(line).unwrap_or_else(|e| panic!("bad JSON {line:?}: {e}"))
}

fn sample_log() -> String {
    [
        "truncated\n".to_string(),
        common::trace_entry("2024/01/01", "00:00:00", "5.000", "SELECT * FROM books"),
        common::trace_entry("2024/01/01", "00:00:01", "20.000", "INSERT INTO books VALUES (1)"),
        "2024/01/01 00:00:02 file.go:10 [15.000ms] [rows:1] SELECT * FROM books\n".to_string(),
        "2024/01/01 00:00:03 repo.rs:9 record not found\n[1.000ms] [rows:0] SELECT * FROM books\n"
            .to_string(),
    ]
    .concat()
}

#[test]
fn help_command_prints_usage() {
    let dir = tempfile::tempdir().unwrap();
    let result = common::run_cli_case("help_command_prints_usage", dir.path(), &["--help"]);
    assert!(
        result.status.success(),
        "expected success; log: {}",
        result.log_path.display()
    );
    assert!(
        result.stdout.contains("Usage: qtel [OPTIONS] <COMMAND>"),
        "missing help banner; log: {}",
        result.log_path.display()
    );
}

#[test]
fn subcommand_help_flags_work() {
    let dir = tempfile::tempdir().unwrap();
    for sub in ["ingest", "list", "by-op", "page", "summary", "config"] {
        let result = common::run_cli_case(&format!("help_{sub}"), dir.path(), &[sub, "--help"]);
        assert!(
            result.status.success(),
            "{sub} --help failed; log: {}",
            result.log_path.display()
        );
    }
}

#[test]
fn ingest_then_query_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("trace.log");
    fs::write(&log, sample_log()).unwrap();

    let ingest = common::run_cli_case(
        "ingest_then_query_ingest",
        dir.path(),
        &["ingest", log.to_str().unwrap()],
    );
    assert!(ingest.status.success(), "log: {}", ingest.log_path.display());
    let report = json_line(&ingest.stdout);
    assert_eq!(report["stored"], 4, "log: {}", ingest.log_path.display());
    assert_eq!(report["malformed"], 1);

    let list = common::run_cli_case("ingest_then_query_list", dir.path(), &["list"]);
    assert!(list.status.success(), "log: {}", list.log_path.display());
    let listed = json_line(&list.stdout);
    let durations: Vec<f64> = listed["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["duration_ms"].as_f64().unwrap())
        .collect();
    assert_eq!(durations, vec![20.0, 15.0, 5.0, 0.0]);

    let by_op = common::run_cli_case("ingest_then_query_by_op", dir.path(), &["by-op", "select"]);
    assert!(by_op.status.success(), "log: {}", by_op.log_path.display());
    let rows = json_line(&by_op.stdout)["data"].as_array().unwrap().clone();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r["operation"] == "SELECT"));

    let page = common::run_cli_case(
        "ingest_then_query_page",
        dir.path(),
        &["page", "--page", "0", "--page-size", "3"],
    );
    let paged = json_line(&page.stdout);
    assert_eq!(paged["page"], 1);
    assert_eq!(paged["data"].as_array().unwrap().len(), 3);
}

#[test]
fn ingest_reads_stdin() {
    let dir = tempfile::tempdir().unwrap();
    let result = common::run_cli_case_with_stdin(
        "ingest_reads_stdin",
        dir.path(),
        &["ingest", "-"],
        Some(&sample_log()),
    );
    assert!(result.status.success(), "log: {}", result.log_path.display());
    assert_eq!(json_line(&result.stdout)["stored"], 4);
}

#[test]
fn missing_input_file_is_user_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.log");
    let result = common::run_cli_case(
        "missing_input_file_is_user_error",
        dir.path(),
        &["ingest", missing.to_str().unwrap()],
    );
    assert_eq!(result.status.code(), Some(1), "log: {}", result.log_path.display());
    assert!(result.stderr.contains("qtel:"));
}

#[test]
fn explicit_missing_config_is_user_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");
    let result = common::run_cli_case(
        "explicit_missing_config_is_user_error",
        dir.path(),
        &["--config", missing.to_str().unwrap(), "list"],
    );
    assert_eq!(result.status.code(), Some(1), "log: {}", result.log_path.display());
}

#[test]
fn config_show_reports_env_override() {
    let dir = tempfile::tempdir().unwrap();
    let result = common::run_cli_case("config_show_reports_env_override", dir.path(), &["config", "show"]);
    assert!(result.status.success(), "log: {}", result.log_path.display());
    let shown = json_line(&result.stdout);
    let db = shown["config"]["paths"]["sqlite_db"].as_str().unwrap();
    assert!(db.ends_with("telemetry.sqlite3"));
    assert!(db.starts_with(dir.path().to_str().unwrap()));
    assert_eq!(shown["config"]["query"]["max_page_size"], 100);
}

#[test]
fn empty_database_lists_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let result = common::run_cli_case("empty_database_lists_nothing", dir.path(), &["list", "--asc"]);
    assert!(result.status.success(), "log: {}", result.log_path.display());
    let listed = json_line(&result.stdout);
    assert_eq!(listed["order"], "asc");
    assert!(listed["data"].as_array().unwrap().is_empty());
}
