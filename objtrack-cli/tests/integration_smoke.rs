//! Smoke tests for the objtrack driver. None of these need a database.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;
use tempfile::{NamedTempFile, TempDir};

/// Command with store settings stripped and a scratch working directory
/// (so no stray `.env` is picked up).
fn objtrack(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("objtrack").unwrap();
    cmd.current_dir(dir.path());
    for key in [
        "DATABASE_URL",
        "OBJTRACK_DATABASE_URL",
        "OBJTRACK_DB_HOST",
        "OBJTRACK_DB_USER",
        "OBJTRACK_DB_PASSWORD",
        "OBJTRACK_DEADLINE_MS",
        "RUST_LOG",
    ] {
        cmd.env_remove(key);
    }
    cmd
}

fn event_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    objtrack(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("invoke"))
        .stdout(predicate::str::contains("replay"))
        .stdout(predicate::str::contains("migrate"));
}

#[test]
fn test_invoke_help() {
    let dir = TempDir::new().unwrap();
    objtrack(&dir)
        .args(["invoke", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Notification batch JSON file"));
}

#[test]
fn test_invoke_rejects_batch_without_records() {
    let dir = TempDir::new().unwrap();
    let event = event_file(r#"{"detail": {"object": {"key": "a"}}}"#);

    objtrack(&dir)
        .args(["invoke", "--event"])
        .arg(event.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("unusable notification batch"));
}

#[test]
fn test_invoke_reads_stdin_and_requires_store_config() {
    let dir = TempDir::new().unwrap();

    objtrack(&dir)
        .arg("invoke")
        .write_stdin(r#"{"Records": [{"s3": {"bucket": {"name": "b1"}, "object": {"key": "x"}}}]}"#)
        .assert()
        .failure()
        .stderr(predicate::str::contains("OBJTRACK_DB_HOST"));
}

#[test]
fn test_unreachable_store_still_returns_success_envelope() {
    let dir = TempDir::new().unwrap();
    let event = event_file(
        r#"{"Records": [
            {"s3": {"bucket": {"name": "b1"}, "object": {"key": "x"}}},
            {"s3": {"bucket": {"name": "b1"}}}
        ]}"#,
    );

    objtrack(&dir)
        .env(
            "OBJTRACK_DATABASE_URL",
            "postgres://objtrack@127.0.0.1:1/objecttracking",
        )
        .env("OBJTRACK_ACQUIRE_TIMEOUT_MS", "300")
        .args(["invoke", "--event"])
        .arg(event.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""statusCode":200"#))
        .stdout(predicate::str::contains("0 written, 1 failed, 1 skipped"));
}

#[test]
fn test_replay_prints_one_envelope_per_usable_batch_in_order() {
    let dir = TempDir::new().unwrap();
    let stream = event_file(concat!(
        r#"{"Records": [{"s3": {"bucket": {"name": "b1"}, "object": {"key": "first"}}}]}"#,
        "\n",
        "\n",
        r#"{"detail": {"object": {"key": "not-a-batch"}}}"#,
        "\n",
        "{truncated\n",
        r#"{"Records": [{"s3": {"bucket": {"name": "b1"}, "object": {"key": "second"}}}, {"s3": {}}]}"#,
        "\n",
        r#"{"Records": []}"#,
        "\n",
    ));

    let output = objtrack(&dir)
        .env(
            "OBJTRACK_DATABASE_URL",
            "postgres://objtrack@127.0.0.1:1/objecttracking",
        )
        .env("OBJTRACK_ACQUIRE_TIMEOUT_MS", "300")
        .args(["replay", "--parallel", "3", "--input"])
        .arg(stream.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("skipping unusable batch"))
        .get_output()
        .stdout
        .clone();

    let results: Vec<serde_json::Value> = String::from_utf8(output)
        .unwrap()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let bodies: Vec<&str> = results.iter().map(|r| r["body"].as_str().unwrap()).collect();

    assert!(results.iter().all(|r| r["statusCode"] == 200));
    assert_eq!(
        bodies,
        [
            r#""Object keys processed: 0 written, 1 failed, 0 skipped""#,
            r#""Object keys processed: 0 written, 1 failed, 1 skipped""#,
            r#""Object keys processed: 0 written, 0 failed, 0 skipped""#,
        ]
    );
}

#[test]
fn test_replay_reads_stdin() {
    let dir = TempDir::new().unwrap();

    objtrack(&dir)
        .env(
            "OBJTRACK_DATABASE_URL",
            "postgres://objtrack@127.0.0.1:1/objecttracking",
        )
        .args(["replay", "--input", "-"])
        .write_stdin("{\"Records\": []}\n\n")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""statusCode":200"#))
        .stdout(predicate::str::contains("0 written, 0 failed, 0 skipped"));
}
