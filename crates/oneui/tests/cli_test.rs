//! Integration tests for the `oneui` CLI binary.
//!
//! These tests validate argument parsing, help output, shell completions,
//! and error handling. Panel-bound commands run against a wiremock panel.
#![allow(clippy::unwrap_used)]

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Helpers ─────────────────────────────────────────────────────────

/// Build a [`Command`] for the `oneui` binary with env isolation.
///
/// Clears all `ONEUI_*` env vars and points config directories at a
/// nonexistent path so tests never touch the user's real configuration.
fn oneui_cmd() -> assert_cmd::Command {
    let mut cmd = cargo_bin_cmd!("oneui");
    cmd.env("HOME", "/tmp/oneui-cli-test-nonexistent")
        .env("XDG_CONFIG_HOME", "/tmp/oneui-cli-test-nonexistent")
        .env_remove("ONEUI_PROFILE")
        .env_remove("ONEUI_PANEL")
        .env_remove("ONEUI_TOKEN")
        .env_remove("ONEUI_OUTPUT")
        .env_remove("ONEUI_INSECURE")
        .env_remove("ONEUI_TIMEOUT")
        .env_remove("RUST_LOG");
    cmd
}

/// Concatenate stdout + stderr from a command output for flexible matching.
fn combined_output(output: &std::process::Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    format!("{stdout}{stderr}")
}

fn user_body() -> serde_json::Value {
    json!({
        "success": true,
        "data": {
            "id": "42",
            "username": "mya-01",
            "inbounds": [
                {
                    "id": 1,
                    "inboundId": 10,
                    "enabled": true,
                    "priority": 100,
                    "inbound": {
                        "id": 10,
                        "tag": "vless-reality",
                        "remark": "SG Reality",
                        "protocol": "VLESS",
                        "port": 443,
                        "network": "tcp",
                        "security": "reality"
                    }
                },
                {
                    "id": 2,
                    "inboundId": 20,
                    "enabled": true,
                    "priority": 101,
                    "inbound": {
                        "id": 20,
                        "tag": "mm-ws",
                        "remark": "Myanmar WS",
                        "protocol": "VLESS",
                        "port": 8443,
                        "network": "ws",
                        "security": "tls"
                    }
                }
            ]
        }
    })
}

async fn mock_user(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/users/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(user_body()))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/users/42/devices"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": [] })),
        )
        .mount(server)
        .await;
}

// ── Basic invocation ────────────────────────────────────────────────

#[test]
fn test_no_args_shows_help() {
    let output = oneui_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2), "Expected exit code 2");
    let text = combined_output(&output);
    assert!(text.contains("Usage"), "Expected 'Usage' in output:\n{text}");
}

#[test]
fn test_help_flag() {
    oneui_cmd().arg("--help").assert().success().stdout(
        predicate::str::contains("keys")
            .and(predicate::str::contains("devices"))
            .and(predicate::str::contains("reorder")),
    );
}

#[test]
fn test_version_flag() {
    oneui_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("oneui"));
}

#[test]
fn test_invalid_subcommand() {
    oneui_cmd().arg("frobnicate").assert().failure();
}

// ── Shell completions ───────────────────────────────────────────────

#[test]
fn test_completions_bash() {
    oneui_cmd()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}

#[test]
fn test_completions_zsh() {
    oneui_cmd()
        .args(["completions", "zsh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("#compdef"));
}

#[test]
fn test_completions_fish() {
    oneui_cmd()
        .args(["completions", "fish"])
        .assert()
        .success()
        .stdout(predicate::str::contains("complete"));
}

// ── Argument validation ─────────────────────────────────────────────

#[test]
fn test_invalid_output_format() {
    oneui_cmd()
        .args(["-o", "xml", "keys", "list", "42"])
        .assert()
        .failure();
}

#[test]
fn test_toggle_requires_direction() {
    let output = oneui_cmd()
        .args(["keys", "toggle", "42", "10"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_watch_rejects_unknown_interval() {
    oneui_cmd()
        .args(["keys", "watch", "42", "--interval", "7s"])
        .assert()
        .failure();
}

// ── Config without a file ───────────────────────────────────────────

#[test]
fn test_keys_list_without_config() {
    let output = oneui_cmd().args(["keys", "list", "42"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    let text = combined_output(&output);
    assert!(
        text.contains("No panel configured"),
        "Expected config hint in output:\n{text}"
    );
}

#[test]
fn test_missing_token_is_auth_error() {
    let output = oneui_cmd()
        .args(["--panel", "http://127.0.0.1:9", "keys", "list", "42"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn test_unknown_profile() {
    let output = oneui_cmd()
        .args(["-p", "nope", "keys", "list", "42"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(combined_output(&output).contains("nope"));
}

#[test]
fn test_config_show_without_file() {
    oneui_cmd()
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[defaults]"));
}

#[test]
fn test_config_path() {
    oneui_cmd()
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}

#[test]
fn test_profile_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let config_dir = dir.path().join("oneui");
    std::fs::create_dir_all(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("config.toml"),
        "default_profile = \"home\"\n\n[profiles.home]\npanel = \"https://vpn.example.com\"\ntoken = \"s3cret\"\n",
    )
    .unwrap();

    let output = oneui_cmd()
        .env("XDG_CONFIG_HOME", dir.path())
        .args(["config", "show"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    assert!(text.contains("[profiles.home]"));
    assert!(!text.contains("s3cret"));
}

// ── Against a mock panel ────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn test_keys_list_json() {
    let server = MockServer::start().await;
    mock_user(&server).await;

    let output = oneui_cmd()
        .args(["--panel", &server.uri(), "--token", "t", "-o", "json"])
        .args(["keys", "list", "42", "--sort", "priority", "--desc"])
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", combined_output(&output));

    let rows: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let rows = rows.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["label"], "Myanmar WS");
    assert_eq!(rows[1]["priority"], 100);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rejected_token_exits_with_auth_code() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/users/42"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let output = oneui_cmd()
        .args(["--panel", &server.uri(), "--token", "bad"])
        .args(["keys", "list", "42"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3), "{}", combined_output(&output));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unknown_inbound_is_not_found() {
    let server = MockServer::start().await;
    mock_user(&server).await;

    let output = oneui_cmd()
        .args(["--panel", &server.uri(), "--token", "t"])
        .args(["keys", "priority", "42", "99", "5"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4), "{}", combined_output(&output));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reorder_needs_yes_without_terminal() {
    let server = MockServer::start().await;
    mock_user(&server).await;
    Mock::given(method("POST"))
        .and(path("/api/users/42/inbounds/reorder-pattern"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "data": {
                "totalKeys": 2,
                "matchedKeys": 1,
                "changedKeys": 2,
                "currentTop3": [
                    { "key": "SG Reality", "priority": 100 },
                    { "key": "Myanmar WS", "priority": 101 }
                ],
                "newTop3": [
                    { "key": "Myanmar WS", "priority": 100 },
                    { "key": "SG Reality", "priority": 101 }
                ]
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let output = oneui_cmd()
        .args(["--panel", &server.uri(), "--token", "t"])
        .args(["reorder", "pattern", "42"])
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2), "{}", combined_output(&output));
    assert!(combined_output(&output).contains("requires confirmation"));
}
