//! Command-line behaviour of the `bft` binary.

use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn bft(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("bft").unwrap();
    cmd.env_remove("BFT_OVERLAY")
        .env_remove("BFT_DEBUG")
        .env("RUST_LOG", "warn")
        .arg("--scratch-dir")
        .arg(dir.join("scratch"));
    cmd
}

fn write_inventory(dir: &TempDir, body: &str) -> std::path::PathBuf {
    let path = dir.path().join("inventory.json");
    std::fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_help() {
    let dir = TempDir::new().unwrap();
    bft(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Boardfarm test harness"));
}

#[test]
fn test_inventory_is_required() {
    let dir = TempDir::new().unwrap();
    bft(dir.path()).assert().code(2);
}

#[test]
fn test_malformed_inventory() {
    let dir = TempDir::new().unwrap();
    let inventory = write_inventory(&dir, "{\"devices\": [");
    bft(dir.path())
        .arg("--inventory")
        .arg(&inventory)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Malformed inventory"));
}

#[test]
fn test_unknown_device_type() {
    let dir = TempDir::new().unwrap();
    let inventory = write_inventory(
        &dir,
        r#"{"devices": [{"name": "x", "type": "acme_widget", "connection_type": "ssh", "ipaddr": "10.0.0.9"}]}"#,
    );
    bft(dir.path())
        .arg("-i")
        .arg(&inventory)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("acme_widget"));
}

#[test]
fn test_overlay_alias() {
    let dir = TempDir::new().unwrap();
    let overlay = dir.path().join("overlay.json");
    std::fs::write(&overlay, r#"{"aliases": {"lab_lan": "bf_lan"}}"#).unwrap();
    let inventory = write_inventory(
        &dir,
        r#"{"devices": [{"name": "lan", "type": "lab_lan", "connection_type": "local_cmd",
            "conn_cmd": ["env", "PS1=lan$ ", "bash", "--norc", "--noprofile", "--noediting"]}]}"#,
    );
    bft(dir.path())
        .arg("-i")
        .arg(&inventory)
        .arg("--skip-contingency-checks")
        .arg("console_echo")
        .env("BFT_OVERLAY", &overlay)
        .assert()
        .success()
        .stdout(predicate::str::contains("sanity::console_echo"));
}

#[test]
fn test_local_lan_console_echo() {
    let dir = TempDir::new().unwrap();
    let logs = dir.path().join("logs");
    let inventory = write_inventory(
        &dir,
        r#"{"devices": [{"name": "lan", "type": "bf_lan", "connection_type": "local_cmd",
            "conn_cmd": ["env", "PS1=lan$ ", "bash", "--norc", "--noprofile", "--noediting"]}]}"#,
    );
    bft(dir.path())
        .arg("-i")
        .arg(&inventory)
        .arg("--skip-contingency-checks")
        .arg("--save-console-logs")
        .arg(&logs)
        .arg("console_echo")
        .assert()
        .success()
        .stdout(predicate::str::contains("PASSED"))
        .stdout(predicate::str::contains("1/1 passed"));

    let transcript = std::fs::read_to_string(logs.join("lan.console.log")).unwrap();
    assert!(transcript.contains("bft-echo"));
}

#[test]
fn test_unknown_test_name() {
    let dir = TempDir::new().unwrap();
    let inventory = write_inventory(&dir, r#"{"devices": []}"#);
    bft(dir.path())
        .arg("-i")
        .arg(&inventory)
        .arg("no_such_test")
        .assert()
        .code(2);
}
