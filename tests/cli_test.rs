//! CLI integration tests
//!
//! Tests for the command-line interface using assert_cmd.
//!
//! These tests verify:
//! - Help and version flags
//! - Configuration validation
//! - Single-tick mode against a fake server
//! - Error handling for missing files

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread;
use tempfile::NamedTempFile;

/// Get a command for the redis-info-collector binary
#[allow(deprecated)]
fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("redis-info-collector")
        .expect("Failed to find redis-info-collector binary");
    cmd.env_remove("REDIS_INFO_CONFIG")
        .env_remove("REDIS_INFO_INTERVAL")
        .env_remove("REDIS_INFO_HOSTNAME")
        .env_remove("REDIS_INFO_SINK_URL")
        .env_remove("RUST_LOG");
    cmd
}

/// Helper to create a temporary config file with given content
fn create_temp_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(content.as_bytes())
        .expect("Failed to write config");
    file.flush().expect("Failed to flush");
    file
}

#[test]
fn test_help_flag() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"))
        .stdout(predicate::str::contains("--config"))
        .stdout(predicate::str::contains("--once"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_validate_valid_config() {
    let config = r#"
interval_secs: 30
hostname: cache-01
plugin:
  - key: Verbose
    values: [true]
  - key: Node
    values: [primary]
    children:
      - { key: Host, values: [10.0.0.5] }
      - { key: Port, values: [6380] }
      - { key: Keys, values: ["used_memory:bytes", "total_commands_processed:counter:commands"] }
      - { key: Dbs, values: [0, db1] }
"#;
    let file = create_temp_config(config);

    cmd()
        .arg("--config")
        .arg(file.path())
        .arg("--validate")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("primary (10.0.0.5:6380)"));
}

#[test]
fn test_validate_json_output() {
    let config = r#"
plugin:
  - key: Node
    values: [legacy]
"#;
    let file = create_temp_config(config);

    let output = cmd()
        .arg("-c")
        .arg(file.path())
        .arg("--validate")
        .arg("--output-format")
        .arg("json")
        .output()
        .expect("Failed to run binary");

    assert!(output.status.success());
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(report["valid"], true);
    assert_eq!(report["nodes"][0]["name"], "legacy");
    assert_eq!(report["nodes"][0]["selection"], "builtin");
}

#[test]
fn test_validate_missing_file() {
    cmd()
        .arg("--config")
        .arg("/nonexistent/redis-info.yaml")
        .arg("--validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load"));
}

#[test]
fn test_validate_invalid_yaml() {
    let file = create_temp_config("plugin: [unclosed");

    cmd()
        .arg("--config")
        .arg(file.path())
        .arg("--validate")
        .assert()
        .failure();
}

#[test]
fn test_validate_rejects_zero_interval_override() {
    let file = create_temp_config("plugin: []\n");

    cmd()
        .arg("--config")
        .arg(file.path())
        .arg("--interval")
        .arg("0")
        .arg("--validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("interval_secs"));
}

#[test]
fn test_validate_rejects_bad_port() {
    let config = r#"
plugin:
  - key: Node
    values: [primary]
    children:
      - { key: Port, values: [70000] }
"#;
    let file = create_temp_config(config);

    cmd()
        .arg("--config")
        .arg(file.path())
        .arg("--validate")
        .assert()
        .failure();
}

#[test]
fn test_validate_http_sink_requires_url() {
    let config = r#"
sink:
  kind: http
plugin: []
"#;
    let file = create_temp_config(config);

    cmd()
        .arg("--config")
        .arg(file.path())
        .arg("--validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("sink.url"));
}

#[test]
fn test_once_without_nodes_emits_nothing() {
    let file = create_temp_config("plugin: []\n");

    cmd()
        .arg("--config")
        .arg(file.path())
        .arg("--once")
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
}

/// Serve a single INFO reply on a local port
fn fake_server(report: &'static str) -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").expect("Failed to bind");
    let port = listener.local_addr().expect("No local addr").port();

    thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut buf = [0u8; 64];
            let _ = stream.read(&mut buf);
            let reply = format!("${}\r\n{}\r\n", report.len(), report);
            let _ = stream.write_all(reply.as_bytes());
        }
    });

    port
}

#[test]
fn test_once_writes_putval_lines() {
    let port = fake_server(
        "# Server\r\nuptime_in_seconds:120\r\nused_memory:2048\r\ndb0:keys=7,expires=1\r\n",
    );
    let config = format!(
        r#"
hostname: cache-01
interval_secs: 15
plugin:
  - key: Node
    values: [primary]
    children:
      - {{ key: Host, values: [127.0.0.1] }}
      - {{ key: Port, values: [{port}] }}
      - {{ key: Keys, values: ["uptime_in_seconds", "used_memory:bytes"] }}
      - {{ key: Dbs, values: [0] }}
"#
    );
    let file = create_temp_config(&config);

    cmd()
        .arg("--config")
        .arg(file.path())
        .arg("--once")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            r#"PUTVAL "cache-01/redis_info-primary/gauge-uptime_in_seconds" interval=15 N:120"#,
        ))
        .stdout(predicate::str::contains(
            r#"PUTVAL "cache-01/redis_info-primary/bytes-used_memory" interval=15 N:2048"#,
        ))
        .stdout(predicate::str::contains("gauge-db0-expires\" interval=15 N:1"))
        .stdout(predicate::str::contains("gauge-db0-keys\" interval=15 N:7"));
}
