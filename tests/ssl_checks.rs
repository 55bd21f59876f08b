#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::sync::atomic::{AtomicU64, Ordering};

const FAKE_OPENSSL: &str = r#"#!/bin/sh
case "$1" in
  s_client)
    case "$3" in
      down.example:*)
        echo "connect:errno=111" >&2
        exit 1
        ;;
    esac
    echo "CONNECTED(00000003)"
    echo "-----BEGIN CERTIFICATE-----"
    echo "$3"
    echo "-----END CERTIFICATE-----"
    ;;
  x509)
    input=$(cat)
    case "$input" in
      *old.example*) echo "notAfter=Jan  1 00:00:00 2001 GMT" ;;
      *) echo "notAfter=Jan  1 00:00:00 2199 GMT" ;;
    esac
    ;;
esac
exit 0
"#;

const FAKE_AWS_TRIPWIRE: &str = r#"#!/bin/sh
touch "$SHADOWEYE_TEST_DIR/aws-called"
exit 1
"#;

fn make_temp_dir() -> PathBuf {
    static DIR_SEQ: AtomicU64 = AtomicU64::new(0);

    let temp = std::env::temp_dir();
    let seq = DIR_SEQ.fetch_add(1, Ordering::Relaxed);
    let uniq = format!("shadoweye-ssl-test-{}-{seq}", std::process::id());
    let dir = temp.join(uniq);
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create dir");
    dir
}

fn write_file(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("mkdirs");
    }
    std::fs::write(path, bytes).expect("write");
}

fn write_script(dir: &Path, name: &str, script: &str) {
    let path = dir.join(name);
    write_file(&path, script.as_bytes());
    let mut perms = std::fs::metadata(&path).expect("metadata").permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).expect("chmod");
}

fn setup() -> PathBuf {
    let dir = make_temp_dir();
    let bin = dir.join("bin");
    write_script(&bin, "openssl", FAKE_OPENSSL);
    write_script(&bin, "aws", FAKE_AWS_TRIPWIRE);
    write_file(
        &dir.join("config.toml"),
        br#"
[ssl]
hosts = ["good.example", "down.example", "old.example:8443"]
"#,
    );
    dir
}

fn run(dir: &Path, args: &[&str]) -> Output {
    let path = format!(
        "{}:{}",
        dir.join("bin").display(),
        std::env::var("PATH").unwrap_or_default()
    );
    Command::new(env!("CARGO_BIN_EXE_shadoweye"))
        .current_dir(dir)
        .env("PATH", path)
        .env("SHADOWEYE_TEST_DIR", dir)
        .env_remove("SHADOWEYE_CONFIG")
        .env_remove("SHADOWEYE_SSL_HOSTS")
        .env_remove("SHADOWEYE_AWS_LOG_BUCKET")
        .env_remove("SHADOWEYE_EMAIL_ENABLED")
        .env_remove("SHADOWEYE_LOG")
        .args(args)
        .output()
        .expect("run shadoweye")
}

#[test]
fn default_run_checks_certificates_only() {
    let dir = setup();
    let out = run(&dir, &[]);
    assert!(
        out.status.success(),
        "stderr={}",
        String::from_utf8_lossy(&out.stderr)
    );

    let stdout = String::from_utf8_lossy(&out.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 3, "stdout={stdout}");

    assert!(lines[0].starts_with("✅ [SSL] SSL certificate OK, "), "{}", lines[0]);
    assert!(lines[0].ends_with(" days left (good.example)"), "{}", lines[0]);
    assert_eq!(lines[1], "⚠️ [SSL] Could not check SSL certificate (down.example)");
    assert!(lines[2].starts_with("🚨 [SSL] SSL certificate EXPIRED "), "{}", lines[2]);
    assert!(lines[2].ends_with(" days ago (old.example:8443)"), "{}", lines[2]);

    assert!(
        !dir.join("aws-called").exists(),
        "aws checks must not run without --aws/--all"
    );

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn json_mode_emits_one_record_per_finding() {
    let dir = setup();
    let out = run(&dir, &["--json"]);
    assert!(out.status.success());

    let stdout = String::from_utf8_lossy(&out.stdout);
    let records: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).expect("ndjson line"))
        .collect();
    assert_eq!(records.len(), 3);

    let severities: Vec<&str> = records
        .iter()
        .map(|r| r["severity"].as_str().expect("severity"))
        .collect();
    assert_eq!(severities, vec!["LOW", "MEDIUM", "CRITICAL"]);

    for r in &records {
        assert_eq!(r["service"], "SSL");
        assert!(r["time"].is_string());
        assert!(r["resource"].is_string());
        assert!(r["message"].is_string());
    }
    assert_eq!(records[1]["resource"], "down.example");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn hosts_can_come_from_environment() {
    let dir = setup();
    let path = format!(
        "{}:{}",
        dir.join("bin").display(),
        std::env::var("PATH").unwrap_or_default()
    );
    let out = Command::new(env!("CARGO_BIN_EXE_shadoweye"))
        .current_dir(&dir)
        .env("PATH", path)
        .env("SHADOWEYE_TEST_DIR", &dir)
        .env("SHADOWEYE_SSL_HOSTS", "down.example")
        .env_remove("SHADOWEYE_CONFIG")
        .args(["--ssl-only"])
        .output()
        .expect("run shadoweye");
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert_eq!(
        stdout.trim_end(),
        "⚠️ [SSL] Could not check SSL certificate (down.example)"
    );

    let _ = std::fs::remove_dir_all(&dir);
}

const HANGING_OPENSSL: &str = r#"#!/bin/sh
sleep 3
exit 0
"#;

#[test]
fn exhausted_budget_fails_the_check_once() {
    let dir = make_temp_dir();
    write_script(&dir.join("bin"), "openssl", HANGING_OPENSSL);
    write_file(
        &dir.join("config.toml"),
        br#"
[ssl]
hosts = ["a.example", "b.example", "c.example"]
"#,
    );

    let out = run(&dir, &["--timeout", "1"]);
    assert!(
        out.status.success(),
        "stderr={}",
        String::from_utf8_lossy(&out.stderr)
    );

    let stdout = String::from_utf8_lossy(&out.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 1, "stdout={stdout}");
    assert!(lines[0].starts_with("⚠️ [SSL] SSL check error: "), "{}", lines[0]);
    assert!(lines[0].contains("timed out"), "{}", lines[0]);
    assert!(lines[0].ends_with(" (-)"), "{}", lines[0]);
    assert!(!stdout.contains("Could not check SSL certificate"));

    let _ = std::fs::remove_dir_all(&dir);
}
