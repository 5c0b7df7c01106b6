//! CLI tests for the qri-relay binary
//!
//! Tests command-line handling that runs before the server starts: --version, --help,
//! unknown arguments and the validate command.

use std::process::Command;
use std::str;

/// Command for the binary built by cargo for this test run
fn relay_command() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_qri-relay"));
    // keep the caller's environment from leaking into config checks
    for var in [
        "OPENAI_API_KEY",
        "RELAY_UPSTREAM_URL",
        "RELAY_HISTORY_PAIRS",
        "RELAY_UPSTREAM_TIMEOUT_SECS",
        "RELAY_DELIVERY_MODE",
        "PORT",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

/// Test that --version flag works and outputs correct version format
#[test]
fn test_version_flag() {
    let output = relay_command().arg("--version").output().expect("Failed to execute command");

    assert!(output.status.success(), "Version command should succeed");
    let stdout = str::from_utf8(&output.stdout).expect("Invalid UTF-8");
    assert!(stdout.starts_with("qri-relay "), "got: {}", stdout);
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")), "got: {}", stdout);
}

/// Test that -V behaves like --version
#[test]
fn test_version_flag_short() {
    let output = relay_command().arg("-V").output().expect("Failed to execute command");
    assert!(output.status.success());
    assert!(str::from_utf8(&output.stdout).unwrap().contains("qri-relay"));
}

/// Test that --help lists commands and environment variables
#[test]
fn test_help_flag() {
    let output = relay_command().arg("--help").output().expect("Failed to execute command");

    assert!(output.status.success(), "Help command should succeed");
    let stdout = str::from_utf8(&output.stdout).expect("Invalid UTF-8");
    assert!(stdout.contains("USAGE:"));
    assert!(stdout.contains("doctor"));
    assert!(stdout.contains("OPENAI_API_KEY"));
}

/// Test that unknown options fail with a message
#[test]
fn test_unknown_option() {
    let output = relay_command().arg("--bogus").output().expect("Failed to execute command");

    assert!(!output.status.success(), "Unknown option should fail");
    let stderr = str::from_utf8(&output.stderr).expect("Invalid UTF-8");
    assert!(stderr.contains("Unknown option: --bogus"), "got: {}", stderr);
}

/// Test that validate passes with defaults and a credential
#[test]
fn test_validate_with_defaults() {
    let output = relay_command()
        .arg("validate")
        .env("OPENAI_API_KEY", "sk-test")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success(), "stderr: {}", str::from_utf8(&output.stderr).unwrap());
    assert!(str::from_utf8(&output.stdout).unwrap().contains("[OK]"));
}

/// Test that validate fails on a zero history window
#[test]
fn test_validate_rejects_zero_history() {
    let output = relay_command()
        .arg("validate")
        .env("OPENAI_API_KEY", "sk-test")
        .env("RELAY_HISTORY_PAIRS", "0")
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(1));
    assert!(str::from_utf8(&output.stderr).unwrap().contains("RELAY_HISTORY_PAIRS"));
}

/// Test that validate fails on an unparsable port
#[test]
fn test_validate_rejects_bad_port() {
    let output = relay_command()
        .arg("validate")
        .env("PORT", "not-a-port")
        .output()
        .expect("Failed to execute command");

    assert_eq!(output.status.code(), Some(1));
    assert!(str::from_utf8(&output.stderr).unwrap().contains("PORT"));
}
