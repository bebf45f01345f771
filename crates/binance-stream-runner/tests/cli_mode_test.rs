/*
[INPUT]:  Compiled runner binary, bundled config, BINANCE_* overrides
[OUTPUT]: Exit status checks for dry-run, bad config, and reconnect exhaustion
[POS]:    Integration tests - binary entry point
[UPDATE]: When changing CLI flags or exit semantics
*/

use std::process::Command;

fn runner() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_binance-stream-runner"));
    command.env("RUST_LOG", "error");
    command
}

fn bundled_config() -> String {
    format!("{}/config/runner.yaml", env!("CARGO_MANIFEST_DIR"))
}

#[test]
fn cli_mode_with_config_and_dry_run_works() {
    let output = runner()
        .arg("--config")
        .arg(bundled_config())
        .arg("--log-level")
        .arg("error")
        .arg("--dry-run")
        .output()
        .expect("Failed to start binance-stream-runner binary");

    assert!(
        output.status.success(),
        "Process exited with non-zero status: {}\nStdout: {}\nStderr: {}",
        output.status,
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
}

#[test]
fn dry_run_rejects_invalid_stream_url() {
    let output = runner()
        .arg("--config")
        .arg(bundled_config())
        .arg("--dry-run")
        .env("BINANCE_WS_URL", "https://not-a-websocket.example")
        .output()
        .expect("Failed to start binance-stream-runner binary");

    assert!(!output.status.success());
}

#[test]
fn exhausted_reconnects_exit_non_zero() {
    let output = runner()
        .arg("--log-level")
        .arg("error")
        .env("BINANCE_WS_URL", "ws://127.0.0.1:1/ws")
        .env("BINANCE_API_URL", "http://127.0.0.1:1")
        .env("BINANCE_PORT", "0")
        .env("BINANCE_SESSION__MAX_RECONNECT_ATTEMPTS", "1")
        .env("BINANCE_SESSION__BASE_BACKOFF_SECS", "1")
        .env("BINANCE_SESSION__MAX_BACKOFF_SECS", "1")
        .output()
        .expect("Failed to start binance-stream-runner binary");

    assert!(
        !output.status.success(),
        "expected failure after exhausting reconnects\nStderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(String::from_utf8_lossy(&output.stderr).contains("exhausted"));
}
