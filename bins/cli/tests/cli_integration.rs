//! CLI integration tests.

use std::path::Path;
use std::process::Command;

fn run_cli(args: &[&str]) -> std::io::Result<std::process::Output> {
    Command::new(env!("CARGO_BIN_EXE_sca")).args(args).output()
}

fn workspace_root() -> std::path::PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    manifest_dir
        .parent()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| manifest_dir.to_path_buf())
}

fn fixture_path(relative: &str) -> std::path::PathBuf {
    workspace_root()
        .join("crates")
        .join("testkit")
        .join("fixtures")
        .join(relative)
}

#[test]
fn cli_self_check_runs() -> std::io::Result<()> {
    let output = Command::new(env!("CARGO_BIN_EXE_sca"))
        .args(["self-check"])
        .env("SCA_EMBEDDING_PROVIDER", "test")
        .output()?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(output.status.success(), "self-check failed: {stderr}");
    assert!(stdout.contains("status: ok"));

    Ok(())
}

#[test]
fn cli_version_runs() -> std::io::Result<()> {
    let output = run_cli(&["--version"])?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(output.status.success(), "--version failed: {stderr}");
    assert!(stdout.starts_with("sca "));
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));

    Ok(())
}

#[test]
fn cli_validate_request_runs() -> std::io::Result<()> {
    let payload = r#"{"codebaseRoot":"/tmp/repo","query":"hello","topK":5}"#;
    let output = run_cli(&[
        "validate-request",
        "--kind",
        "search",
        "--input-json",
        payload,
    ])?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(output.status.success(), "validate-request failed: {stderr}");
    assert!(stdout.contains("status: ok"));
    assert!(stdout.contains("kind: search"));

    Ok(())
}

#[test]
fn cli_config_check_runs_on_valid_fixture() -> std::io::Result<()> {
    let path = fixture_path("config/backend-config.valid.json");
    let output = run_cli(&["config", "check", "--path", path.to_string_lossy().as_ref()])?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(output.status.success(), "config check failed: {stderr}");
    assert!(stdout.contains("status: ok"));

    Ok(())
}

#[test]
fn cli_config_check_runs_on_toml_fixture() -> std::io::Result<()> {
    let path = fixture_path("config/backend-config.default.toml");
    let output = run_cli(&["config", "check", "--path", path.to_string_lossy().as_ref()])?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(output.status.success(), "config check failed: {stderr}");
    assert!(stdout.contains("status: ok"));

    Ok(())
}

#[test]
fn cli_config_check_fails_on_invalid_fixture() -> std::io::Result<()> {
    let path = fixture_path("config/backend-config.invalid.json");
    let output = run_cli(&["config", "check", "--path", path.to_string_lossy().as_ref()])?;
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert_eq!(output.status.code(), Some(2));
    assert!(stdout.contains("status: error"));

    Ok(())
}

#[test]
fn cli_config_check_env_overrides_win() -> std::io::Result<()> {
    let path = fixture_path("config/backend-config.valid.json");
    let output = Command::new(env!("CARGO_BIN_EXE_sca"))
        .args(["--json", "config", "check", "--path"])
        .arg(path)
        .env("SCA_CORE_TIMEOUT_MS", "60000")
        .output()?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success());

    let value: serde_json::Value =
        serde_json::from_str(stdout.trim()).map_err(std::io::Error::other)?;
    let timeout_ms = value
        .get("effectiveConfig")
        .and_then(|value| value.get("core"))
        .and_then(|value| value.get("timeoutMs"))
        .and_then(|value| value.as_u64())
        .ok_or_else(|| std::io::Error::other("missing core.timeoutMs"))?;
    assert_eq!(timeout_ms, 60000);

    Ok(())
}

#[test]
fn cli_config_show_runs_on_valid_fixture() -> std::io::Result<()> {
    let path = fixture_path("config/backend-config.valid.json");
    let output = run_cli(&[
        "--json",
        "config",
        "show",
        "--path",
        path.to_string_lossy().as_ref(),
    ])?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(output.status.success(), "config show failed: {stderr}");
    let value: serde_json::Value =
        serde_json::from_str(stdout.trim()).map_err(std::io::Error::other)?;
    assert_eq!(value.get("status").and_then(|v| v.as_str()), Some("ok"));
    assert!(value.get("effectiveConfig").is_some());

    Ok(())
}

#[test]
fn cli_config_validate_runs_on_valid_fixture() -> std::io::Result<()> {
    let path = fixture_path("config/backend-config.valid.json");
    let output = run_cli(&[
        "config",
        "validate",
        "--path",
        path.to_string_lossy().as_ref(),
    ])?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(output.status.success(), "config validate failed: {stderr}");
    assert!(stdout.contains("status: ok"));

    Ok(())
}
