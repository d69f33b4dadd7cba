use std::process::Command;
use tempfile::TempDir;

/// Integration tests for the refwatch CLI
/// These tests run the actual binary and verify its behavior

fn refwatch(temp_dir: &TempDir, args: &[&str]) -> std::process::Output {
    Command::new("cargo")
        .args(["run", "--quiet", "--"])
        .args(args)
        .env("XDG_CONFIG_HOME", temp_dir.path())
        .env("XDG_DATA_HOME", temp_dir.path())
        .output()
        .expect("Failed to execute command")
}

#[test]
fn test_cli_help() {
    let temp_dir = TempDir::new().unwrap();
    let output = refwatch(&temp_dir, &["--help"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);

    // Verify help contains expected commands
    assert!(stdout.contains("run"));
    assert!(stdout.contains("run-all"));
    assert!(stdout.contains("show"));
    assert!(stdout.contains("check"));
}

#[test]
fn test_cli_version() {
    let temp_dir = TempDir::new().unwrap();
    let output = refwatch(&temp_dir, &["--version"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("refwatch"));
}

#[test]
fn test_show_with_no_history() {
    let temp_dir = TempDir::new().unwrap();
    let settings = temp_dir.path().join("settings.yml");
    std::fs::write(
        &settings,
        "auth:\n  provider: github\n  username: alice\n  email: alice@example.com\n",
    )
    .unwrap();

    let output = refwatch(&temp_dir, &["show", settings.to_str().unwrap()]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No saved runs"));
}

#[test]
fn test_check_valid_settings_offline() {
    let temp_dir = TempDir::new().unwrap();
    let settings = temp_dir.path().join("settings.yml");
    std::fs::write(
        &settings,
        concat!(
            "repos:\n",
            "  - repo: rust-lang/rust\n",
            "    new_branches: true\n",
            "orgs:\n",
            "  - name: tokio-rs\n",
            "    type: organization\n",
            "auth:\n",
            "  provider: github\n",
            "  username: alice\n",
            "  token: t0ken\n",
            "  email: alice@example.com\n",
        ),
    )
    .unwrap();

    let output = refwatch(&temp_dir, &["check", settings.to_str().unwrap(), "--offline"]);

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("looks good"));
}

#[test]
fn test_check_rejects_bad_repo_name() {
    let temp_dir = TempDir::new().unwrap();
    let settings = temp_dir.path().join("settings.yml");
    std::fs::write(
        &settings,
        concat!(
            "repos:\n",
            "  - repo: not-a-repo-name\n",
            "auth:\n",
            "  provider: github\n",
            "  username: alice\n",
            "  email: alice@example.com\n",
        ),
    )
    .unwrap();

    let output = refwatch(&temp_dir, &["check", settings.to_str().unwrap(), "--offline"]);

    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Invalid repository name"));
}

#[test]
fn test_run_with_missing_settings_file() {
    let temp_dir = TempDir::new().unwrap();
    let missing = temp_dir.path().join("absent.yml");

    let output = refwatch(&temp_dir, &["run", missing.to_str().unwrap()]);

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to read settings file"));
}
