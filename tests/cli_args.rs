//! Integration tests for CLI argument handling
//!
//! Runs the binary for the commands that work without a reachable API.

use std::process::Command;

use tempfile::TempDir;

const FUNDCACHE_VARS: [&str; 7] = [
    "FUNDCACHE_BASE_URL",
    "FUNDCACHE_CACHE_DIR",
    "FUNDCACHE_CACHE_VERSION",
    "FUNDCACHE_QUOTA_BYTES",
    "FUNDCACHE_TIMEOUT_SECS",
    "FUNDCACHE_LONG_TIMEOUT_SECS",
    "FUNDCACHE_LOG",
];

/// Helper to run the CLI with given args and environment and capture output
fn run_cli_with_env(args: &[&str], vars: &[(&str, &str)]) -> std::process::Output {
    let mut command = Command::new(env!("CARGO_BIN_EXE_fundcache"));
    command.args(args).env_remove("RUST_LOG");
    for name in FUNDCACHE_VARS {
        command.env_remove(name);
    }
    command
        .envs(vars.iter().copied())
        .output()
        .expect("Failed to execute fundcache")
}

/// Helper to run the CLI with given args and capture output
fn run_cli(args: &[&str]) -> std::process::Output {
    run_cli_with_env(args, &[])
}

#[test]
fn test_help_flag_exits_successfully() {
    let output = run_cli(&["--help"]);
    assert!(
        output.status.success(),
        "Expected --help to exit successfully"
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("fundcache"), "Help should mention fundcache");
    assert!(stdout.contains("fetch"), "Help should list the fetch command");
}

#[test]
fn test_invalid_param_prints_error_and_exits() {
    let output = run_cli(&["fetch", "/fund_name_em", "-p", "novalue"]);
    assert!(!output.status.success(), "Expected invalid parameter to fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("Invalid parameter"),
        "Should explain the parameter format: {}",
        stderr
    );
}

#[test]
fn test_strategies_lists_fallback_table() {
    let output = run_cli(&["strategies"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("fund_open_fund_info_em"));
    assert!(stdout.contains("/fund_etf_fund_info_em"));
}

#[test]
fn test_clear_and_stats_work_offline() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let dir = temp_dir.path().to_str().expect("temp path is UTF-8");

    let output = run_cli(&["clear", "--cache-dir", dir]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Cache cleared"));

    let output = run_cli(&["stats", "--cache-dir", dir]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("0 entries"));
}

#[test]
fn test_cleanup_on_empty_cache() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let dir = temp_dir.path().to_str().expect("temp path is UTF-8");

    let output = run_cli(&["cleanup", "--cache-dir", dir]);
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("Removed 0 expired"));
}

#[test]
fn test_cache_dir_from_environment() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let cache_dir = temp_dir.path().join("from-env");
    let dir = cache_dir.to_str().expect("temp path is UTF-8");

    let output = run_cli_with_env(&["clear"], &[("FUNDCACHE_CACHE_DIR", dir)]);

    assert!(output.status.success());
    assert!(cache_dir.is_dir(), "Cache directory should be created from the variable");
}

#[test]
fn test_invalid_numeric_variable_is_rejected() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let dir = temp_dir.path().to_str().expect("temp path is UTF-8");

    let output = run_cli_with_env(
        &["stats", "--cache-dir", dir],
        &[("FUNDCACHE_QUOTA_BYTES", "lots")],
    );

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("lots"), "Should echo the bad value: {}", stderr);
}

#[cfg(test)]
mod unit_tests {
    //! Unit tests for CLI parsing that don't require running the binary

    use clap::Parser;
    use fundcache::cli::{Cli, Command};

    #[test]
    fn test_fetch_flags_default_off() {
        let cli = Cli::parse_from(["fundcache", "fetch", "/fund_name_em"]);
        assert_eq!(
            cli.command,
            Command::Fetch {
                path: "/fund_name_em".to_string(),
                params: Vec::new(),
                ttl: 300,
                no_cache: false,
                diagnostics: false,
            }
        );
    }

    #[test]
    fn test_fetch_no_cache_and_diagnostics() {
        let cli = Cli::parse_from([
            "fundcache",
            "--log-level",
            "debug",
            "fetch",
            "/fund_overview_em",
            "--no-cache",
            "--diagnostics",
        ]);
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
        match cli.command {
            Command::Fetch {
                no_cache,
                diagnostics,
                ..
            } => {
                assert!(no_cache);
                assert!(diagnostics);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["fundcache"]).is_err());
    }
}
