//! Integration tests for relay
//!
//! These drive the built binary end to end: feedback collection, agent
//! sessions with scripted agents, metrics reports and configuration.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create a relay Command isolated from the caller's environment
fn relay(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("relay");
    cmd.current_dir(dir.path())
        .env_remove("RELAY_AGENT_CMD")
        .env_remove("RELAY_FEEDBACK_CMD")
        .env_remove("RELAY_LOG");
    cmd
}

fn create_temp_project() -> TempDir {
    TempDir::new().unwrap()
}

/// Write a relay.toml whose agent is `sh -c <script>`
#[cfg(unix)]
fn configure_scripted_agent(dir: &TempDir, script: &str) {
    let relay_dir = dir.path().join(".relay");
    fs::create_dir_all(&relay_dir).unwrap();
    let config = format!(
        "[agent]\ncommand = \"sh\"\nargs = [\"-c\", {}]\nmax_iterations = 2\n",
        toml_string(script)
    );
    fs::write(relay_dir.join("relay.toml"), config).unwrap();
}

#[cfg(unix)]
fn toml_string(s: &str) -> String {
    format!("'''{}'''", s)
}

#[cfg(unix)]
const AGENT_SCRIPT: &str = r#"cat > /dev/null
printf '%s\n' '{"type":"system","subtype":"init"}'
printf '%s\n' '{"type":"assistant","message":{"content":[{"type":"tool_use","name":"Bash","input":{"command":"ls"},"id":"t1"}]}}'
printf '%s\n' '{"type":"result","subtype":"success","result":"Iteration finished","is_error":false}'
"#;

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_relay_help() {
        let dir = create_temp_project();
        relay(&dir)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("feedback"))
            .stdout(predicate::str::contains("metrics"));
    }

    #[test]
    fn test_relay_version() {
        let dir = create_temp_project();
        relay(&dir).arg("--version").assert().success();
    }

    #[test]
    fn test_unknown_command_fails() {
        let dir = create_temp_project();
        relay(&dir).arg("bogus").assert().failure();
    }
}

// =============================================================================
// Feedback Tests
// =============================================================================

mod feedback {
    use super::*;

    #[test]
    fn test_feedback_appends_blocks_to_feedback_file() {
        let dir = create_temp_project();

        relay(&dir)
            .arg("feedback")
            .write_stdin("first note\n\nsecond\nnote\n")
            .assert()
            .success()
            .stdout(predicate::str::contains("Feedback #1 submitted"))
            .stdout(predicate::str::contains("Feedback #2 submitted"));

        let content = fs::read_to_string(dir.path().join(".relay/USER_FEEDBACK.md")).unwrap();
        assert_eq!(content.matches("## Feedback ").count(), 2);
        let first = content.find("first note").unwrap();
        let second = content.find("second\nnote").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_feedback_with_only_blank_lines_submits_nothing() {
        let dir = create_temp_project();

        relay(&dir)
            .arg("feedback")
            .write_stdin("\n\n\n")
            .assert()
            .success()
            .stdout(predicate::str::contains("Feedback #").not());

        assert!(!dir.path().join(".relay/USER_FEEDBACK.md").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_feedback_command_receives_each_block() {
        let dir = create_temp_project();

        relay(&dir)
            .args(["feedback", "--command", "sh", "--arg", "-c", "--arg"])
            .arg("cat >> received.txt; echo --- >> received.txt")
            .write_stdin("alpha\n\nbeta\r\ngamma\r\n\r\n")
            .assert()
            .success();

        let received = fs::read_to_string(dir.path().join("received.txt")).unwrap();
        assert_eq!(received, "alpha\n---\nbeta\ngamma\n---\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_failing_submit_command_reports_and_continues() {
        let dir = create_temp_project();

        relay(&dir)
            .args(["feedback", "--command", "sh", "--arg", "-c", "--arg"])
            .arg("read line; [ \"$line\" != bad ] && echo \"$line\" >> ok.txt")
            .write_stdin("bad\n\ngood\n\n")
            .assert()
            .failure()
            .stdout(predicate::str::contains("Feedback #1 failed"))
            .stdout(predicate::str::contains("Feedback #2 submitted"))
            .stderr(predicate::str::contains("1 feedback submission(s) failed"));

        let ok = fs::read_to_string(dir.path().join("ok.txt")).unwrap();
        assert_eq!(ok, "good\n");
    }
}

// =============================================================================
// Session Tests
// =============================================================================

mod run {
    use super::*;

    #[test]
    fn test_run_requires_a_prompt() {
        let dir = create_temp_project();

        relay(&dir)
            .args(["run", "--no-feedback"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("A prompt is required"));
    }

    #[test]
    fn test_prompt_and_prompt_file_conflict() {
        let dir = create_temp_project();

        relay(&dir)
            .args(["run", "--prompt", "x", "--prompt-file", "p.md"])
            .assert()
            .failure();
    }

    #[cfg(unix)]
    #[test]
    fn test_run_records_snapshot_history() {
        let dir = create_temp_project();
        configure_scripted_agent(&dir, AGENT_SCRIPT);

        relay(&dir)
            .args(["run", "--no-feedback", "--prompt", "build it"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Iterations: 2/2 succeeded"));

        let history = fs::read_to_string(dir.path().join(".relay/metrics/history.json")).unwrap();
        let snapshots: serde_json::Value = serde_json::from_str(&history).unwrap();
        assert_eq!(snapshots.as_array().unwrap().len(), 1);
        assert_eq!(snapshots[0]["iteration_count"], 2);
        assert_eq!(snapshots[0]["success_rate"], 100.0);

        relay(&dir)
            .args(["metrics", "report"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Performance report"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_with_iterations_override_and_prompt_file() {
        let dir = create_temp_project();
        configure_scripted_agent(&dir, AGENT_SCRIPT);
        fs::write(dir.path().join("prompt.md"), "from a file").unwrap();

        relay(&dir)
            .args(["run", "--no-feedback", "--iterations", "1", "--prompt-file", "prompt.md"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Iterations: 1/1 succeeded"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_collects_feedback_from_stdin() {
        let dir = create_temp_project();
        configure_scripted_agent(&dir, &format!("sleep 0.3\n{}", AGENT_SCRIPT));

        relay(&dir)
            .args(["run", "--iterations", "1", "--prompt", "go"])
            .write_stdin("please also add tests\n\n")
            .assert()
            .success()
            .stdout(predicate::str::contains("Feedback #1 submitted"));

        let content = fs::read_to_string(dir.path().join(".relay/USER_FEEDBACK.md")).unwrap();
        assert!(content.contains("please also add tests"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_fails_when_every_iteration_fails() {
        let dir = create_temp_project();
        configure_scripted_agent(&dir, "cat > /dev/null; exit 4");

        relay(&dir)
            .args(["run", "--no-feedback", "--prompt", "go"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("All 2 iterations failed"));
    }
}

// =============================================================================
// Metrics Tests
// =============================================================================

mod metrics {
    use super::*;

    #[test]
    fn test_report_on_empty_history() {
        let dir = create_temp_project();

        relay(&dir)
            .args(["metrics", "report"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No metrics recorded yet."));
    }

    #[test]
    fn test_report_json_on_empty_history() {
        let dir = create_temp_project();

        let output = relay(&dir)
            .args(["metrics", "report", "--json"])
            .output()
            .unwrap();
        assert!(output.status.success());
        let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(report["summary"]["snapshot_count"], 0);
        assert_eq!(report["recommendations"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_report_flags_slow_sessions_and_compares() {
        let dir = create_temp_project();
        let metrics_dir = dir.path().join(".relay/metrics");
        fs::create_dir_all(&metrics_dir).unwrap();
        let snapshot = |id: &str, response: f64, exec: u64| {
            serde_json::json!({
                "session_id": id,
                "timestamp": "2026-01-01T00:00:00Z",
                "execution_time_ms": exec,
                "iteration_count": 1,
                "iterations_per_second": 1.0,
                "average_response_time_ms": response,
                "success_rate": 100.0,
                "resource_usage": {"memory_mb": 10.0, "cpu_percent": 1.0}
            })
        };
        let history = serde_json::json!([
            snapshot("before", 8000.0, 2000),
            snapshot("after", 9000.0, 1000)
        ]);
        fs::write(metrics_dir.join("history.json"), history.to_string()).unwrap();

        let output = relay(&dir)
            .args(["metrics", "report", "--json", "--compare"])
            .output()
            .unwrap();
        assert!(output.status.success());
        let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(report["summary"]["snapshot_count"], 2);
        assert_eq!(report["comparison"]["execution_time_change_pct"], -50.0);
        let recs = report["recommendations"].as_array().unwrap();
        assert_eq!(recs.len(), 1);
        assert!(recs[0].as_str().unwrap().contains("response time"));
    }

    #[test]
    fn test_clear_removes_history() {
        let dir = create_temp_project();
        let metrics_dir = dir.path().join(".relay/metrics");
        fs::create_dir_all(&metrics_dir).unwrap();
        fs::write(metrics_dir.join("history.json"), "[]").unwrap();

        relay(&dir)
            .args(["metrics", "clear"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Cleared metrics history"));
        assert!(!metrics_dir.join("history.json").exists());

        relay(&dir)
            .args(["metrics", "clear"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No metrics history"));
    }
}

// =============================================================================
// Config Tests
// =============================================================================

mod config {
    use super::*;

    #[test]
    fn test_config_init_then_show() {
        let dir = create_temp_project();

        relay(&dir)
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Created"));
        assert!(dir.path().join(".relay/relay.toml").exists());

        relay(&dir)
            .args(["config", "init"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("already exists"));

        relay(&dir)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("max_iterations = 5"))
            .stdout(predicate::str::contains("agent command    = \"claude\""));
    }

    #[test]
    fn test_config_show_reflects_env_override() {
        let dir = create_temp_project();

        relay(&dir)
            .env("RELAY_AGENT_CMD", "codex")
            .arg("config")
            .assert()
            .success()
            .stdout(predicate::str::contains("agent command    = \"codex\""))
            .stdout(predicate::str::contains("using defaults"));
    }

    #[test]
    fn test_config_path() {
        let dir = create_temp_project();

        relay(&dir)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains(".relay/relay.toml"));
    }

    #[test]
    fn test_invalid_config_is_reported() {
        let dir = create_temp_project();
        fs::create_dir_all(dir.path().join(".relay")).unwrap();
        fs::write(dir.path().join(".relay/relay.toml"), "[agent\n").unwrap();

        relay(&dir)
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Failed to parse relay.toml"));
    }
}
