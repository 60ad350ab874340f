//! Integration tests for steward
//!
//! These tests drive the compiled binary end to end: every command must
//! print exactly one JSON document on stdout, and hook commands must do so
//! even when their input is empty or malformed.

use assert_cmd::Command;
use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Helper to create a steward Command
fn steward() -> Command {
    cargo_bin_cmd!("steward")
}

/// Helper to create a directory steward recognizes as a project root
fn create_temp_project() -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("package.json"), "{}").unwrap();
    dir
}

// =============================================================================
// Basic CLI Tests
// =============================================================================

mod cli_basics {
    use super::*;

    #[test]
    fn test_steward_help() {
        steward().arg("--help").assert().success();
    }

    #[test]
    fn test_steward_version() {
        steward().arg("--version").assert().success();
    }

    #[test]
    fn test_missing_subcommand_fails() {
        steward().assert().failure();
    }

    #[test]
    fn test_outside_project_root_fails() {
        // A bare temp dir has no root marker, so every command must refuse
        // to run rather than scatter state files somewhere surprising.
        let dir = TempDir::new().unwrap();
        steward()
            .current_dir(dir.path())
            .args(["pipeline", "status"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("no project root"));
    }
}

// =============================================================================
// Pipeline Commands
// =============================================================================

mod pipeline_commands {
    use super::*;

    #[test]
    fn test_pipeline_start_emits_summary_json() {
        let dir = create_temp_project();
        steward()
            .current_dir(dir.path())
            .args(["pipeline", "start", "user-auth"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"reused\": false"))
            .stdout(predicate::str::contains("user-auth"));

        assert!(dir.path().join(".steward/pipeline/status.json").exists());
    }

    #[test]
    fn test_pipeline_start_resumes_same_feature() {
        let dir = create_temp_project();
        steward()
            .current_dir(dir.path())
            .args(["pipeline", "start", "user-auth"])
            .assert()
            .success();
        steward()
            .current_dir(dir.path())
            .args(["pipeline", "start", "user-auth"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"reused\": true"));
    }

    #[test]
    fn test_pipeline_advance_moves_to_next_phase() {
        let dir = create_temp_project();
        steward()
            .current_dir(dir.path())
            .args(["pipeline", "start", "user-auth"])
            .assert()
            .success();
        steward()
            .current_dir(dir.path())
            .args(["pipeline", "advance"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"advanced\": true"));

        let status = fs::read_to_string(dir.path().join(".steward/pipeline/status.json")).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&status).unwrap();
        assert_eq!(doc["currentPhase"], 2);
    }

    #[test]
    fn test_pipeline_advance_without_start_fails() {
        let dir = create_temp_project();
        steward()
            .current_dir(dir.path())
            .args(["pipeline", "advance"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("no pipeline in progress"));
    }

    #[test]
    fn test_pipeline_status_without_pipeline_is_null() {
        let dir = create_temp_project();
        steward()
            .current_dir(dir.path())
            .args(["pipeline", "status"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"pipeline\": null"));
    }
}

// =============================================================================
// Loop Commands
// =============================================================================

mod loop_commands {
    use super::*;

    #[test]
    fn test_loop_start_and_status() {
        let dir = create_temp_project();
        steward()
            .current_dir(dir.path())
            .args(["loop", "start", "--prompt", "fix the flaky test"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"active\": true"))
            .stdout(predicate::str::contains("LOOP_DONE"));

        steward()
            .current_dir(dir.path())
            .args(["loop", "status"])
            .assert()
            .success()
            .stdout(predicate::str::contains("fix the flaky test"));
    }

    #[test]
    fn test_loop_start_honors_flag_overrides() {
        let dir = create_temp_project();
        steward()
            .current_dir(dir.path())
            .args([
                "loop",
                "start",
                "--prompt",
                "migrate the schema",
                "--max-iterations",
                "3",
                "--completion-promise",
                "ALL_GREEN",
            ])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"maxIterations\": 3"))
            .stdout(predicate::str::contains("ALL_GREEN"));
    }

    #[test]
    fn test_loop_start_requires_prompt() {
        let dir = create_temp_project();
        steward()
            .current_dir(dir.path())
            .args(["loop", "start"])
            .assert()
            .failure();
    }

    #[test]
    fn test_loop_complete_deactivates() {
        let dir = create_temp_project();
        steward()
            .current_dir(dir.path())
            .args(["loop", "start", "--prompt", "refactor"])
            .assert()
            .success();
        steward()
            .current_dir(dir.path())
            .args(["loop", "complete"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"active\": false"));
    }

    #[test]
    fn test_loop_cancel_removes_state() {
        let dir = create_temp_project();
        steward()
            .current_dir(dir.path())
            .args(["loop", "start", "--prompt", "refactor"])
            .assert()
            .success();
        steward()
            .current_dir(dir.path())
            .args(["loop", "cancel"])
            .assert()
            .success();
        steward()
            .current_dir(dir.path())
            .args(["loop", "status"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"loop\": null"));
    }
}

// =============================================================================
// Hook Commands
// =============================================================================

mod hook_commands {
    use super::*;

    #[test]
    fn test_hook_without_project_root_still_prints_envelope() {
        // Hooks may fire from anywhere the host happens to run them; the
        // one JSON object on stdout is non-negotiable even then.
        let dir = TempDir::new().unwrap();
        steward()
            .current_dir(dir.path())
            .args(["hook", "stop"])
            .write_stdin("")
            .assert()
            .success()
            .stdout("{}\n");
    }

    #[test]
    fn test_hook_with_unreadable_config_still_prints_envelope() {
        let dir = create_temp_project();
        fs::write(dir.path().join("steward.toml"), "pipeline = [not toml").unwrap();
        steward()
            .current_dir(dir.path())
            .args(["hook", "stop"])
            .write_stdin("")
            .assert()
            .success()
            .stdout("{}\n");
    }

    #[test]
    fn test_hook_stop_with_empty_stdin_prints_empty_object() {
        let dir = create_temp_project();
        steward()
            .current_dir(dir.path())
            .args(["hook", "stop"])
            .write_stdin("")
            .assert()
            .success()
            .stdout("{}\n");
    }

    #[test]
    fn test_hook_stop_with_malformed_stdin_prints_empty_object() {
        let dir = create_temp_project();
        steward()
            .current_dir(dir.path())
            .args(["hook", "stop"])
            .write_stdin("not json at all {{{")
            .assert()
            .success()
            .stdout("{}\n");
    }

    #[test]
    fn test_hook_session_start_reports_project() {
        let dir = create_temp_project();
        steward()
            .current_dir(dir.path())
            .args(["hook", "session-start"])
            .write_stdin("{}")
            .assert()
            .success()
            .stdout(predicate::str::contains("systemMessage"))
            .stdout(predicate::str::contains("[steward] project:"));
    }

    #[test]
    fn test_hook_post_tool_records_observation() {
        let dir = create_temp_project();
        let event = serde_json::json!({
            "session_id": "abc123",
            "tool_name": "Write",
            "tool_input": { "file_path": "src/lib.rs", "content": "pub fn x() {}" }
        });
        steward()
            .current_dir(dir.path())
            .args(["hook", "post-tool"])
            .write_stdin(event.to_string())
            .assert()
            .success()
            .stdout("{}\n");

        let log = fs::read_to_string(dir.path().join(".steward/sessions/observations.jsonl")).unwrap();
        assert!(log.contains("src/lib.rs"));
    }

    #[test]
    fn test_hook_stop_blocks_while_loop_active() {
        let dir = create_temp_project();
        steward()
            .current_dir(dir.path())
            .args(["loop", "start", "--prompt", "keep going"])
            .assert()
            .success();

        let event = serde_json::json!({ "transcript": "still working on it" });
        steward()
            .current_dir(dir.path())
            .args(["hook", "stop"])
            .write_stdin(event.to_string())
            .assert()
            .success()
            .stdout(predicate::str::contains("\"decision\":\"block\""))
            .stdout(predicate::str::contains("keep going"));
    }

    #[test]
    fn test_hook_stop_completes_loop_on_promise() {
        let dir = create_temp_project();
        steward()
            .current_dir(dir.path())
            .args(["loop", "start", "--prompt", "keep going"])
            .assert()
            .success();

        let event = serde_json::json!({ "transcript": "all finished. LOOP_DONE" });
        steward()
            .current_dir(dir.path())
            .args(["hook", "stop"])
            .write_stdin(event.to_string())
            .assert()
            .success()
            .stdout(predicate::str::contains("systemMessage").and(
                predicate::str::contains("\"decision\"").not(),
            ));

        steward()
            .current_dir(dir.path())
            .args(["loop", "status"])
            .assert()
            .success()
            .stdout(predicate::str::contains("\"active\": false"));
    }
}
