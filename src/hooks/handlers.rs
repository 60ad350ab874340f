//! Event handlers. Thin by design: each one wires an inbound event to the
//! stores and formats a response; all real state logic lives in the store
//! modules so the handlers stay trivially auditable.

use anyhow::Result;
use serde_json::json;
use std::fs;

use crate::classify::{self, CompletionSignal, PromptIntent};
use crate::config::StewardConfig;
use crate::hooks::{HookEvent, HookResponse};
use crate::looper::LoopStore;
use crate::pipeline::{self, PipelineStore};
use crate::project::ProjectPaths;
use crate::session::{Added, ObservationKind, ObservationRecord, SessionStore};
use crate::summary::SummaryStore;
use crate::team::{MemberStatus, TeamStore};

const TAG: &str = "[steward]";

/// Session start: report what state survives from before.
pub fn session_start(
    paths: &ProjectPaths,
    config: &StewardConfig,
    _event: &HookEvent,
) -> Result<HookResponse> {
    let mut lines = vec![format!("{TAG} project: {}", paths.project_label())];

    if let Some(status) = PipelineStore::new(paths, config).load() {
        let summary = pipeline::summarize(&status);
        let phase = summary
            .current_phase
            .map(|p| p.name)
            .unwrap_or_else(|| "-".to_string());
        lines.push(format!(
            "- pipeline: {} [{}] {}/{} phases done",
            summary.feature, phase, summary.progress.completed, summary.progress.total
        ));
    }

    if let Some(loop_state) = LoopStore::new(paths).load() {
        if loop_state.active {
            lines.push(format!(
                "- loop active: {}/{} (completion signal '{}')",
                loop_state.current_iteration,
                loop_state.max_iterations,
                loop_state.completion_promise
            ));
        }
    }

    let team = TeamStore::new(paths).load();
    if team.enabled {
        lines.push(format!(
            "- team: {} members, {} queued tasks",
            team.members.len(),
            team.task_queue.len()
        ));
    }

    if let Some(summary) = SummaryStore::new(paths).load_latest() {
        lines.push(format!("- last session: {}", summary.summary.request));
    }
    if paths.context_snapshot().exists() {
        lines.push(format!(
            "- previous context available: {}",
            paths.context_snapshot().display()
        ));
    }

    Ok(HookResponse::message(lines.join("\n")))
}

/// User prompt: bump the session, and inject carried-over context exactly
/// once per session (the once-only guarantee lives in the session store).
pub fn user_prompt(
    paths: &ProjectPaths,
    config: &StewardConfig,
    event: &HookEvent,
) -> Result<HookResponse> {
    let store = SessionStore::new(paths);
    let session_id = event.session_id.as_deref().unwrap_or("default");
    store.init(session_id)?;

    if !store.check_and_mark_injected()? {
        return Ok(HookResponse::empty());
    }

    let mut context = String::new();
    if let Some(summary) = SummaryStore::new(paths).load_latest() {
        context.push_str(&format!("Previous session: {}\n", summary.summary.request));
        for item in &summary.summary.completed {
            context.push_str(&format!("- completed: {item}\n"));
        }
        for item in &summary.summary.next_steps {
            context.push_str(&format!("- next: {item}\n"));
        }
    }
    if paths.context_snapshot().exists() {
        context.push_str(&format!(
            "Project context snapshot: {}\n",
            paths.context_snapshot().display()
        ));
    }

    // A continuation prompt gets the pipeline position; the model otherwise
    // tends to restart from phase one.
    let intent = classify::detect_intent(event.prompt.as_deref().unwrap_or(""));
    if intent == PromptIntent::Continue {
        if let Some(status) = PipelineStore::new(paths, config).load() {
            let summary = pipeline::summarize(&status);
            if let Some(phase) = summary.current_phase {
                context.push_str(&format!(
                    "Pipeline position: {} phase {} ({})\n",
                    summary.feature, phase.id, phase.name
                ));
            }
        }
    }
    if context.is_empty() {
        return Ok(HookResponse::empty());
    }

    Ok(HookResponse::empty().with_output(json!({
        "hookEventName": "UserPromptSubmit",
        "additionalContext": context,
    })))
}

/// Post tool use: journal the observation, passing external classification
/// tags through untouched.
pub fn post_tool(
    paths: &ProjectPaths,
    _config: &StewardConfig,
    event: &HookEvent,
) -> Result<HookResponse> {
    let Some(tool) = event.tool_name.as_deref() else {
        return Ok(HookResponse::empty());
    };

    let observed = match tool {
        "Write" | "Edit" | "MultiEdit" | "NotebookEdit" => event
            .file_path()
            .map(|f| (ObservationKind::Write, f.to_string())),
        "Bash" => event.command().map(|c| (ObservationKind::Bash, c.to_string())),
        "Skill" => event
            .skill_name()
            .map(|s| (ObservationKind::Skill, s.to_string())),
        _ => None,
    };
    let Some((kind, payload)) = observed else {
        return Ok(HookResponse::empty());
    };

    let mut record = ObservationRecord::new(kind, tool, payload).with_classification(
        event.observation_type.clone(),
        event.concepts.clone().unwrap_or_default(),
    );
    if let Some(code) = event.exit_code {
        record = record.with_exit_code(code);
    }

    let added = SessionStore::new(paths).observations().append(record)?;
    if added == Added::No {
        tracing::debug!(tool, "duplicate observation suppressed");
    }
    Ok(HookResponse::empty())
}

/// Subagent stop: fold the member's exit back into team state and remember
/// which agent ran last for stop-time finalization.
pub fn subagent_stop(
    paths: &ProjectPaths,
    config: &StewardConfig,
    event: &HookEvent,
) -> Result<HookResponse> {
    let Some(member_id) = event.agent_id.as_deref() else {
        tracing::warn!("subagent-stop without an agent identifier, skipping team update");
        return Ok(HookResponse::empty());
    };

    // Best-effort marker for the stop orchestrator's agent finalizer.
    let marker = event.agent_type.as_deref().unwrap_or(member_id);
    if let Err(err) = write_agent_marker(paths, marker) {
        tracing::warn!(%err, "failed to record last-agent marker");
    }

    let succeeded = event.exit_code.is_none_or(|code| code == 0);
    if succeeded {
        advance_pipeline_on_completion(paths, config, marker, event.transcript_text());
    }

    let team = TeamStore::new(paths);
    if !team.load().enabled {
        return Ok(HookResponse::empty());
    }

    let result = if succeeded { "completed" } else { "failed" };

    match event.task_ref() {
        Some(task_id) => {
            team.record_task_completion(member_id, Some(task_id), result)?;
        }
        None => {
            team.release_assignments(member_id)?;
            let status = if succeeded {
                MemberStatus::Idle
            } else {
                MemberStatus::Failed
            };
            team.update_member_status(member_id, status, None, None)?;
        }
    }

    Ok(HookResponse::message(format!(
        "{TAG} subagent stopped: {member_id} ({result})"
    )))
}

/// A phase agent reporting its phase finished in prose moves the pipeline
/// forward without an explicit ctl call. Negated phrasings never advance.
fn advance_pipeline_on_completion(
    paths: &ProjectPaths,
    config: &StewardConfig,
    agent: &str,
    transcript: &str,
) {
    let store = PipelineStore::new(paths, config);
    let Some(status) = store.load() else {
        return;
    };
    if status.completed_at.is_some() {
        return;
    }
    let on_phase_agent = status
        .current_entry()
        .is_some_and(|phase| phase.agent.eq_ignore_ascii_case(agent.trim()));
    if !on_phase_agent {
        return;
    }
    if classify::detect_completion(transcript) != CompletionSignal::Complete {
        return;
    }
    match store.advance() {
        Ok(outcome) => {
            tracing::info!(
                agent,
                from = outcome.from.id,
                to = ?outcome.to.as_ref().map(|p| p.id),
                "phase advanced on agent completion report"
            );
        }
        Err(err) => tracing::warn!(%err, "phase auto-advance failed"),
    }
}

fn write_agent_marker(paths: &ProjectPaths, marker: &str) -> Result<()> {
    let path = paths.last_agent_marker();
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, marker)?;
    Ok(())
}

/// Team idle: one locked batch that cleans up, marks the member idle, and
/// hands it the next pending task when there is one.
pub fn team_idle(
    paths: &ProjectPaths,
    config: &StewardConfig,
    event: &HookEvent,
) -> Result<HookResponse> {
    let Some(member_id) = event.agent_id.as_deref() else {
        tracing::warn!("team-idle without an agent identifier, skipping assignment");
        return Ok(HookResponse::empty());
    };

    let outcome = TeamStore::new(paths).handle_idle(
        member_id,
        event.worktree_path.as_deref(),
        config.stale_member_ms(),
    )?;
    if !outcome.enabled {
        return Ok(HookResponse::empty());
    }

    let mut lines = vec![format!("{TAG} subagent idle: {member_id}")];
    match outcome.assignment {
        Some(next) => {
            lines.push(format!("assigned: {} ({})", next.description, next.task_id));
        }
        None if outcome.pending_tasks > 0 => {
            lines.push(format!("{} tasks waiting for other members", outcome.pending_tasks));
        }
        None => lines.push("no pending tasks".to_string()),
    }
    Ok(HookResponse::message(lines.join("\n")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::team::TeamTask;
    use serde_json::json;
    use tempfile::tempdir;

    fn setup() -> (ProjectPaths, StewardConfig, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        (
            ProjectPaths::new(dir.path().to_path_buf()),
            StewardConfig::default(),
            dir,
        )
    }

    fn event(value: serde_json::Value) -> HookEvent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn user_prompt_injects_once_per_session() {
        let (paths, config, _dir) = setup();
        let store = SummaryStore::new(&paths);
        store
            .save(&crate::summary::SummaryDoc {
                session_id: "old".to_string(),
                completed_at: chrono::Utc::now(),
                project: "shop".to_string(),
                source: "template".to_string(),
                summary: crate::summary::SummaryBody {
                    request: "wire payments".to_string(),
                    ..Default::default()
                },
                stats: Default::default(),
            })
            .unwrap();

        let ev = event(json!({"session_id": "s-1", "prompt": "continue"}));
        let first = user_prompt(&paths, &config, &ev).unwrap();
        let output = first.hook_specific_output.unwrap();
        assert!(output["additionalContext"]
            .as_str()
            .unwrap()
            .contains("wire payments"));

        let second = user_prompt(&paths, &config, &ev).unwrap();
        assert!(second.hook_specific_output.is_none());
    }

    #[test]
    fn user_prompt_continuation_includes_pipeline_position() {
        let (paths, config, _dir) = setup();
        PipelineStore::new(&paths, &config)
            .start("checkout", false)
            .unwrap();

        let ev = event(json!({"session_id": "s-2", "prompt": "keep going where we left off"}));
        let response = user_prompt(&paths, &config, &ev).unwrap();
        let output = response.hook_specific_output.unwrap();
        let context = output["additionalContext"].as_str().unwrap();
        assert!(context.contains("Pipeline position: checkout phase 1"));
    }

    #[test]
    fn post_tool_journals_write_events() {
        let (paths, config, _dir) = setup();
        let ev = event(json!({
            "tool_name": "Write",
            "tool_input": {"file_path": "src/A.java"}
        }));
        post_tool(&paths, &config, &ev).unwrap();
        post_tool(&paths, &config, &ev).unwrap();

        let store = SessionStore::new(&paths);
        assert_eq!(store.observations().read_all().len(), 1);
    }

    #[test]
    fn post_tool_ignores_unknown_tools() {
        let (paths, config, _dir) = setup();
        let ev = event(json!({"tool_name": "WebSearch", "tool_input": {"query": "x"}}));
        post_tool(&paths, &config, &ev).unwrap();
        assert!(SessionStore::new(&paths).observations().read_all().is_empty());
    }

    #[test]
    fn subagent_stop_advances_phase_on_completion_report() {
        let (paths, config, _dir) = setup();
        PipelineStore::new(&paths, &config)
            .start("checkout", false)
            .unwrap();

        let ev = event(json!({
            "teammate": "worker-1",
            "agent_type": "dba-expert",
            "exit_code": 0,
            "transcript": "schema migration implemented, all tables created"
        }));
        subagent_stop(&paths, &config, &ev).unwrap();

        let status = PipelineStore::new(&paths, &config).load().unwrap();
        assert_eq!(status.current_phase, 2);
    }

    #[test]
    fn subagent_stop_holds_phase_on_negated_completion() {
        let (paths, config, _dir) = setup();
        PipelineStore::new(&paths, &config)
            .start("checkout", false)
            .unwrap();

        let ev = event(json!({
            "teammate": "worker-1",
            "agent_type": "dba-expert",
            "exit_code": 0,
            "transcript": "the schema is not done yet, two tables remain"
        }));
        subagent_stop(&paths, &config, &ev).unwrap();

        let status = PipelineStore::new(&paths, &config).load().unwrap();
        assert_eq!(status.current_phase, 1);
    }

    #[test]
    fn subagent_stop_ignores_completion_from_other_agents() {
        let (paths, config, _dir) = setup();
        PipelineStore::new(&paths, &config)
            .start("checkout", false)
            .unwrap();

        let ev = event(json!({
            "teammate": "worker-2",
            "agent_type": "test-expert",
            "exit_code": 0,
            "transcript": "integration tests finished"
        }));
        subagent_stop(&paths, &config, &ev).unwrap();

        let status = PipelineStore::new(&paths, &config).load().unwrap();
        assert_eq!(status.current_phase, 1);
    }

    #[test]
    fn subagent_stop_records_completion_when_team_enabled() {
        let (paths, config, _dir) = setup();
        let team = TeamStore::new(&paths);
        team.sync_task_queue("auth", vec![TeamTask::new("t-001", "entity")])
            .unwrap();
        team.assign_task("t-001", "worker-1").unwrap();

        let ev = event(json!({"teammate": "worker-1", "task_id": "t-001", "exit_code": 0}));
        let response = subagent_stop(&paths, &config, &ev).unwrap();
        assert!(response.system_message.unwrap().contains("completed"));

        let state = team.load();
        assert!(state.task_queue.is_empty());
        assert_eq!(state.completed_tasks.len(), 1);
        assert_eq!(
            std::fs::read_to_string(paths.last_agent_marker()).unwrap(),
            "worker-1"
        );
    }

    #[test]
    fn subagent_stop_without_agent_is_empty() {
        let (paths, config, _dir) = setup();
        let response = subagent_stop(&paths, &config, &HookEvent::default()).unwrap();
        assert!(response.system_message.is_none());
    }

    #[test]
    fn team_idle_assigns_work() {
        let (paths, config, _dir) = setup();
        TeamStore::new(&paths)
            .sync_task_queue("auth", vec![TeamTask::new("t-001", "entity")])
            .unwrap();

        let ev = event(json!({"teammate": "worker-1"}));
        let response = team_idle(&paths, &config, &ev).unwrap();
        assert!(response.system_message.unwrap().contains("assigned: entity"));
    }

    #[test]
    fn team_idle_when_disabled_is_empty() {
        let (paths, config, _dir) = setup();
        let ev = event(json!({"teammate": "worker-1"}));
        let response = team_idle(&paths, &config, &ev).unwrap();
        assert!(response.system_message.is_none());
    }

    #[test]
    fn session_start_reports_surviving_state() {
        let (paths, config, _dir) = setup();
        PipelineStore::new(&paths, &config)
            .start("user-auth", false)
            .unwrap();
        LoopStore::new(&paths).start("fix", 5, "LOOP_DONE").unwrap();

        let response = session_start(&paths, &config, &HookEvent::default()).unwrap();
        let message = response.system_message.unwrap();
        assert!(message.contains("pipeline: user-auth"));
        assert!(message.contains("loop active: 0/5"));
    }
}
