//! The stop orchestrator.
//!
//! Session stop is the one moment everything converges: snapshots, the
//! dashboard process, session summary, team state, agent finalizers, and
//! the loop decision. Steps run in a fixed order and are failure-isolated:
//! a failing step logs to stderr and the sequence continues, because the
//! final JSON response must always be produced.
//!
//! Step order:
//! 1. snapshot project status into `context.md`
//! 2. best-effort dashboard teardown via its recorded pid
//! 3. loop inactive: persist the session summary, delete session state
//! 4. team finalization, exactly once under a single lock
//! 5. agent-specific finalizer for the last-active agent marker
//! 6. the loop decision: empty acknowledgement, completion, or block

mod finalizer;

pub use finalizer::AgentKind;

use anyhow::Result;
use std::fs;

use crate::classify;
use crate::config::StewardConfig;
use crate::hooks::{HookEvent, HookResponse};
use crate::looper::{LoopState, LoopStore};
use crate::pipeline::{self, PipelineStore};
use crate::project::ProjectPaths;
use crate::session::SessionStore;
use crate::snapshot::{self, ContextSnapshot};
use crate::summary::{Summarize, SummaryDoc, SummaryInput, SummaryStats, SummaryStore, TemplateSummarizer};
use crate::team::{StopPolicy, TeamStore};

const TAG: &str = "[steward]";
const TRANSCRIPT_EXCERPT_CHARS: usize = 500;

/// Run the whole stop sequence and produce the response for the host.
pub fn handle_stop(
    paths: &ProjectPaths,
    config: &StewardConfig,
    event: &HookEvent,
) -> Result<HookResponse> {
    let loop_store = LoopStore::new(paths);
    let loop_state = loop_store.load();
    let loop_active = loop_state.as_ref().is_some_and(|s| s.active);

    if let Err(err) = snapshot_status(paths, config, loop_state.as_ref()) {
        tracing::error!(%err, "stop: context snapshot failed");
    }
    if let Err(err) = teardown_dashboard(paths) {
        tracing::error!(%err, "stop: dashboard teardown failed");
    }
    if !loop_active {
        if let Err(err) = persist_session_summary(paths, event) {
            tracing::error!(%err, "stop: session summary failed");
        }
    }
    if let Err(err) = finalize_team(paths, config) {
        tracing::error!(%err, "stop: team finalization failed");
    }
    if let Err(err) = finalizer::dispatch_last_agent(paths) {
        tracing::error!(%err, "stop: agent finalizer failed");
    }

    Ok(loop_decision(paths, &loop_store, loop_state, event))
}

/// Step 1: rewrite `context.md` with everything we currently know.
fn snapshot_status(
    paths: &ProjectPaths,
    config: &StewardConfig,
    loop_state: Option<&LoopState>,
) -> Result<()> {
    let session = SessionStore::new(paths).load();
    let reason = if loop_state.is_some_and(|s| s.active) {
        "loop iterating"
    } else {
        "session ended"
    };

    let snapshot = ContextSnapshot {
        project: paths.project_label(),
        prompt_number: session.map(|s| s.prompt_number),
        pipeline: PipelineStore::new(paths, config)
            .load()
            .map(|status| pipeline::summarize(&status)),
        team: Some(TeamStore::new(paths).load()),
        loop_state: loop_state.cloned(),
        recent_changes: vec![format!("session stop ({reason})")],
    };
    snapshot::save_context(paths, &snapshot)?;
    Ok(())
}

/// Step 2: SIGTERM the recorded dashboard pid, then drop the pid file.
/// Every failure here is ignored; the process may be long gone.
fn teardown_dashboard(paths: &ProjectPaths) -> Result<()> {
    let pid_file = paths.dashboard_pid();
    let Ok(content) = fs::read_to_string(&pid_file) else {
        return Ok(());
    };
    if let Ok(pid) = content.trim().parse::<u32>() {
        #[cfg(unix)]
        {
            let _ = std::process::Command::new("kill")
                .args(["-TERM", &pid.to_string()])
                .status();
        }
        tracing::debug!(pid, "dashboard teardown signalled");
    }
    fs::remove_file(&pid_file)?;
    Ok(())
}

/// Step 3: summary for the ending session, then the session doc goes away.
fn persist_session_summary(paths: &ProjectPaths, event: &HookEvent) -> Result<()> {
    let session_store = SessionStore::new(paths);
    let Some(session) = session_store.load() else {
        return Ok(());
    };

    let stats = session_store.observations().stats();
    let input = SummaryInput {
        transcript: event.transcript_text().to_string(),
        current_task: None,
        stats: stats.clone(),
    };
    let summarizer = TemplateSummarizer;
    let doc = SummaryDoc {
        session_id: session.session_id.clone(),
        completed_at: chrono::Utc::now(),
        project: session.project.clone(),
        source: summarizer.source().to_string(),
        summary: summarizer.summarize(&input),
        stats: SummaryStats {
            prompt_count: session.prompt_number,
            tool_uses: stats.total,
            files_modified: stats.files_modified,
            commands_run: stats.commands_run,
            skills_used: stats.skills_used,
        },
    };
    SummaryStore::new(paths).save(&doc)?;
    session_store.clear()
}

/// Step 4: one lock, one team mutation.
fn finalize_team(paths: &ProjectPaths, config: &StewardConfig) -> Result<()> {
    let team = TeamStore::new(paths);
    if !team.load().enabled {
        return Ok(());
    }
    let report = team.finalize_on_stop(StopPolicy {
        clear_all: config.team.clear_on_stop,
        stale_member_ms: config.stale_member_ms(),
    })?;
    tracing::info!(
        paused = report.paused_members.len(),
        released = report.released_tasks.len(),
        pruned = report.pruned_members.len(),
        cleared = report.cleared,
        "team finalized"
    );
    Ok(())
}

/// Step 6: decide what the host should do with the ending session.
fn loop_decision(
    paths: &ProjectPaths,
    loop_store: &LoopStore,
    loop_state: Option<LoopState>,
    event: &HookEvent,
) -> HookResponse {
    let Some(state) = loop_state.filter(|s| s.active) else {
        return HookResponse::empty();
    };
    let transcript = event.transcript_text();

    // Rate limit first: the cycle did not run, so it is retried, not counted.
    if classify::detect_rate_limit(transcript) {
        return match loop_store.record_rate_limit() {
            Ok(Some(updated)) => HookResponse::block(format!(
                "{TAG} rate limited (count {}). Wait {} seconds, then continue:\n\n{}",
                updated.rate_limit_count,
                updated.backoff_secs(),
                updated.prompt
            )),
            Ok(None) => HookResponse::empty(),
            Err(err) => {
                tracing::error!(%err, "failed to record rate limit");
                HookResponse::empty()
            }
        };
    }

    if !state.completion_promise.is_empty() && transcript.contains(&state.completion_promise) {
        return finish_loop(
            paths,
            loop_store,
            &state,
            &format!("completion signal '{}' detected", state.completion_promise),
        );
    }

    if state.is_max_reached() {
        return finish_loop(
            paths,
            loop_store,
            &state,
            &format!("maximum of {} iterations reached", state.max_iterations),
        );
    }

    // Keep going: credit the finished cycle and re-inject the prompt.
    let updated = match loop_store.increment_iteration() {
        Ok(Some(updated)) => updated,
        Ok(None) => return HookResponse::empty(),
        Err(err) => {
            tracing::error!(%err, "failed to advance loop iteration");
            return HookResponse::empty();
        }
    };
    let excerpt: String = transcript.chars().take(TRANSCRIPT_EXCERPT_CHARS).collect();
    if let Err(err) = snapshot::append_loop_log(paths, updated.current_iteration, &excerpt) {
        tracing::warn!(%err, "failed to append loop transcript");
    }

    HookResponse::block(format!(
        "{TAG} loop iteration {}/{}\n\nReview the previous result and continue:\n\n{}\n\n---\nInclude '{}' in your response when the task is complete.",
        updated.current_iteration,
        updated.max_iterations,
        updated.prompt,
        updated.completion_promise
    ))
}

fn finish_loop(
    paths: &ProjectPaths,
    loop_store: &LoopStore,
    state: &LoopState,
    reason: &str,
) -> HookResponse {
    if let Err(err) = loop_store.complete() {
        tracing::error!(%err, "failed to complete loop");
    }
    if let Err(err) = snapshot::finalize_loop_log(paths, state.current_iteration, reason) {
        tracing::warn!(%err, "failed to finalize loop transcript");
    }
    HookResponse::message(format!(
        "{TAG} loop finished: {reason}\nIterations: {}\nTranscript: {}",
        state.current_iteration,
        paths.loop_log().display()
    ))
}
