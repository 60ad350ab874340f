//! Human-readable project snapshots.
//!
//! Two markdown documents live beside the JSON state:
//! - `context.md`: current status rollup, rewritten on every snapshot while
//!   preserving a bounded change history across rewrites;
//! - `loop-log.md`: append-only transcript of loop iterations, archived when
//!   a new loop starts.
//!
//! These are for humans and for re-injection into a fresh session, so the
//! format is stable prose, not JSON.

use anyhow::{Context, Result};
use chrono::Utc;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use crate::looper::LoopState;
use crate::pipeline::PipelineSummary;
use crate::project::ProjectPaths;
use crate::team::TeamState;

/// Rewrites keep at most this many history lines.
const HISTORY_CAP: usize = 50;
const HISTORY_HEADING: &str = "## Recent changes";

/// Everything a full `context.md` rewrite can include. All sections are
/// optional; absent state simply produces no section.
#[derive(Debug, Default)]
pub struct ContextSnapshot {
    pub project: String,
    pub prompt_number: Option<u32>,
    pub pipeline: Option<PipelineSummary>,
    pub team: Option<TeamState>,
    pub loop_state: Option<LoopState>,
    pub recent_changes: Vec<String>,
}

fn stamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Rewrite `context.md` from current state, carrying forward the history
/// section of the previous file.
pub fn save_context(paths: &ProjectPaths, snapshot: &ContextSnapshot) -> Result<PathBuf> {
    let file_path = paths.context_snapshot();
    let mut lines: Vec<String> = vec![
        "# Project context".to_string(),
        format!("> Last updated: {}", stamp()),
        String::new(),
        "## Project".to_string(),
        format!("- Name: {}", snapshot.project),
    ];
    if let Some(n) = snapshot.prompt_number {
        lines.push(format!("- Prompts this session: {n}"));
    }
    lines.push(String::new());

    if let Some(pipeline) = &snapshot.pipeline {
        lines.push("## Pipeline".to_string());
        lines.push(format!("- Feature: {}", pipeline.feature));
        if let Some(current) = &pipeline.current_phase {
            lines.push(format!(
                "- Current phase: {} ({})",
                current.name, current.agent
            ));
        }
        lines.push(format!(
            "- Progress: {}/{} ({}%)",
            pipeline.progress.completed, pipeline.progress.total, pipeline.progress.percent
        ));
        lines.push(String::new());
    }

    if let Some(team) = &snapshot.team {
        if team.enabled {
            lines.push("## Team".to_string());
            lines.push(format!("- Members: {}", team.members.len()));
            lines.push(format!("- Queued tasks: {}", team.task_queue.len()));
            lines.push(format!("- Completed tasks: {}", team.completed_tasks.len()));
            lines.push(String::new());
        }
    }

    if let Some(loop_state) = &snapshot.loop_state {
        if loop_state.active {
            lines.push("## Loop".to_string());
            lines.push(format!(
                "- Iteration: {}/{}",
                loop_state.current_iteration, loop_state.max_iterations
            ));
            lines.push(format!("- Prompt: {}", loop_state.prompt));
            lines.push(format!(
                "- Completion signal: {}",
                loop_state.completion_promise
            ));
            lines.push(String::new());
        }
    }

    let mut history = read_recent_history(paths);
    for change in &snapshot.recent_changes {
        history.push(format!("- [{}] {}", stamp(), change));
    }
    if history.len() > HISTORY_CAP {
        history.drain(..history.len() - HISTORY_CAP);
    }
    if !history.is_empty() {
        lines.push(HISTORY_HEADING.to_string());
        lines.extend(history);
        lines.push(String::new());
    }

    if let Some(dir) = file_path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(&file_path, lines.join("\n"))
        .with_context(|| format!("Failed to write {}", file_path.display()))?;
    Ok(file_path)
}

/// History lines from the existing `context.md`, if any.
fn read_recent_history(paths: &ProjectPaths) -> Vec<String> {
    let Ok(content) = fs::read_to_string(paths.context_snapshot()) else {
        return Vec::new();
    };
    let Some(section_start) = content.find(HISTORY_HEADING) else {
        return Vec::new();
    };
    content[section_start..]
        .lines()
        .skip(1)
        .take_while(|line| !line.starts_with("## "))
        .map(str::trim)
        .filter(|line| line.starts_with("- ["))
        .map(str::to_string)
        .collect()
}

/// Record one change line without rebuilding the whole snapshot.
pub fn append_change(paths: &ProjectPaths, description: &str) -> Result<()> {
    let file_path = paths.context_snapshot();
    let entry = format!("- [{}] {}", stamp(), description);

    let Ok(content) = fs::read_to_string(&file_path) else {
        // No snapshot yet; create a minimal one.
        if let Some(dir) = file_path.parent() {
            fs::create_dir_all(dir)?;
        }
        let minimal = format!(
            "# Project context\n> Last updated: {}\n\n{HISTORY_HEADING}\n{entry}\n",
            stamp()
        );
        fs::write(&file_path, minimal)
            .with_context(|| format!("Failed to write {}", file_path.display()))?;
        return Ok(());
    };

    let updated = if content.contains(HISTORY_HEADING) {
        content.replacen(
            &format!("{HISTORY_HEADING}\n"),
            &format!("{HISTORY_HEADING}\n{entry}\n"),
            1,
        )
    } else {
        format!("{content}\n{HISTORY_HEADING}\n{entry}\n")
    };
    fs::write(&file_path, updated)
        .with_context(|| format!("Failed to write {}", file_path.display()))?;
    Ok(())
}

/// Append one iteration entry to the loop transcript, creating the file
/// with a header when this is the first entry.
pub fn append_loop_log(paths: &ProjectPaths, iteration: u32, result: &str) -> Result<()> {
    let file_path = paths.loop_log();
    if let Some(dir) = file_path.parent() {
        fs::create_dir_all(dir)?;
    }

    let mut entry = String::new();
    if !file_path.exists() {
        entry.push_str(&format!("# Loop transcript\n> Started: {}\n\n", stamp()));
    }
    entry.push_str(&format!("## Iteration {iteration} ({})\n\n", stamp()));
    if !result.is_empty() {
        entry.push_str(result);
        entry.push_str("\n\n");
    }
    entry.push_str("---\n\n");

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&file_path)
        .with_context(|| format!("Failed to open {}", file_path.display()))?;
    file.write_all(entry.as_bytes())?;
    Ok(())
}

/// Close out the transcript with a completion footer.
pub fn finalize_loop_log(paths: &ProjectPaths, total_iterations: u32, reason: &str) -> Result<()> {
    let file_path = paths.loop_log();
    if !file_path.exists() {
        return Ok(());
    }
    let footer = format!(
        "\n## Loop finished\n- At: {}\n- Iterations: {total_iterations}\n- Reason: {reason}\n",
        stamp()
    );
    let mut file = OpenOptions::new().append(true).open(&file_path)?;
    file.write_all(footer.as_bytes())?;
    Ok(())
}

/// Move the current transcript into the archive directory. Returns the
/// archive path, or `None` when there was nothing to archive.
pub fn archive_loop_log(paths: &ProjectPaths) -> Result<Option<PathBuf>> {
    let file_path = paths.loop_log();
    if !file_path.exists() {
        return Ok(None);
    }
    let archive_dir = paths.loop_log_archive_dir();
    fs::create_dir_all(&archive_dir)?;
    let ts = Utc::now().format("%Y-%m-%dT%H-%M-%S");
    let archive_path = archive_dir.join(format!("loop-log-{ts}.md"));
    fs::rename(&file_path, &archive_path)
        .with_context(|| format!("Failed to archive {}", file_path.display()))?;
    Ok(Some(archive_path))
}
