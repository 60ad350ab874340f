//! Structured end-of-session summaries.
//!
//! The summarizer itself is pluggable: remote-model summarization lives
//! behind the [`Summarize`] trait as an external collaborator, and the
//! built-in [`TemplateSummarizer`] is the always-available fallback that
//! derives a summary from observation stats and simple transcript patterns.
//!
//! `sessions/latest-summary.json` always holds the most recent session;
//! superseded summaries move into `sessions/archive/`, capped at ten.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::project::ProjectPaths;
use crate::session::ObservationStats;
use crate::store;

const MAX_ARCHIVE: usize = 10;
const MAX_COMPLETED_ITEMS: usize = 5;

static ACCOMPLISHMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:created?|modified|added|fixed)\s+[^\n.]{5,80}").unwrap());

/// The narrative part of a summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SummaryBody {
    pub request: String,
    #[serde(default)]
    pub investigated: Vec<String>,
    #[serde(default)]
    pub learned: Vec<String>,
    #[serde(default)]
    pub completed: Vec<String>,
    #[serde(default)]
    pub next_steps: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// What a summarizer gets to work with.
#[derive(Debug, Clone, Default)]
pub struct SummaryInput {
    pub transcript: String,
    pub current_task: Option<String>,
    pub stats: ObservationStats,
}

/// Summary production strategy. Implementations must be infallible; a
/// summarizer that can fail should fall back internally.
pub trait Summarize {
    fn summarize(&self, input: &SummaryInput) -> SummaryBody;
    /// Label recorded in the document so readers know what produced it.
    fn source(&self) -> &'static str;
}

/// Pattern-based fallback summarizer. No model calls, no network.
pub struct TemplateSummarizer;

impl Summarize for TemplateSummarizer {
    fn summarize(&self, input: &SummaryInput) -> SummaryBody {
        let mut completed: Vec<String> = input
            .stats
            .files_modified
            .iter()
            .take(MAX_COMPLETED_ITEMS)
            .map(|f| format!("modified {}", basename(f)))
            .collect();
        for m in ACCOMPLISHMENT.find_iter(&input.transcript) {
            if completed.len() >= MAX_COMPLETED_ITEMS {
                break;
            }
            let line = m.as_str().trim().to_string();
            if !completed.contains(&line) {
                completed.push(line);
            }
        }

        SummaryBody {
            request: input
                .current_task
                .clone()
                .or_else(|| first_meaningful_line(&input.transcript))
                .unwrap_or_else(|| "(no summary)".to_string()),
            completed,
            ..SummaryBody::default()
        }
    }

    fn source(&self) -> &'static str {
        "template"
    }
}

fn basename(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}

fn first_meaningful_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .find(|l| l.len() > 10)
        .map(|l| l.chars().take(200).collect())
}

/// Per-session counters carried alongside the narrative.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryStats {
    pub prompt_count: u32,
    pub tool_uses: usize,
    pub files_modified: Vec<String>,
    pub commands_run: Vec<String>,
    pub skills_used: Vec<String>,
}

/// The durable summary document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SummaryDoc {
    pub session_id: String,
    pub completed_at: DateTime<Utc>,
    pub project: String,
    pub source: String,
    pub summary: SummaryBody,
    pub stats: SummaryStats,
}

/// `latest-summary.json` plus its bounded archive.
pub struct SummaryStore {
    latest_path: PathBuf,
    archive_dir: PathBuf,
}

impl SummaryStore {
    pub fn new(paths: &ProjectPaths) -> Self {
        Self {
            latest_path: paths.latest_summary(),
            archive_dir: paths.summary_archive_dir(),
        }
    }

    pub fn load_latest(&self) -> Option<SummaryDoc> {
        store::read_typed(&self.latest_path, || None)
    }

    /// Persist a summary. A previous summary for a different session is
    /// archived first; re-summarizing the same session overwrites in place.
    pub fn save(&self, doc: &SummaryDoc) -> Result<()> {
        store::with_lock(&self.latest_path, || {
            let existing: Option<SummaryDoc> = store::read_typed(&self.latest_path, || None);
            if let Some(previous) = existing {
                if previous.session_id != doc.session_id {
                    self.archive(&previous)?;
                }
            }
            store::write_typed(&self.latest_path, doc)
        })
    }

    fn archive(&self, doc: &SummaryDoc) -> Result<()> {
        fs::create_dir_all(&self.archive_dir)
            .with_context(|| format!("Failed to create {}", self.archive_dir.display()))?;
        let ts = doc.completed_at.format("%Y-%m-%dT%H-%M-%S");
        let short_id: String = doc.session_id.chars().take(8).collect();
        let archive_path = self.archive_dir.join(format!("{ts}-{short_id}.json"));
        store::write_typed(&archive_path, doc)?;
        self.prune_archive()
    }

    fn prune_archive(&self) -> Result<()> {
        let mut files: Vec<PathBuf> = fs::read_dir(&self.archive_dir)?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        if files.len() <= MAX_ARCHIVE {
            return Ok(());
        }
        // Names sort chronologically because they start with the timestamp.
        files.sort();
        for stale in &files[..files.len() - MAX_ARCHIVE] {
            if let Err(err) = fs::remove_file(stale) {
                tracing::warn!(path = %stale.display(), %err, "failed to prune archived summary");
            }
        }
        Ok(())
    }

    pub fn list_archived(&self) -> Vec<SummaryDoc> {
        let Ok(entries) = fs::read_dir(&self.archive_dir) else {
            return Vec::new();
        };
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();
        paths
            .iter()
            .filter_map(|p| {
                serde_json::from_str(&fs::read_to_string(p).ok()?).ok()
            })
            .collect()
    }
}
