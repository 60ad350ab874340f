//! Append-only tool-use journal with bounded-cost de-duplication.
//!
//! One NDJSON line per observation. Duplicate suppression only inspects the
//! final 4 KiB of the file for a matching content hash inside a 30 second
//! window; that is a cost policy, not a correctness guarantee — duplicates
//! older than the window or outside the byte window are accepted.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

use crate::store;

/// How far back the duplicate scan reaches, in bytes.
const DEDUP_READ_BYTES: u64 = 4096;
/// Two identical observations inside this window count as one.
const DEDUP_WINDOW_MS: i64 = 30_000;
/// `stats()` reports at most this many recent commands.
const RECENT_COMMANDS_CAP: usize = 10;

/// The tool family an observation came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObservationKind {
    Write,
    Bash,
    Skill,
}

impl ObservationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObservationKind::Write => "write",
            ObservationKind::Bash => "bash",
            ObservationKind::Skill => "skill",
        }
    }
}

/// One journal entry. `observation_type` and `concepts` are classification
/// tags supplied by an external classifier and stored verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationRecord {
    #[serde(rename = "type")]
    pub kind: ObservationKind,
    pub tool: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub concepts: Vec<String>,
    #[serde(default = "Utc::now")]
    pub ts: DateTime<Utc>,
    #[serde(default)]
    pub hash: String,
}

impl ObservationRecord {
    /// Build a record with the kind-specific payload slotted into the right
    /// field (`file` for writes, `command` for bash, `skill` for skills).
    pub fn new(kind: ObservationKind, tool: impl Into<String>, payload: impl Into<String>) -> Self {
        let payload = payload.into();
        let (file, command, skill) = match kind {
            ObservationKind::Write => (Some(payload), None, None),
            ObservationKind::Bash => (None, Some(payload), None),
            ObservationKind::Skill => (None, None, Some(payload)),
        };
        Self {
            kind,
            tool: tool.into(),
            file,
            command,
            skill,
            exit_code: None,
            observation_type: None,
            concepts: Vec::new(),
            ts: Utc::now(),
            hash: String::new(),
        }
    }

    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = Some(exit_code);
        self
    }

    pub fn with_classification(
        mut self,
        observation_type: Option<String>,
        concepts: Vec<String>,
    ) -> Self {
        self.observation_type = observation_type;
        self.concepts = concepts;
        self
    }

    fn payload(&self) -> &str {
        self.file
            .as_deref()
            .or(self.command.as_deref())
            .or(self.skill.as_deref())
            .unwrap_or("")
    }

    /// Stable composite-key hash: kind, tool, payload, and exit code.
    /// Classification tags and timestamps are deliberately excluded so that
    /// re-observing the same action hashes identically.
    pub fn content_hash(&self) -> String {
        let exit = self
            .exit_code
            .map(|c| c.to_string())
            .unwrap_or_default();
        let key = format!(
            "{}|{}|{}|{}",
            self.kind.as_str(),
            self.tool,
            self.payload(),
            exit
        );
        let digest = Sha256::digest(key.as_bytes());
        digest
            .iter()
            .take(8)
            .map(|b| format!("{b:02x}"))
            .collect()
    }
}

/// Outcome of an `append` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Added {
    Yes,
    /// An identical record inside the de-duplication window already exists.
    No,
}

/// The observation journal at `sessions/observations.jsonl`.
pub struct ObservationLog {
    path: PathBuf,
}

impl ObservationLog {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Append a record unless an identical one is visible in the tail window.
    /// Hash computation, duplicate check, and write share one lock.
    pub fn append(&self, mut record: ObservationRecord) -> Result<Added> {
        store::with_lock(&self.path, || {
            record.hash = record.content_hash();
            record.ts = Utc::now();

            if self.tail_has_duplicate(&record.hash, record.ts)? {
                return Ok(Added::No);
            }

            if let Some(dir) = self.path.parent() {
                fs::create_dir_all(dir)?;
            }
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .with_context(|| format!("Failed to open {}", self.path.display()))?;
            let line = serde_json::to_string(&record).context("Failed to serialize observation")?;
            writeln!(file, "{line}").context("Failed to append observation")?;
            Ok(Added::Yes)
        })
    }

    /// Scan only the last `DEDUP_READ_BYTES` of the file. When the window
    /// starts mid-file the first line is truncated and skipped.
    fn tail_has_duplicate(&self, hash: &str, now: DateTime<Utc>) -> Result<bool> {
        let mut file = match fs::File::open(&self.path) {
            Ok(f) => f,
            Err(_) => return Ok(false),
        };
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(false);
        }

        let read_size = len.min(DEDUP_READ_BYTES);
        file.seek(SeekFrom::Start(len - read_size))?;
        let mut buf = String::new();
        // Invalid UTF-8 at the window edge just means we skip that line.
        let mut bytes = Vec::with_capacity(read_size as usize);
        file.read_to_end(&mut bytes)?;
        buf.push_str(&String::from_utf8_lossy(&bytes));

        let mut lines: Vec<&str> = buf.lines().filter(|l| !l.trim().is_empty()).collect();
        if read_size < len && !lines.is_empty() {
            lines.remove(0);
        }

        for line in lines {
            let Ok(entry) = serde_json::from_str::<ObservationRecord>(line) else {
                continue;
            };
            if entry.hash == hash && (now - entry.ts).num_milliseconds() < DEDUP_WINDOW_MS {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Every parseable record, in file order. Malformed lines are skipped.
    pub fn read_all(&self) -> Vec<ObservationRecord> {
        let Ok(content) = fs::read_to_string(&self.path) else {
            return Vec::new();
        };
        content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect()
    }

    /// Aggregate view used by the session summary and the query server.
    pub fn stats(&self) -> ObservationStats {
        let observations = self.read_all();
        let mut files_modified: Vec<String> = Vec::new();
        let mut commands_run: Vec<String> = Vec::new();
        let mut skills_used: Vec<String> = Vec::new();

        for obs in &observations {
            match obs.kind {
                ObservationKind::Write => {
                    if let Some(file) = &obs.file {
                        if !files_modified.contains(file) {
                            files_modified.push(file.clone());
                        }
                    }
                }
                ObservationKind::Bash => {
                    if let Some(command) = &obs.command {
                        commands_run.push(command.clone());
                    }
                }
                ObservationKind::Skill => {
                    if let Some(skill) = &obs.skill {
                        if !skills_used.contains(skill) {
                            skills_used.push(skill.clone());
                        }
                    }
                }
            }
        }

        let recent_start = commands_run.len().saturating_sub(RECENT_COMMANDS_CAP);
        ObservationStats {
            total: observations.len(),
            files_modified,
            commands_run: commands_run.split_off(recent_start),
            skills_used,
        }
    }

    /// Delete the journal. Called exactly once, when a new session begins.
    pub fn clear(&self) -> Result<()> {
        store::remove(&self.path)
    }
}

/// Aggregates over the journal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObservationStats {
    pub total: usize,
    pub files_modified: Vec<String>,
    pub commands_run: Vec<String>,
    pub skills_used: Vec<String>,
}
