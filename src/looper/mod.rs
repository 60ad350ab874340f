//! Autonomous iteration loop.
//!
//! `loop-state.json` drives the stop-hook decision: while a loop is active
//! the stop event re-injects the loop prompt instead of letting the session
//! end. Iterations are only credited when the cycle actually ran; a
//! rate-limited cycle backs off and retries without touching the counter.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::project::ProjectPaths;
use crate::snapshot;
use crate::store;

const BACKOFF_STEP_SECS: u64 = 60;
const MAX_BACKOFF_SECS: u64 = 300;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopState {
    pub active: bool,
    pub prompt: String,
    pub completion_promise: String,
    pub max_iterations: u32,
    pub current_iteration: u32,
    #[serde(default)]
    pub rate_limit_count: u32,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_rate_limit_at: Option<DateTime<Utc>>,
}

impl LoopState {
    pub fn is_max_reached(&self) -> bool {
        self.active && self.current_iteration >= self.max_iterations
    }

    /// Linear backoff, capped: 60 s after the first rate limit, 120 s after
    /// the second, never more than 300 s.
    pub fn backoff_secs(&self) -> u64 {
        (BACKOFF_STEP_SECS * u64::from(self.rate_limit_count)).min(MAX_BACKOFF_SECS)
    }
}

/// Lock-mediated access to `loop-state.json`.
pub struct LoopStore {
    state_path: PathBuf,
    paths: ProjectPaths,
}

impl LoopStore {
    pub fn new(paths: &ProjectPaths) -> Self {
        Self {
            state_path: paths.loop_state(),
            paths: paths.clone(),
        }
    }

    pub fn load(&self) -> Option<LoopState> {
        store::read_typed(&self.state_path, || None)
    }

    /// Begin a loop at iteration zero, replacing any previous loop. The old
    /// transcript is archived first so the new run starts with a clean log.
    pub fn start(
        &self,
        prompt: &str,
        max_iterations: u32,
        completion_promise: &str,
    ) -> Result<LoopState> {
        store::with_lock(&self.state_path, || {
            if let Err(err) = snapshot::archive_loop_log(&self.paths) {
                tracing::warn!(%err, "failed to archive previous loop transcript");
            }

            let state = LoopState {
                active: true,
                prompt: prompt.to_string(),
                completion_promise: completion_promise.to_string(),
                max_iterations,
                current_iteration: 0,
                rate_limit_count: 0,
                started_at: Utc::now(),
                completed_at: None,
                last_rate_limit_at: None,
            };
            store::write_typed(&self.state_path, &state)?;
            Ok(state)
        })
    }

    /// Credit one completed cycle. No-op when no loop exists.
    pub fn increment_iteration(&self) -> Result<Option<LoopState>> {
        self.mutate(|state| {
            state.current_iteration += 1;
        })
    }

    /// Note a provider rate limit. The iteration counter stays untouched:
    /// the interrupted cycle is retried, never credited.
    pub fn record_rate_limit(&self) -> Result<Option<LoopState>> {
        self.mutate(|state| {
            state.rate_limit_count += 1;
            state.last_rate_limit_at = Some(Utc::now());
        })
    }

    /// Mark the loop finished, keeping the document for inspection.
    pub fn complete(&self) -> Result<Option<LoopState>> {
        self.mutate(|state| {
            state.active = false;
            state.completed_at = Some(Utc::now());
        })
    }

    /// Abandon the loop entirely by removing its document.
    pub fn cancel(&self) -> Result<()> {
        store::with_lock(&self.state_path, || store::remove(&self.state_path))
    }

    fn mutate(&self, f: impl FnOnce(&mut LoopState)) -> Result<Option<LoopState>> {
        store::with_lock(&self.state_path, || {
            let Some(mut state): Option<LoopState> = store::read_typed(&self.state_path, || None)
            else {
                return Ok(None);
            };
            f(&mut state);
            store::write_typed(&self.state_path, &state)?;
            Ok(Some(state))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_store() -> (LoopStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let paths = ProjectPaths::new(dir.path().to_path_buf());
        (LoopStore::new(&paths), dir)
    }

    #[test]
    fn start_resets_counters() {
        let (store, _dir) = make_store();
        let state = store.start("fix the build", 3, "LOOP_DONE").unwrap();

        assert!(state.active);
        assert_eq!(state.current_iteration, 0);
        assert_eq!(state.rate_limit_count, 0);
        assert_eq!(state.max_iterations, 3);
        assert_eq!(state.completion_promise, "LOOP_DONE");
    }

    #[test]
    fn start_archives_previous_transcript() {
        let (store, dir) = make_store();
        let paths = ProjectPaths::new(dir.path().to_path_buf());
        snapshot::append_loop_log(&paths, 1, "first run").unwrap();

        store.start("again", 3, "LOOP_DONE").unwrap();

        assert!(!paths.loop_log().exists());
        let archived: Vec<_> = std::fs::read_dir(paths.loop_log_archive_dir())
            .unwrap()
            .collect();
        assert_eq!(archived.len(), 1);
    }

    #[test]
    fn iteration_counts_toward_max() {
        let (store, _dir) = make_store();
        store.start("task", 3, "LOOP_DONE").unwrap();

        for expected in 1..=2 {
            let state = store.increment_iteration().unwrap().unwrap();
            assert_eq!(state.current_iteration, expected);
            assert!(!state.is_max_reached());
        }
        let state = store.increment_iteration().unwrap().unwrap();
        assert_eq!(state.current_iteration, 3);
        assert!(state.is_max_reached());
    }

    #[test]
    fn rate_limit_backs_off_without_crediting_iteration() {
        let (store, _dir) = make_store();
        store.start("task", 3, "LOOP_DONE").unwrap();
        store.increment_iteration().unwrap();

        let state = store.record_rate_limit().unwrap().unwrap();
        assert_eq!(state.current_iteration, 1);
        assert_eq!(state.rate_limit_count, 1);
        assert_eq!(state.backoff_secs(), 60);

        for _ in 0..10 {
            store.record_rate_limit().unwrap();
        }
        let state = store.load().unwrap();
        assert_eq!(state.backoff_secs(), 300);
        assert_eq!(state.current_iteration, 1);
    }

    #[test]
    fn complete_keeps_document_inactive() {
        let (store, _dir) = make_store();
        store.start("task", 3, "LOOP_DONE").unwrap();

        let state = store.complete().unwrap().unwrap();
        assert!(!state.active);
        assert!(state.completed_at.is_some());
        assert!(!state.is_max_reached());

        // Document survives for status inspection.
        assert!(store.load().is_some());
    }

    #[test]
    fn cancel_removes_document() {
        let (store, _dir) = make_store();
        store.start("task", 3, "LOOP_DONE").unwrap();
        store.cancel().unwrap();
        assert!(store.load().is_none());

        // Cancelling again is fine.
        store.cancel().unwrap();
    }

    #[test]
    fn mutations_without_a_loop_are_noops() {
        let (store, _dir) = make_store();
        assert!(store.increment_iteration().unwrap().is_none());
        assert!(store.record_rate_limit().unwrap().is_none());
        assert!(store.complete().unwrap().is_none());
    }
}
