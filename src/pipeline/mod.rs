//! Nine-phase feature-delivery pipeline.
//!
//! State lives in `.steward/pipeline/status.json`. Every mutation happens
//! under the status file's lock, so concurrent hook processes observe a
//! consistent phase pointer. Advancing past the last phase is idempotent:
//! repeated calls keep reporting completion without corrupting history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::config::StewardConfig;
use crate::errors::PipelineError;
use crate::project::ProjectPaths;
use crate::store;

/// A configured phase before any run state attaches to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseSpec {
    pub id: u32,
    pub name: String,
    pub agent: String,
}

impl PhaseSpec {
    fn new(id: u32, name: &str, agent: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            agent: agent.to_string(),
        }
    }
}

/// The built-in roster used when the config declares no phases.
pub fn default_phases() -> Vec<PhaseSpec> {
    vec![
        PhaseSpec::new(1, "Schema", "dba-expert"),
        PhaseSpec::new(2, "Convention", "spring-architect"),
        PhaseSpec::new(3, "Infra", "infra-expert"),
        PhaseSpec::new(4, "Feature", "domain-expert"),
        PhaseSpec::new(5, "Integration", "service-expert"),
        PhaseSpec::new(6, "Testing", "test-expert"),
        PhaseSpec::new(7, "Performance", "dba-expert"),
        PhaseSpec::new(8, "Review", "code-reviewer"),
        PhaseSpec::new(9, "Deployment", "devops-engineer"),
    ]
}

/// Run state of a single phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PhaseStatus {
    Pending,
    InProgress,
    Completed,
}

/// A phase with its run state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseEntry {
    pub id: u32,
    pub name: String,
    pub agent: String,
    pub status: PhaseStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// One audit line. Field presence depends on the action: `start` carries
/// the phase it opened, `next` carries both endpoints of the transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub action: String,
    pub feature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_phase_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_phase_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_phase_id: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_phase_name: Option<String>,
    pub at: DateTime<Utc>,
}

/// The whole on-disk pipeline document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineStatus {
    pub version: u32,
    pub feature: String,
    pub current_phase: u32,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub phases: Vec<PhaseEntry>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl PipelineStatus {
    fn initial(feature: &str, phases: &[PhaseSpec]) -> Self {
        let ts = Utc::now();
        let first = &phases[0];
        Self {
            version: 1,
            feature: feature.to_string(),
            current_phase: first.id,
            started_at: ts,
            updated_at: ts,
            completed_at: None,
            phases: phases
                .iter()
                .enumerate()
                .map(|(index, phase)| PhaseEntry {
                    id: phase.id,
                    name: phase.name.clone(),
                    agent: phase.agent.clone(),
                    status: if index == 0 {
                        PhaseStatus::InProgress
                    } else {
                        PhaseStatus::Pending
                    },
                    started_at: (index == 0).then_some(ts),
                    completed_at: None,
                })
                .collect(),
            history: vec![HistoryEntry {
                action: "start".to_string(),
                feature: feature.to_string(),
                phase_id: Some(first.id),
                phase_name: Some(first.name.clone()),
                from_phase_id: None,
                from_phase_name: None,
                to_phase_id: None,
                to_phase_name: None,
                at: ts,
            }],
        }
    }

    pub fn current_entry(&self) -> Option<&PhaseEntry> {
        self.phases.iter().find(|p| p.id == self.current_phase)
    }

    fn next_entry_index(&self) -> Option<usize> {
        let idx = self.phases.iter().position(|p| p.id == self.current_phase)?;
        (idx + 1 < self.phases.len()).then_some(idx + 1)
    }
}

/// Result of `start`: either a fresh document or the in-flight one.
#[derive(Debug, Clone)]
pub struct StartOutcome {
    pub state: PipelineStatus,
    pub reused: bool,
}

/// Result of `advance`. `advanced` and `completed` are mutually exclusive;
/// both false never occurs on success.
#[derive(Debug, Clone)]
pub struct AdvanceOutcome {
    pub state: PipelineStatus,
    pub advanced: bool,
    pub completed: bool,
    pub from: PhaseEntry,
    pub to: Option<PhaseEntry>,
}

/// Progress rollup for display and the query server.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineSummary {
    pub feature: String,
    pub current_phase: Option<PhaseSummary>,
    pub progress: Progress,
    pub completed: bool,
    pub updated_at: DateTime<Utc>,
    pub phases: Vec<PhaseEntry>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseSummary {
    pub id: u32,
    pub name: String,
    pub agent: String,
    pub status: PhaseStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub percent: u32,
}

/// Lock-mediated access to the pipeline status file.
pub struct PipelineStore {
    status_path: PathBuf,
    phases: Vec<PhaseSpec>,
}

impl PipelineStore {
    pub fn new(paths: &ProjectPaths, config: &StewardConfig) -> Self {
        Self {
            status_path: paths.pipeline_status(),
            phases: configured_phases(config),
        }
    }

    pub fn load(&self) -> Option<PipelineStatus> {
        store::read_typed(&self.status_path, || None)
    }

    /// Begin a pipeline run. Re-running for the same unfinished feature
    /// returns the existing document untouched unless `reset` is set.
    pub fn start(&self, feature: &str, reset: bool) -> Result<StartOutcome, PipelineError> {
        store::with_lock(&self.status_path, || {
            let existing: Option<PipelineStatus> = store::read_typed(&self.status_path, || None);
            if let Some(state) = existing {
                if !reset && state.feature == feature && state.completed_at.is_none() {
                    return Ok(StartOutcome {
                        state,
                        reused: true,
                    });
                }
            }

            let state = PipelineStatus::initial(feature, &self.phases);
            store::write_typed(&self.status_path, &state)?;
            Ok(StartOutcome {
                state,
                reused: false,
            })
        })
        .map_err(PipelineError::from)
    }

    /// Complete the current phase and move the pointer to the next one.
    /// Past the final phase this stamps `completedAt` once and then keeps
    /// answering `completed` without further state changes beyond history.
    pub fn advance(&self) -> Result<AdvanceOutcome, PipelineError> {
        let outcome = store::with_lock(&self.status_path, || {
            let Some(mut state): Option<PipelineStatus> =
                store::read_typed(&self.status_path, || None)
            else {
                return Ok(Err(PipelineError::NotStarted));
            };

            let ts = Utc::now();
            let Some(current_idx) = state.phases.iter().position(|p| p.id == state.current_phase)
            else {
                return Ok(Err(PipelineError::PhaseMissing {
                    phase_id: state.current_phase,
                }));
            };

            let completed_now = {
                let current = &mut state.phases[current_idx];
                if current.status != PhaseStatus::Completed {
                    current.status = PhaseStatus::Completed;
                    current.completed_at = Some(ts);
                    if current.started_at.is_none() {
                        current.started_at = Some(ts);
                    }
                    true
                } else {
                    false
                }
            };
            let from = state.phases[current_idx].clone();

            let Some(next_idx) = state.next_entry_index() else {
                if state.completed_at.is_none() {
                    state.completed_at = Some(ts);
                }
                state.updated_at = ts;
                state.history.push(HistoryEntry {
                    action: if completed_now {
                        "complete-final".to_string()
                    } else {
                        "complete-noop".to_string()
                    },
                    feature: state.feature.clone(),
                    phase_id: Some(state.current_phase),
                    phase_name: Some(from.name.clone()),
                    from_phase_id: None,
                    from_phase_name: None,
                    to_phase_id: None,
                    to_phase_name: None,
                    at: ts,
                });
                store::write_typed(&self.status_path, &state)?;
                return Ok(Ok(AdvanceOutcome {
                    state,
                    advanced: false,
                    completed: true,
                    from,
                    to: None,
                }));
            };

            {
                let next = &mut state.phases[next_idx];
                next.status = PhaseStatus::InProgress;
                if next.started_at.is_none() {
                    next.started_at = Some(ts);
                }
            }
            let to = state.phases[next_idx].clone();

            state.current_phase = to.id;
            state.updated_at = ts;
            state.history.push(HistoryEntry {
                action: "next".to_string(),
                feature: state.feature.clone(),
                phase_id: None,
                phase_name: None,
                from_phase_id: Some(from.id),
                from_phase_name: Some(from.name.clone()),
                to_phase_id: Some(to.id),
                to_phase_name: Some(to.name.clone()),
                at: ts,
            });
            store::write_typed(&self.status_path, &state)?;

            Ok(Ok(AdvanceOutcome {
                state,
                advanced: true,
                completed: false,
                from,
                to: Some(to),
            }))
        })?;
        outcome
    }
}

/// Phases from config, normalized: defaults when empty, sorted by id.
fn configured_phases(config: &StewardConfig) -> Vec<PhaseSpec> {
    let mut phases = config.pipeline.phases.clone();
    if phases.is_empty() {
        return default_phases();
    }
    phases.sort_by_key(|p| p.id);
    phases
}

/// Progress rollup over a loaded status document.
pub fn summarize(state: &PipelineStatus) -> PipelineSummary {
    let completed_count = state
        .phases
        .iter()
        .filter(|p| p.status == PhaseStatus::Completed)
        .count();
    let total = state.phases.len();

    PipelineSummary {
        feature: state.feature.clone(),
        current_phase: state.current_entry().map(|current| PhaseSummary {
            id: current.id,
            name: current.name.clone(),
            agent: current.agent.clone(),
            status: current.status,
        }),
        progress: Progress {
            completed: completed_count,
            total,
            percent: if total > 0 {
                ((completed_count as f64 / total as f64) * 100.0).round() as u32
            } else {
                0
            },
        },
        completed: state.completed_at.is_some(),
        updated_at: state.updated_at,
        phases: state.phases.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn make_store() -> (PipelineStore, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let paths = ProjectPaths::new(dir.path().to_path_buf());
        let store = PipelineStore::new(&paths, &StewardConfig::default());
        (store, dir)
    }

    #[test]
    fn start_creates_nine_phase_document() {
        let (store, _dir) = make_store();
        let outcome = store.start("user-auth", false).unwrap();

        assert!(!outcome.reused);
        assert_eq!(outcome.state.feature, "user-auth");
        assert_eq!(outcome.state.current_phase, 1);
        assert_eq!(outcome.state.phases.len(), 9);
        assert_eq!(outcome.state.phases[0].status, PhaseStatus::InProgress);
        assert_eq!(outcome.state.phases[1].status, PhaseStatus::Pending);
        assert_eq!(outcome.state.history.len(), 1);
        assert_eq!(outcome.state.history[0].action, "start");
    }

    #[test]
    fn start_reuses_unfinished_run_for_same_feature() {
        let (store, _dir) = make_store();
        let first = store.start("user-auth", false).unwrap();
        store.advance().unwrap();

        let second = store.start("user-auth", false).unwrap();
        assert!(second.reused);
        assert_eq!(second.state.current_phase, 2);
        assert_eq!(second.state.started_at, first.state.started_at);
    }

    #[test]
    fn start_with_reset_discards_existing_run() {
        let (store, _dir) = make_store();
        store.start("user-auth", false).unwrap();
        store.advance().unwrap();

        let outcome = store.start("user-auth", true).unwrap();
        assert!(!outcome.reused);
        assert_eq!(outcome.state.current_phase, 1);
    }

    #[test]
    fn new_feature_replaces_old_run() {
        let (store, _dir) = make_store();
        store.start("user-auth", false).unwrap();
        let outcome = store.start("billing", false).unwrap();
        assert!(!outcome.reused);
        assert_eq!(outcome.state.feature, "billing");
    }

    #[test]
    fn advance_moves_pointer_and_records_transition() {
        let (store, _dir) = make_store();
        store.start("user-auth", false).unwrap();

        for _ in 0..4 {
            let outcome = store.advance().unwrap();
            assert!(outcome.advanced);
            assert!(!outcome.completed);
        }

        let state = store.load().unwrap();
        assert_eq!(state.current_phase, 5);
        assert_eq!(
            state
                .phases
                .iter()
                .filter(|p| p.status == PhaseStatus::Completed)
                .count(),
            4
        );
        let last = state.history.last().unwrap();
        assert_eq!(last.action, "next");
        assert_eq!(last.from_phase_id, Some(4));
        assert_eq!(last.to_phase_id, Some(5));
    }

    #[test]
    fn advance_past_final_phase_is_idempotent() {
        let (store, _dir) = make_store();
        store.start("user-auth", false).unwrap();
        for _ in 0..8 {
            store.advance().unwrap();
        }

        let final_advance = store.advance().unwrap();
        assert!(!final_advance.advanced);
        assert!(final_advance.completed);
        let completed_at = final_advance.state.completed_at.unwrap();

        let again = store.advance().unwrap();
        assert!(again.completed);
        assert_eq!(again.state.completed_at, Some(completed_at));
        assert_eq!(again.state.history.last().unwrap().action, "complete-noop");
    }

    #[test]
    fn advance_without_start_is_an_error() {
        let (store, _dir) = make_store();
        match store.advance() {
            Err(PipelineError::NotStarted) => {}
            other => panic!("expected NotStarted, got {other:?}"),
        }
    }

    #[test]
    fn configured_phases_override_defaults() {
        let dir = tempdir().unwrap();
        let paths = ProjectPaths::new(dir.path().to_path_buf());
        let mut config = StewardConfig::default();
        config.pipeline.phases = vec![
            PhaseSpec::new(2, "Ship", "devops-engineer"),
            PhaseSpec::new(1, "Build", "domain-expert"),
        ];
        let store = PipelineStore::new(&paths, &config);

        let outcome = store.start("tiny", false).unwrap();
        assert_eq!(outcome.state.phases.len(), 2);
        assert_eq!(outcome.state.phases[0].name, "Build");

        store.advance().unwrap();
        let done = store.advance().unwrap();
        assert!(done.completed);
    }

    #[test]
    fn summarize_reports_progress_percent() {
        let (store, _dir) = make_store();
        store.start("user-auth", false).unwrap();
        store.advance().unwrap();
        store.advance().unwrap();

        let summary = summarize(&store.load().unwrap());
        assert_eq!(summary.progress.completed, 2);
        assert_eq!(summary.progress.total, 9);
        assert_eq!(summary.progress.percent, 22);
        assert_eq!(summary.current_phase.unwrap().id, 3);
        assert!(!summary.completed);
    }
}
