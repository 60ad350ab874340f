//! Multi-agent team state.
//!
//! `team-state.json` is shared by every hook process a team member fires,
//! so each mutation is a full read-modify-write under the file's lock.
//! Task assignment is the contended path: two members finishing at the same
//! moment may both pick the same next task, and the loser must be told so
//! it can look for other work instead of double-executing.

pub mod coordinator;

pub use coordinator::{get_next_assignment, Assignment};

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::errors::TeamError;
use crate::project::ProjectPaths;
use crate::store;

const MAX_HISTORY_EVENTS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemberStatus {
    Active,
    Idle,
    Paused,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub id: String,
    pub status: MemberStatus,
    #[serde(default)]
    pub current_task: Option<String>,
    #[serde(default)]
    pub worktree_path: Option<String>,
    #[serde(default)]
    pub joined_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_active_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamTask {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub assignee: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub assigned_at: Option<DateTime<Utc>>,
}

impl TeamTask {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            assignee: None,
            status: TaskStatus::Pending,
            assigned_at: None,
        }
    }

    /// A reference matches a task by id or by description, case-insensitively.
    fn matches(&self, task_ref: &str) -> bool {
        let needle = task_ref.trim().to_lowercase();
        !needle.is_empty()
            && (self.id.to_lowercase() == needle || self.description.to_lowercase() == needle)
    }

    fn release(&mut self) {
        self.assignee = None;
        self.status = TaskStatus::Pending;
        self.assigned_at = None;
    }
}

/// Ledger entry for finished work, kept separately from the queue so that
/// completed tasks stay reportable after queue cleanup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedTask {
    pub agent_id: String,
    pub task_id: String,
    pub result: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEvent {
    pub event: String,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamState {
    pub version: String,
    pub enabled: bool,
    #[serde(default)]
    pub feature: Option<String>,
    #[serde(default)]
    pub members: Vec<TeamMember>,
    #[serde(default)]
    pub task_queue: Vec<TeamTask>,
    #[serde(default)]
    pub completed_tasks: Vec<CompletedTask>,
    #[serde(default)]
    pub history: Vec<HistoryEvent>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for TeamState {
    fn default() -> Self {
        Self {
            version: "1.1".to_string(),
            enabled: false,
            feature: None,
            members: Vec::new(),
            task_queue: Vec::new(),
            completed_tasks: Vec::new(),
            history: Vec::new(),
            updated_at: None,
        }
    }
}

impl TeamState {
    fn push_history(&mut self, event: &str, member_id: Option<&str>, task_id: Option<&str>) {
        self.history.push(HistoryEvent {
            event: event.to_string(),
            at: Utc::now(),
            member_id: member_id.map(str::to_string),
            task_id: task_id.map(str::to_string),
            detail: None,
        });
        if self.history.len() > MAX_HISTORY_EVENTS {
            let excess = self.history.len() - MAX_HISTORY_EVENTS;
            self.history.drain(..excess);
        }
    }

    fn release_assignments_of(&mut self, member_id: &str) -> bool {
        let target = member_id.trim().to_lowercase();
        let mut updated = false;
        for task in &mut self.task_queue {
            if task.status == TaskStatus::Completed {
                continue;
            }
            if task
                .assignee
                .as_deref()
                .is_some_and(|a| a.trim().to_lowercase() == target)
            {
                task.release();
                updated = true;
            }
        }
        updated
    }
}

/// Result of the idle-event batch.
#[derive(Debug, Clone)]
pub struct IdleOutcome {
    pub enabled: bool,
    pub assignment: Option<Assignment>,
    pub pending_tasks: usize,
}

/// Outcome of an assignment attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignOutcome {
    Assigned,
    /// The caller already holds this task; safe to proceed.
    AlreadyAssigned,
    /// Another member committed first; the caller must pick different work.
    LostRace { holder: String },
    NotFound,
}

/// How `finalize_on_stop` should treat surviving state.
#[derive(Debug, Clone, Copy)]
pub struct StopPolicy {
    pub clear_all: bool,
    pub stale_member_ms: i64,
}

#[derive(Debug, Clone, Default)]
pub struct FinalizeReport {
    pub paused_members: Vec<String>,
    pub released_tasks: Vec<String>,
    pub pruned_members: Vec<String>,
    pub cleared: bool,
}

/// Lock-mediated access to `team-state.json`.
pub struct TeamStore {
    state_path: PathBuf,
}

impl TeamStore {
    pub fn new(paths: &ProjectPaths) -> Self {
        Self {
            state_path: paths.team_state(),
        }
    }

    pub fn load(&self) -> TeamState {
        store::read_typed(&self.state_path, TeamState::default)
    }

    fn save(&self, state: &mut TeamState) -> Result<()> {
        state.updated_at = Some(Utc::now());
        store::write_typed(&self.state_path, state)
    }

    /// Upsert a member. Entering `active` stamps `lastActiveAt`.
    pub fn update_member_status(
        &self,
        member_id: &str,
        status: MemberStatus,
        current_task: Option<&str>,
        worktree_path: Option<&str>,
    ) -> Result<TeamState> {
        store::with_lock(&self.state_path, || {
            let mut state = self.load();
            let now = Utc::now();

            match state.members.iter_mut().find(|m| m.id == member_id) {
                Some(member) => {
                    member.status = status;
                    member.current_task = current_task.map(str::to_string);
                    if let Some(path) = worktree_path {
                        member.worktree_path = Some(path.to_string());
                    }
                    member.last_active_at = Some(now);
                    if member.joined_at.is_none() {
                        member.joined_at = Some(now);
                    }
                }
                None => state.members.push(TeamMember {
                    id: member_id.to_string(),
                    status,
                    current_task: current_task.map(str::to_string),
                    worktree_path: worktree_path.map(str::to_string),
                    joined_at: Some(now),
                    last_active_at: Some(now),
                }),
            }

            state.push_history("member_status_updated", Some(member_id), None);
            self.save(&mut state)?;
            Ok(state)
        })
    }

    /// Claim a task for a member. The check and the commit share one lock,
    /// so exactly one of any set of racing claimants wins.
    pub fn assign_task(
        &self,
        task_ref: &str,
        member_id: &str,
    ) -> Result<AssignOutcome, TeamError> {
        store::with_lock(&self.state_path, || {
            let mut state = self.load();
            if !state.enabled {
                return Ok(Err(TeamError::Disabled));
            }
            let Some(task) = state.task_queue.iter_mut().find(|t| t.matches(task_ref)) else {
                return Ok(Ok(AssignOutcome::NotFound));
            };

            let member_ref = member_id.trim().to_lowercase();
            if let Some(holder) = task.assignee.as_deref() {
                if holder.trim().to_lowercase() == member_ref {
                    return Ok(Ok(AssignOutcome::AlreadyAssigned));
                }
                return Ok(Ok(AssignOutcome::LostRace {
                    holder: holder.to_string(),
                }));
            }

            task.assignee = Some(member_id.to_string());
            task.status = TaskStatus::InProgress;
            task.assigned_at = Some(Utc::now());
            let task_id = task.id.clone();

            state.push_history("task_assigned", Some(member_id), Some(&task_id));
            self.save(&mut state)?;
            Ok(Ok(AssignOutcome::Assigned))
        })?
    }

    /// Seed or replace the task queue. Used when a team session begins.
    pub fn sync_task_queue(&self, feature: &str, tasks: Vec<TeamTask>) -> Result<TeamState> {
        store::with_lock(&self.state_path, || {
            let mut state = self.load();
            state.enabled = true;
            state.feature = Some(feature.to_string());
            state.task_queue = tasks;
            state.push_history("task_queue_initialized", None, None);
            self.save(&mut state)?;
            Ok(state)
        })
    }

    /// Return every assignment held by a member to the pending pool.
    pub fn release_assignments(&self, member_id: &str) -> Result<TeamState> {
        store::with_lock(&self.state_path, || {
            let mut state = self.load();
            if state.release_assignments_of(member_id) {
                state.push_history("task_unassigned", Some(member_id), None);
                self.save(&mut state)?;
            }
            Ok(state)
        })
    }

    /// The idle-event batch: stale cleanup, marking the member idle, and
    /// claiming the next pending task for it, all inside one lock so no
    /// other process observes the member idle-but-unassigned.
    pub fn handle_idle(
        &self,
        member_id: &str,
        worktree_path: Option<&str>,
        stale_member_ms: i64,
    ) -> Result<IdleOutcome> {
        store::with_lock(&self.state_path, || {
            let mut state = self.load();
            if !state.enabled {
                return Ok(IdleOutcome {
                    enabled: false,
                    assignment: None,
                    pending_tasks: 0,
                });
            }

            prune_stale(&mut state, Duration::milliseconds(stale_member_ms));

            let now = Utc::now();
            match state.members.iter_mut().find(|m| m.id == member_id) {
                Some(member) => {
                    member.status = MemberStatus::Idle;
                    member.current_task = None;
                    if let Some(path) = worktree_path {
                        member.worktree_path = Some(path.to_string());
                    }
                    member.last_active_at = Some(now);
                }
                None => state.members.push(TeamMember {
                    id: member_id.to_string(),
                    status: MemberStatus::Idle,
                    current_task: None,
                    worktree_path: worktree_path.map(str::to_string),
                    joined_at: Some(now),
                    last_active_at: Some(now),
                }),
            }

            let assignment = get_next_assignment(&state, None, Some(member_id))
                .filter(|next| next.member_id == member_id);
            if let Some(next) = &assignment {
                if let Some(task) = state.task_queue.iter_mut().find(|t| t.id == next.task_id) {
                    task.assignee = Some(member_id.to_string());
                    task.status = TaskStatus::InProgress;
                    task.assigned_at = Some(now);
                }
                if let Some(member) = state.members.iter_mut().find(|m| m.id == member_id) {
                    member.status = MemberStatus::Active;
                    member.current_task = Some(next.task_id.clone());
                }
                state.push_history("task_assigned", Some(member_id), Some(&next.task_id));
            }

            let pending_tasks = state
                .task_queue
                .iter()
                .filter(|t| t.status == TaskStatus::Pending && t.assignee.is_none())
                .count();

            self.save(&mut state)?;
            Ok(IdleOutcome {
                enabled: true,
                assignment,
                pending_tasks,
            })
        })
    }

    /// Record finished work: ledger entry, member back to idle (or failed),
    /// the task removed from the queue, and any other assignments of the
    /// member released. One lock covers all four mutations.
    pub fn record_task_completion(
        &self,
        member_id: &str,
        task_id: Option<&str>,
        result: &str,
    ) -> Result<TeamState> {
        store::with_lock(&self.state_path, || {
            let mut state = self.load();
            let now = Utc::now();
            let failed = result == "failed";

            state.completed_tasks.push(CompletedTask {
                agent_id: member_id.to_string(),
                task_id: task_id.unwrap_or("(untracked)").to_string(),
                result: result.to_string(),
                completed_at: now,
            });

            if let Some(member) = state.members.iter_mut().find(|m| m.id == member_id) {
                member.status = if failed {
                    MemberStatus::Failed
                } else {
                    MemberStatus::Idle
                };
                member.current_task = None;
                member.last_active_at = Some(now);
            }

            if let Some(id) = task_id {
                state.task_queue.retain(|t| !t.matches(id));
            }
            state.release_assignments_of(member_id);

            state.push_history("task_completed", Some(member_id), task_id);
            self.save(&mut state)?;
            Ok(state)
        })
    }

    /// Prune non-active members unseen for longer than `max_age`, releasing
    /// their task assignments. Returns the pruned ids.
    pub fn cleanup_stale_members(&self, max_age: Duration) -> Result<Vec<String>> {
        store::with_lock(&self.state_path, || {
            let mut state = self.load();
            let removed = prune_stale(&mut state, max_age);
            if removed.is_empty() {
                return Ok(removed);
            }
            state.push_history("members_pruned", None, None);
            self.save(&mut state)?;
            Ok(removed)
        })
    }

    /// Session-stop finalization, all in one lock acquisition: active
    /// members are paused and their in-flight tasks returned to the pool,
    /// stale members pruned, and the whole document cleared when the policy
    /// says so. No intermediate state is ever on disk.
    pub fn finalize_on_stop(&self, policy: StopPolicy) -> Result<FinalizeReport> {
        store::with_lock(&self.state_path, || {
            let mut state = self.load();
            let mut report = FinalizeReport::default();

            if policy.clear_all {
                let mut cleared = TeamState::default();
                self.save(&mut cleared)?;
                report.cleared = true;
                return Ok(report);
            }

            let now = Utc::now();
            for member in &mut state.members {
                if member.status == MemberStatus::Active {
                    member.status = MemberStatus::Paused;
                    member.current_task = None;
                    member.last_active_at = Some(now);
                    report.paused_members.push(member.id.clone());
                }
            }
            for task in &mut state.task_queue {
                if task.status == TaskStatus::InProgress {
                    report.released_tasks.push(task.id.clone());
                    task.release();
                }
            }
            report.pruned_members =
                prune_stale(&mut state, Duration::milliseconds(policy.stale_member_ms));

            state.push_history("session_stopped", None, None);
            self.save(&mut state)?;
            Ok(report)
        })
    }

    pub fn clear(&self) -> Result<()> {
        store::with_lock(&self.state_path, || {
            let mut state = TeamState::default();
            self.save(&mut state)
        })
    }
}

fn prune_stale(state: &mut TeamState, max_age: Duration) -> Vec<String> {
    if max_age <= Duration::zero() {
        return Vec::new();
    }
    let now = Utc::now();
    let removed: Vec<String> = state
        .members
        .iter()
        .filter(|m| {
            m.status != MemberStatus::Active
                && m.last_active_at
                    .or(m.joined_at)
                    .is_some_and(|seen| now - seen >= max_age)
        })
        .map(|m| m.id.clone())
        .collect();

    if removed.is_empty() {
        return removed;
    }
    for id in &removed {
        state.release_assignments_of(id);
    }
    state.members.retain(|m| !removed.contains(&m.id));
    removed
}
