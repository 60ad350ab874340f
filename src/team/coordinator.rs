//! Pure assignment planning.
//!
//! `get_next_assignment` only computes a recommendation; it never touches
//! disk. The recommendation is committed (or rejected) by
//! [`TeamStore::assign_task`](super::TeamStore::assign_task), which is where
//! racing recommendations get serialized.

use super::{MemberStatus, TaskStatus, TeamState};

/// A recommended pairing of an idle member and a pending task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub member_id: String,
    pub task_id: String,
    pub description: String,
}

/// Pick the next pairing: the first pending unassigned task in queue order
/// and an idle member. `completed_task_id` is excluded because the caller
/// typically consults the plan before its own completion write is visible.
/// `for_member` is preferred when that member is idle.
pub fn get_next_assignment(
    state: &TeamState,
    completed_task_id: Option<&str>,
    for_member: Option<&str>,
) -> Option<Assignment> {
    let task = state.task_queue.iter().find(|task| {
        task.status == TaskStatus::Pending
            && task.assignee.is_none()
            && completed_task_id != Some(task.id.as_str())
    })?;

    let idle = |id: &str| {
        state
            .members
            .iter()
            .any(|m| m.id == id && m.status == MemberStatus::Idle)
    };
    let member_id = match for_member {
        Some(id) if idle(id) => id.to_string(),
        _ => state
            .members
            .iter()
            .find(|m| m.status == MemberStatus::Idle)?
            .id
            .clone(),
    };

    Some(Assignment {
        member_id,
        task_id: task.id.clone(),
        description: task.description.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::team::{TeamMember, TeamTask};
    use chrono::Utc;

    fn member(id: &str, status: MemberStatus) -> TeamMember {
        TeamMember {
            id: id.to_string(),
            status,
            current_task: None,
            worktree_path: None,
            joined_at: Some(Utc::now()),
            last_active_at: Some(Utc::now()),
        }
    }

    fn state_with(members: Vec<TeamMember>, tasks: Vec<TeamTask>) -> TeamState {
        TeamState {
            enabled: true,
            members,
            task_queue: tasks,
            ..TeamState::default()
        }
    }

    #[test]
    fn picks_first_pending_task_and_idle_member() {
        let mut claimed = TeamTask::new("t-001", "entity");
        claimed.assignee = Some("worker-1".to_string());
        claimed.status = TaskStatus::InProgress;

        let state = state_with(
            vec![
                member("worker-1", MemberStatus::Active),
                member("worker-2", MemberStatus::Idle),
            ],
            vec![claimed, TeamTask::new("t-002", "repository")],
        );

        let next = get_next_assignment(&state, None, None).unwrap();
        assert_eq!(next.member_id, "worker-2");
        assert_eq!(next.task_id, "t-002");
    }

    #[test]
    fn excludes_just_completed_task() {
        let state = state_with(
            vec![member("worker-1", MemberStatus::Idle)],
            vec![
                TeamTask::new("t-001", "entity"),
                TeamTask::new("t-002", "repository"),
            ],
        );

        let next = get_next_assignment(&state, Some("t-001"), None).unwrap();
        assert_eq!(next.task_id, "t-002");
    }

    #[test]
    fn prefers_requesting_member_when_idle() {
        let state = state_with(
            vec![
                member("worker-1", MemberStatus::Idle),
                member("worker-2", MemberStatus::Idle),
            ],
            vec![TeamTask::new("t-001", "entity")],
        );

        let next = get_next_assignment(&state, None, Some("worker-2")).unwrap();
        assert_eq!(next.member_id, "worker-2");

        // A busy requester falls back to whoever is idle.
        let next = get_next_assignment(&state, None, Some("worker-9")).unwrap();
        assert_eq!(next.member_id, "worker-1");
    }

    #[test]
    fn none_when_no_idle_member_or_no_task() {
        let busy = state_with(
            vec![member("worker-1", MemberStatus::Active)],
            vec![TeamTask::new("t-001", "entity")],
        );
        assert!(get_next_assignment(&busy, None, None).is_none());

        let empty = state_with(vec![member("worker-1", MemberStatus::Idle)], vec![]);
        assert!(get_next_assignment(&empty, None, None).is_none());
    }

    #[test]
    fn never_mutates_input() {
        let state = state_with(
            vec![member("worker-1", MemberStatus::Idle)],
            vec![TeamTask::new("t-001", "entity")],
        );
        let before = state.clone();
        get_next_assignment(&state, None, None);
        assert_eq!(state, before);
    }
}
