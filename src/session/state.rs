//! The active session record.

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::project::ProjectPaths;
use crate::session::observations::ObservationLog;
use crate::store;

/// Session record persisted at `sessions/current.json`.
///
/// `prompt_number` increments on every prompt within the same session id and
/// resets to 1 when a new id arrives. `context_injected` is monotonic
/// false→true within one session id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub session_id: String,
    pub project: String,
    pub prompt_number: u32,
    /// Epoch milliseconds of the first prompt in this session.
    pub session_start: i64,
    pub context_injected: bool,
}

/// Manager for the session document. All mutations run under the document's
/// own lock so concurrent prompt-handling processes agree on who is first.
pub struct SessionStore {
    state_path: PathBuf,
    project_label: String,
    observations: ObservationLog,
}

impl SessionStore {
    pub fn new(paths: &ProjectPaths) -> Self {
        Self {
            state_path: paths.session_state(),
            project_label: paths.project_label(),
            observations: ObservationLog::new(paths.observations()),
        }
    }

    /// The observation log bound to this project.
    pub fn observations(&self) -> &ObservationLog {
        &self.observations
    }

    /// Initialize or continue a session.
    ///
    /// Under one lock: a document with a matching id has its prompt number
    /// incremented; anything else (missing, corrupt, different id) starts a
    /// fresh session, which also clears the observation log for the project.
    pub fn init(&self, session_id: &str) -> Result<SessionState> {
        store::with_lock(&self.state_path, || {
            let existing: Option<SessionState> = store::read_typed(&self.state_path, || None);

            if let Some(mut session) = existing {
                if session.session_id == session_id {
                    session.prompt_number += 1;
                    store::write_typed(&self.state_path, &session)?;
                    return Ok(session);
                }
            }

            // New session: previous observations belong to the old one.
            if let Err(err) = self.observations.clear() {
                tracing::warn!(%err, "failed to clear observation log for new session");
            }

            let session = SessionState {
                session_id: session_id.to_string(),
                project: self.project_label.clone(),
                prompt_number: 1,
                session_start: Utc::now().timestamp_millis(),
                context_injected: false,
            };
            store::write_typed(&self.state_path, &session)?;
            Ok(session)
        })
    }

    /// Current session record, if any.
    pub fn load(&self) -> Option<SessionState> {
        store::read_typed(&self.state_path, || None)
    }

    /// Atomic check-and-set of the context-injected flag.
    ///
    /// Returns `true` exactly once per session id. The read and the write
    /// share one lock acquisition; splitting them would let two concurrent
    /// prompt handlers both observe "not injected" and double-inject.
    pub fn check_and_mark_injected(&self) -> Result<bool> {
        store::with_lock(&self.state_path, || {
            let existing: Option<SessionState> = store::read_typed(&self.state_path, || None);
            let Some(mut session) = existing else {
                return Ok(false);
            };
            if session.context_injected {
                return Ok(false);
            }
            session.context_injected = true;
            store::write_typed(&self.state_path, &session)?;
            Ok(true)
        })
    }

    /// Remove the session document (clean session end).
    pub fn clear(&self) -> Result<()> {
        store::with_lock(&self.state_path, || store::remove(&self.state_path))
    }
}
