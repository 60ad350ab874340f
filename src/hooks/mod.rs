//! Lifecycle hook protocol.
//!
//! Each hook invocation is a short-lived process: the host writes one JSON
//! event to stdin, the handler does its work against the file-backed
//! stores, and exactly one JSON response object goes to stdout. Stdout
//! belongs to the protocol; diagnostics go to stderr via `tracing`.
//!
//! The contract that matters most here: a handler never exits without
//! printing its envelope, including on internal error. Dispatch catches
//! handler failures, logs them, and emits `{}`.

pub mod handlers;
pub mod types;

pub use types::{Decision, HookEvent, HookResponse};

use std::io::Read;

use crate::config::StewardConfig;
use crate::orchestrator;
use crate::project::ProjectPaths;

/// The hook events steward handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookKind {
    SessionStart,
    UserPrompt,
    PostTool,
    SubagentStop,
    TeamIdle,
    Stop,
}

/// Read one event from the reader. Empty or malformed input yields the
/// empty event rather than an error; hosts sometimes send nothing at all.
pub fn read_event(reader: &mut impl Read) -> HookEvent {
    let mut input = String::new();
    if reader.read_to_string(&mut input).is_err() {
        return HookEvent::default();
    }
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return HookEvent::default();
    }
    serde_json::from_str(trimmed).unwrap_or_else(|err| {
        tracing::warn!(%err, "malformed hook event, substituting empty event");
        HookEvent::default()
    })
}

/// Serialize a response to the one-line stdout form.
pub fn render(response: &HookResponse) -> String {
    serde_json::to_string(response).unwrap_or_else(|_| "{}".to_string())
}

/// Run the handler for `kind`, never failing: any handler error is logged
/// and downgraded to the empty acknowledgement.
pub fn dispatch(
    kind: HookKind,
    paths: &ProjectPaths,
    config: &StewardConfig,
    event: &HookEvent,
) -> HookResponse {
    let result = match kind {
        HookKind::SessionStart => handlers::session_start(paths, config, event),
        HookKind::UserPrompt => handlers::user_prompt(paths, config, event),
        HookKind::PostTool => handlers::post_tool(paths, config, event),
        HookKind::SubagentStop => handlers::subagent_stop(paths, config, event),
        HookKind::TeamIdle => handlers::team_idle(paths, config, event),
        HookKind::Stop => orchestrator::handle_stop(paths, config, event),
    };
    result.unwrap_or_else(|err| {
        tracing::error!(%err, "hook handler failed");
        HookResponse::empty()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_malformed_stdin_become_empty_events() {
        let event = read_event(&mut "".as_bytes());
        assert!(event.session_id.is_none());

        let event = read_event(&mut "   \n".as_bytes());
        assert!(event.session_id.is_none());

        let event = read_event(&mut "{not json".as_bytes());
        assert!(event.session_id.is_none());
    }

    #[test]
    fn valid_event_parses() {
        let event = read_event(&mut r#"{"session_id":"s-1","prompt":"hi"}"#.as_bytes());
        assert_eq!(event.session_id.as_deref(), Some("s-1"));
        assert_eq!(event.prompt.as_deref(), Some("hi"));
    }

    #[test]
    fn render_always_produces_json() {
        assert_eq!(render(&HookResponse::empty()), "{}");
        assert!(render(&HookResponse::message("hi")).contains("systemMessage"));
    }
}
