//! Agent-specific stop finalizers.
//!
//! Which agent ran last is recorded in a marker file by the subagent-stop
//! handler. On session stop the marker resolves to a closed [`AgentKind`];
//! unknown markers resolve to `Unknown`, whose finalizer is a no-op. The
//! marker is cleared whether or not a finalizer ran.

use anyhow::Result;
use std::fs;

use crate::project::ProjectPaths;
use crate::snapshot;

/// The agents that get a stop-time finalizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    DbaExpert,
    SpringArchitect,
    InfraExpert,
    DomainExpert,
    ServiceExpert,
    TestExpert,
    CodeReviewer,
    DevopsEngineer,
    Unknown,
}

impl AgentKind {
    pub fn from_marker(marker: &str) -> Self {
        match marker.trim() {
            "dba-expert" => AgentKind::DbaExpert,
            "spring-architect" => AgentKind::SpringArchitect,
            "infra-expert" => AgentKind::InfraExpert,
            "domain-expert" => AgentKind::DomainExpert,
            "service-expert" => AgentKind::ServiceExpert,
            "test-expert" => AgentKind::TestExpert,
            "code-reviewer" => AgentKind::CodeReviewer,
            "devops-engineer" => AgentKind::DevopsEngineer,
            _ => AgentKind::Unknown,
        }
    }

    fn note(&self) -> Option<&'static str> {
        match self {
            AgentKind::DbaExpert => Some("schema work closed out"),
            AgentKind::SpringArchitect => Some("convention pass closed out"),
            AgentKind::InfraExpert => Some("infrastructure work closed out"),
            AgentKind::DomainExpert => Some("feature work closed out"),
            AgentKind::ServiceExpert => Some("integration work closed out"),
            AgentKind::TestExpert => Some("test pass closed out"),
            AgentKind::CodeReviewer => Some("review pass closed out"),
            AgentKind::DevopsEngineer => Some("deployment work closed out"),
            AgentKind::Unknown => None,
        }
    }
}

/// Resolve the last-agent marker, run its finalizer, and clear the marker.
pub fn dispatch_last_agent(paths: &ProjectPaths) -> Result<()> {
    let marker_path = paths.last_agent_marker();
    let Ok(marker) = fs::read_to_string(&marker_path) else {
        return Ok(());
    };

    let kind = AgentKind::from_marker(&marker);
    if let Some(note) = kind.note() {
        if let Err(err) = snapshot::append_change(paths, note) {
            tracing::warn!(%err, "agent finalizer could not record its note");
        }
        tracing::info!(agent = marker.trim(), "agent finalizer ran");
    }

    fs::remove_file(&marker_path)?;
    Ok(())
}
