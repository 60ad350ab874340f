//! Typed error hierarchy for the steward coordination layer.
//!
//! Two top-level enums cover the two places a contract can be violated:
//! - `PipelineError` — phase-machine misuse (advance before start)
//! - `TeamError` — coordinator misuse and disabled-team operations
//!
//! Everything else in this layer degrades instead of erroring: missing or
//! corrupt documents become defaults, auxiliary failures are logged to
//! stderr, and hook handlers always emit their JSON envelope.

use thiserror::Error;

/// Errors from the pipeline phase machine.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No pipeline status exists; start one with 'steward pipeline start <feature>'")]
    NotStarted,

    #[error("Current phase {phase_id} is missing from the phase roster")]
    PhaseMissing { phase_id: u32 },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Errors from the team coordinator. Unknown members and tasks are handled
/// as no-op outcomes in `TeamStore`, not errors, so the only contract-level
/// violation is operating on a disabled team.
#[derive(Debug, Error)]
pub enum TeamError {
    #[error("Team coordination is not enabled for this project")]
    Disabled,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
