//! Per-session durable state shared across hook invocations.
//!
//! Two documents, both scoped to the project rather than any one process:
//! - `sessions/current.json` — the active session record (`state`)
//! - `sessions/observations.jsonl` — the deduplicated tool-use journal
//!   (`observations`)

pub mod observations;
pub mod state;

pub use observations::{Added, ObservationKind, ObservationLog, ObservationRecord, ObservationStats};
pub use state::{SessionState, SessionStore};
