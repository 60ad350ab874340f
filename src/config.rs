//! Project configuration loaded from `steward.toml`.
//!
//! All sections are optional; missing values fall back to defaults so a
//! project without a config file behaves sensibly.
//!
//! # Configuration File Format
//!
//! ```toml
//! [pipeline]
//! phases = [
//!     { id = 1, name = "Schema", agent = "dba-expert" },
//!     { id = 2, name = "Feature", agent = "domain-expert" },
//! ]
//!
//! [team]
//! stale_member_minutes = 30
//! clear_on_stop = false
//!
//! [loop]
//! max_iterations = 10
//! completion_promise = "LOOP_DONE"
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::pipeline::PhaseSpec;

/// Pipeline configuration section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineSection {
    /// Phase roster override; empty means the built-in nine-phase roster.
    #[serde(default)]
    pub phases: Vec<PhaseSpec>,
}

/// Team coordination configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamSection {
    /// Members unseen for longer than this are pruned as stale.
    #[serde(default = "default_stale_member_minutes")]
    pub stale_member_minutes: u64,
    /// Whether session stop wipes all team state instead of pausing it.
    #[serde(default)]
    pub clear_on_stop: bool,
}

fn default_stale_member_minutes() -> u64 {
    30
}

impl Default for TeamSection {
    fn default() -> Self {
        Self {
            stale_member_minutes: default_stale_member_minutes(),
            clear_on_stop: false,
        }
    }
}

/// Loop controller configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopSection {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_completion_promise")]
    pub completion_promise: String,
}

fn default_max_iterations() -> u32 {
    10
}

fn default_completion_promise() -> String {
    "LOOP_DONE".to_string()
}

impl Default for LoopSection {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            completion_promise: default_completion_promise(),
        }
    }
}

/// Top-level steward configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StewardConfig {
    #[serde(default)]
    pub pipeline: PipelineSection,
    #[serde(default)]
    pub team: TeamSection,
    #[serde(default, rename = "loop")]
    pub loop_defaults: LoopSection,
}

impl StewardConfig {
    /// Load from `steward.toml` at the project root; defaults when absent.
    /// A present-but-invalid file is an error: silently ignoring a typo'd
    /// config would be worse than failing the command.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    pub fn stale_member_ms(&self) -> i64 {
        (self.team.stale_member_minutes as i64) * 60 * 1000
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let config = StewardConfig::load(&dir.path().join("steward.toml")).unwrap();
        assert_eq!(config.team.stale_member_minutes, 30);
        assert_eq!(config.loop_defaults.max_iterations, 10);
        assert_eq!(config.loop_defaults.completion_promise, "LOOP_DONE");
        assert!(config.pipeline.phases.is_empty());
    }

    #[test]
    fn parses_full_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("steward.toml");
        std::fs::write(
            &path,
            r#"
[pipeline]
phases = [
    { id = 1, name = "Schema", agent = "dba-expert" },
    { id = 2, name = "Review", agent = "code-reviewer" },
]

[team]
stale_member_minutes = 5
clear_on_stop = true

[loop]
max_iterations = 3
completion_promise = "ALL_GREEN"
"#,
        )
        .unwrap();

        let config = StewardConfig::load(&path).unwrap();
        assert_eq!(config.pipeline.phases.len(), 2);
        assert_eq!(config.pipeline.phases[1].name, "Review");
        assert_eq!(config.team.stale_member_minutes, 5);
        assert!(config.team.clear_on_stop);
        assert_eq!(config.loop_defaults.completion_promise, "ALL_GREEN");
        assert_eq!(config.stale_member_ms(), 5 * 60 * 1000);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("steward.toml");
        std::fs::write(&path, "[team\nbroken").unwrap();
        assert!(StewardConfig::load(&path).is_err());
    }
}
