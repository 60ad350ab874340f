//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module      | Commands handled                                  |
//! |-------------|----------------------------------------------------|
//! | `hook`      | `Hook` (all six host events)                       |
//! | `pipeline`  | `Pipeline` (`start`, `status`, `advance`)          |
//! | `loop_ctl`  | `Loop` (`start`, `status`, `complete`, `cancel`)   |
//! | `serve`     | `Serve`                                            |

pub mod hook;
pub mod loop_ctl;
pub mod pipeline;
pub mod serve;

pub use hook::cmd_hook;
pub use loop_ctl::{cmd_loop_cancel, cmd_loop_complete, cmd_loop_start, cmd_loop_status};
pub use pipeline::{cmd_pipeline_advance, cmd_pipeline_start, cmd_pipeline_status};
pub use serve::cmd_serve;

use std::path::Path;

use anyhow::{Result, bail};

use steward::config::StewardConfig;
use steward::project::{ProjectPaths, find_project_root};

/// Resolve the project root from `start` and load its configuration.
/// Commands refuse to run outside a recognizable project.
pub fn project_context(start: &Path) -> Result<(ProjectPaths, StewardConfig)> {
    let Some(root) = find_project_root(start) else {
        bail!(
            "no project root found from {} (looked for Cargo.toml, package.json, build.gradle, pom.xml, or .git)",
            start.display()
        );
    };
    let paths = ProjectPaths::new(root);
    let config = StewardConfig::load(&paths.config_file())?;
    Ok((paths, config))
}
