//! The `hook` command: read one event from stdin, run the handler, print
//! exactly one JSON object on stdout. Diagnostics go to stderr only, so a
//! host parsing stdout never sees anything but the envelope.
//!
//! Unlike the manual commands, a hook invocation never exits without its
//! envelope: no resolvable project root or an unreadable config degrade to
//! the empty acknowledgement with a stderr diagnostic.

use std::path::Path;

use anyhow::Result;

use steward::config::StewardConfig;
use steward::hooks::{self, HookKind, HookResponse};
use steward::project::{ProjectPaths, find_project_root};

use super::super::HookCommands;

pub fn cmd_hook(start_dir: &Path, command: &HookCommands) -> Result<()> {
    let kind = match command {
        HookCommands::SessionStart => HookKind::SessionStart,
        HookCommands::UserPrompt => HookKind::UserPrompt,
        HookCommands::PostTool => HookKind::PostTool,
        HookCommands::SubagentStop => HookKind::SubagentStop,
        HookCommands::TeamIdle => HookKind::TeamIdle,
        HookCommands::Stop => HookKind::Stop,
    };

    let Some(root) = find_project_root(start_dir) else {
        tracing::warn!(
            dir = %start_dir.display(),
            "no project root found, acknowledging hook without touching state"
        );
        println!("{}", hooks::render(&HookResponse::empty()));
        return Ok(());
    };
    let paths = ProjectPaths::new(root);
    let config = StewardConfig::load(&paths.config_file()).unwrap_or_else(|err| {
        tracing::error!(%err, "config unreadable, falling back to defaults for this hook");
        StewardConfig::default()
    });

    let event = hooks::read_event(&mut std::io::stdin());
    let response = hooks::dispatch(kind, &paths, &config, &event);
    println!("{}", hooks::render(&response));
    Ok(())
}
