//! Autonomous-loop control commands. `start` defaults its knobs from the
//! `[loop]` config section; the stop hook drives the loop from there.

use anyhow::Result;
use serde_json::json;

use steward::config::StewardConfig;
use steward::looper::LoopStore;
use steward::project::ProjectPaths;

pub fn cmd_loop_start(
    paths: &ProjectPaths,
    config: &StewardConfig,
    prompt: &str,
    max_iterations: Option<u32>,
    completion_promise: Option<&str>,
) -> Result<()> {
    let store = LoopStore::new(paths);
    let max = max_iterations.unwrap_or(config.loop_defaults.max_iterations);
    let promise = completion_promise.unwrap_or(&config.loop_defaults.completion_promise);
    let state = store.start(prompt, max, promise)?;
    println!("{}", serde_json::to_string_pretty(&json!({ "loop": state }))?);
    Ok(())
}

pub fn cmd_loop_status(paths: &ProjectPaths) -> Result<()> {
    let store = LoopStore::new(paths);
    let doc = match store.load() {
        Some(state) => json!({ "loop": state }),
        None => json!({ "loop": null }),
    };
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

pub fn cmd_loop_complete(paths: &ProjectPaths) -> Result<()> {
    let store = LoopStore::new(paths);
    let doc = match store.complete()? {
        Some(state) => json!({ "loop": state }),
        None => json!({ "loop": null }),
    };
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

pub fn cmd_loop_cancel(paths: &ProjectPaths) -> Result<()> {
    let store = LoopStore::new(paths);
    store.cancel()?;
    println!("{}", serde_json::to_string_pretty(&json!({ "cancelled": true }))?);
    Ok(())
}
