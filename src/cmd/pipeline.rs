//! Pipeline control commands. Each prints one JSON document describing the
//! resulting state, suitable for piping into `jq` or a wrapper script.

use anyhow::Result;
use serde_json::json;

use steward::config::StewardConfig;
use steward::errors::PipelineError;
use steward::pipeline::{PipelineStore, summarize};
use steward::project::ProjectPaths;

pub fn cmd_pipeline_start(
    paths: &ProjectPaths,
    config: &StewardConfig,
    feature: &str,
    reset: bool,
) -> Result<()> {
    let store = PipelineStore::new(paths, config);
    let outcome = store.start(feature, reset)?;
    let summary = summarize(&outcome.state);
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "reused": outcome.reused,
            "pipeline": summary,
        }))?
    );
    Ok(())
}

pub fn cmd_pipeline_status(paths: &ProjectPaths, config: &StewardConfig) -> Result<()> {
    let store = PipelineStore::new(paths, config);
    let doc = match store.load() {
        Some(state) => json!({ "pipeline": summarize(&state) }),
        None => json!({ "pipeline": null }),
    };
    println!("{}", serde_json::to_string_pretty(&doc)?);
    Ok(())
}

pub fn cmd_pipeline_advance(paths: &ProjectPaths, config: &StewardConfig) -> Result<()> {
    let store = PipelineStore::new(paths, config);
    let outcome = match store.advance() {
        Ok(outcome) => outcome,
        Err(PipelineError::NotStarted) => {
            anyhow::bail!("no pipeline in progress; run `steward pipeline start <feature>` first")
        }
        Err(err) => return Err(err.into()),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&json!({
            "advanced": outcome.advanced,
            "completed": outcome.completed,
            "from": outcome.from,
            "to": outcome.to,
            "pipeline": summarize(&outcome.state),
        }))?
    );
    Ok(())
}
