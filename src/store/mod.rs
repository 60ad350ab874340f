//! Locked, atomic JSON document storage.
//!
//! Every durable document in steward is a JSON file owned by exactly one
//! component. Hook invocations are independent short-lived processes, so the
//! only concurrency-safety primitive available is an advisory file lock plus
//! atomic replace. This module provides:
//! - `with_lock` — exclusive advisory lock scoped to a document path
//! - `read_typed` — typed read that degrades to a default, never errors
//! - `write_typed` — temp-file-then-rename write
//!
//! Any state transition that reads a document and writes it back must run
//! inside a single `with_lock` call covering both.

mod lock;

pub use lock::with_lock;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

/// Read a JSON document, substituting `default` when the file is missing,
/// unreadable, or does not parse (e.g. a partial write from a crashed
/// process). Recovery is always local; this function never errors.
pub fn read_typed<T, F>(path: &Path, default: F) -> T
where
    T: DeserializeOwned,
    F: FnOnce() -> T,
{
    match fs::read_to_string(path) {
        Ok(content) => serde_json::from_str(&content).unwrap_or_else(|err| {
            tracing::warn!(path = %path.display(), %err, "corrupt document, using default");
            default()
        }),
        Err(_) => default(),
    }
}

/// Write a JSON document so that a concurrent reader never observes a
/// half-written file: serialize to `<path>.tmp`, then rename over the target.
pub fn write_typed<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    let mut json = serde_json::to_string_pretty(value).context("Failed to serialize document")?;
    json.push('\n');

    let tmp = path.with_extension("tmp");
    fs::write(&tmp, json)
        .with_context(|| format!("Failed to write temp file {}", tmp.display()))?;

    if let Err(err) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(err)
            .with_context(|| format!("Failed to replace document {}", path.display()));
    }

    Ok(())
}

/// Remove a document if it exists. Missing files are not an error.
pub fn remove(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => {
            Err(err).with_context(|| format!("Failed to remove document {}", path.display()))
        }
    }
}
