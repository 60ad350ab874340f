//! Advisory file locking keyed by document path.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

/// Sidecar lock file for a document. The lock is taken on a separate file so
/// the document itself can be atomically replaced while held.
fn lock_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    name.push_str(".lock");
    path.with_file_name(name)
}

/// Run `f` while holding an exclusive advisory lock scoped to `path`.
///
/// Blocks until the lock is acquired; contention is not an error. The lock is
/// released on every exit path: the guard file is closed when this function
/// returns, whether `f` succeeded or failed.
pub fn with_lock<T, F>(path: &Path, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T>,
{
    let lock_path = lock_path_for(path);
    if let Some(dir) = lock_path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory {}", dir.display()))?;
    }

    let guard = OpenOptions::new()
        .create(true)
        .write(true)
        .open(&lock_path)
        .with_context(|| format!("Failed to open lock file {}", lock_path.display()))?;
    guard
        .lock_exclusive()
        .with_context(|| format!("Failed to lock {}", lock_path.display()))?;

    let result = f();

    let _ = FileExt::unlock(&guard);
    result
}
