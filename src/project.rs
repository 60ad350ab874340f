//! Project root resolution and durable document paths.
//!
//! Every hook invocation starts from an arbitrary working directory inside
//! the project; all shared state lives under `<root>/.steward/`. File paths
//! are deterministic functions of the resolved root (and, for the pipeline,
//! the feature), so independent processes always agree on lock keys.

use std::path::{Path, PathBuf};

/// Directory that anchors all steward state inside a project.
pub const STEWARD_DIR: &str = ".steward";

/// Markers that identify a project root when `.steward/` does not exist yet.
const ROOT_MARKERS: &[&str] = &[
    "Cargo.toml",
    "package.json",
    "build.gradle",
    "build.gradle.kts",
    "pom.xml",
    ".git",
];

/// Walk up from `start` to the first directory that contains `.steward/` or
/// a recognized project marker. Returns `None` when nothing matches up to
/// the filesystem root.
pub fn find_project_root(start: &Path) -> Option<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        if dir.join(STEWARD_DIR).is_dir() {
            return Some(dir);
        }
        if ROOT_MARKERS.iter().any(|m| dir.join(m).exists()) {
            return Some(dir);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Deterministic locations of every durable document for one project.
///
/// Each document is owned by exactly one component; no two components write
/// the same file.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    root: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn project_label(&self) -> String {
        self.root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "project".to_string())
    }

    pub fn steward_dir(&self) -> PathBuf {
        self.root.join(STEWARD_DIR)
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("steward.toml")
    }

    pub fn session_state(&self) -> PathBuf {
        self.steward_dir().join("sessions").join("current.json")
    }

    pub fn observations(&self) -> PathBuf {
        self.steward_dir().join("sessions").join("observations.jsonl")
    }

    pub fn latest_summary(&self) -> PathBuf {
        self.steward_dir().join("sessions").join("latest-summary.json")
    }

    pub fn summary_archive_dir(&self) -> PathBuf {
        self.steward_dir().join("sessions").join("archive")
    }

    pub fn pipeline_status(&self) -> PathBuf {
        self.steward_dir().join("pipeline").join("status.json")
    }

    pub fn team_state(&self) -> PathBuf {
        self.steward_dir().join("team-state.json")
    }

    pub fn loop_state(&self) -> PathBuf {
        self.steward_dir().join("loop-state.json")
    }

    pub fn context_snapshot(&self) -> PathBuf {
        self.steward_dir().join("context.md")
    }

    pub fn loop_log(&self) -> PathBuf {
        self.steward_dir().join("loop-log.md")
    }

    pub fn loop_log_archive_dir(&self) -> PathBuf {
        self.steward_dir().join("loop-archive")
    }

    pub fn dashboard_pid(&self) -> PathBuf {
        self.steward_dir().join("dashboard.pid")
    }

    pub fn last_agent_marker(&self) -> PathBuf {
        self.steward_dir().join("last-agent")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn finds_root_by_steward_dir() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("proj");
        let nested = root.join("src").join("deep");
        std::fs::create_dir_all(root.join(STEWARD_DIR)).unwrap();
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_project_root(&nested), Some(root));
    }

    #[test]
    fn finds_root_by_marker_file() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("proj");
        let nested = root.join("lib");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(root.join("package.json"), "{}").unwrap();

        assert_eq!(find_project_root(&nested), Some(root));
    }

    #[test]
    fn returns_none_without_markers() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();
        // The tempdir itself has no markers; traversal may still hit a marker
        // further up on some machines, so only assert it is not `nested`.
        let found = find_project_root(&nested);
        assert_ne!(found.as_deref(), Some(nested.as_path()));
    }

    #[test]
    fn document_paths_are_stable() {
        let paths = ProjectPaths::new("/work/demo");
        assert_eq!(
            paths.session_state(),
            PathBuf::from("/work/demo/.steward/sessions/current.json")
        );
        assert_eq!(
            paths.pipeline_status(),
            PathBuf::from("/work/demo/.steward/pipeline/status.json")
        );
        assert_eq!(paths.project_label(), "demo");
    }
}
