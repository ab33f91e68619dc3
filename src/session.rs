//! Evaluation run directories.
//!
//! Each run gets its own directory holding:
//! - `.session.json` with run metadata
//! - `evaluations.jsonl`, appended as tasks complete
//! - `evaluation.json`, the sorted summary written at the end

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

/// Progress log, one record per line in completion order
pub const PROGRESS_FILE: &str = "evaluations.jsonl";

/// Final summary
pub const SUMMARY_FILE: &str = "evaluation.json";

const METADATA_FILE: &str = ".session.json";

/// An evaluation run's output directory
#[derive(Debug, Clone)]
pub struct Session {
    /// Unique session ID
    pub id: String,
    /// Root directory for this session
    pub dir: PathBuf,
}

/// Metadata written when a session is initialized
#[derive(Debug, Clone, Serialize)]
pub struct SessionMetadata<'a> {
    pub id: &'a str,
    pub created: String,
    pub judge: &'a str,
    pub threshold: f64,
    pub task_count: usize,
}

impl Session {
    /// Create a session named `<name>_<timestamp>` under `base_dir`
    pub fn with_name(base_dir: impl AsRef<Path>, name: &str) -> Self {
        let id = format!("{}_{}", sanitize_name(name), generate_timestamp_suffix());
        let dir = base_dir.as_ref().join(&id);
        Self { id, dir }
    }

    /// Use an explicit directory
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let id = dir
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("session_{}", generate_timestamp_suffix()));
        Self { id, dir }
    }

    /// Create the directory and write metadata
    pub fn init(&self, judge: &str, threshold: f64, task_count: usize) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;

        let metadata = SessionMetadata {
            id: &self.id,
            created: chrono::Utc::now().to_rfc3339(),
            judge,
            threshold,
            task_count,
        };
        fs::write(
            self.dir.join(METADATA_FILE),
            serde_json::to_string_pretty(&metadata)?,
        )?;

        Ok(())
    }

    pub fn progress_path(&self) -> PathBuf {
        self.dir.join(PROGRESS_FILE)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.dir.join(SUMMARY_FILE)
    }
}

/// Generate a timestamp suffix
fn generate_timestamp_suffix() -> String {
    chrono::Utc::now().format("%Y%m%d_%H%M%S").to_string()
}

/// Sanitize a name for use in directory names
fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' => c,
            _ => '_',
        })
        .collect()
}

/// List run directories under `base_dir`, oldest name first
pub fn list_sessions(base_dir: impl AsRef<Path>) -> std::io::Result<Vec<PathBuf>> {
    let base = base_dir.as_ref();
    if !base.exists() {
        return Ok(Vec::new());
    }

    let mut sessions = Vec::new();
    for entry in fs::read_dir(base)? {
        let path = entry?.path();
        if path.is_dir() && path.join(METADATA_FILE).exists() {
            sessions.push(path);
        }
    }
    sessions.sort();
    Ok(sessions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_session_with_name() {
        let session = Session::with_name("/tmp/evals", "gpt-4o run");
        assert!(session.id.starts_with("gpt-4o_run_"));
        assert!(session.dir.starts_with("/tmp/evals"));
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("hello world"), "hello_world");
        assert_eq!(sanitize_name("a/b\\c"), "a_b_c");
    }

    #[test]
    fn test_init_and_list() {
        let base = TempDir::new().unwrap();
        let session = Session::in_dir(base.path().join("run_a"));
        assert_eq!(session.id, "run_a");
        session.init("mock", 0.9, 3).unwrap();

        let meta: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(session.dir.join(METADATA_FILE)).unwrap())
                .unwrap();
        assert_eq!(meta["judge"], "mock");
        assert_eq!(meta["task_count"], 3);

        fs::create_dir_all(base.path().join("not_a_run")).unwrap();
        let sessions = list_sessions(base.path()).unwrap();
        assert_eq!(sessions, vec![session.dir.clone()]);
        assert!(session.progress_path().ends_with(PROGRESS_FILE));
    }
}
