//! Project storage layout and status.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use walkdir::WalkDir;

use svcwrap_runner::{ExitRecord, ProcessState, RunPaths};
use svcwrap_templates::Metadata;

use crate::error::{CoreError, CoreResult};

/// Name of the data file inside the project directory.
pub const DATA_FILE: &str = "svcwrap.xml";

/// Lifecycle state of a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
    /// Accepting input files and parameters
    Ready,
    Running,
    /// The program exited with code 0
    Done,
    Aborted,
    /// The program failed
    Error,
}

impl ProjectStatus {
    /// Numeric code used in the wire document.
    pub fn code(&self) -> u8 {
        match self {
            Self::Ready => 0,
            Self::Running => 1,
            Self::Done => 2,
            Self::Aborted => 3,
            Self::Error => 4,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Running => "running",
            Self::Done => "done",
            Self::Aborted => "aborted",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Aborted | Self::Error)
    }

    pub fn from_exit(record: &ExitRecord) -> Self {
        if record.aborted {
            Self::Aborted
        } else if record.success() {
            Self::Done
        } else {
            Self::Error
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Observed state of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectState {
    pub status: ProjectStatus,
    /// Progress message from the status log, or a generic one
    pub message: String,
    pub completion: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl ProjectState {
    /// Combine the process state with the last status log entry.
    pub fn from_process(state: ProcessState, last: Option<(u8, String)>) -> Self {
        let (completion, logged) = match last {
            Some((completion, message)) => (completion, Some(message)),
            None => (0, None),
        };
        match state {
            ProcessState::Idle => Self {
                status: ProjectStatus::Ready,
                message: "Accepting input files and parameters".to_string(),
                completion: 0,
                pid: None,
                exit_code: None,
            },
            ProcessState::Running(pid) => Self {
                status: ProjectStatus::Running,
                message: logged.unwrap_or_else(|| "Running".to_string()),
                completion,
                pid: Some(pid),
                exit_code: None,
            },
            ProcessState::Finished(record) => {
                let status = ProjectStatus::from_exit(&record);
                let message = match status {
                    ProjectStatus::Done => "Done".to_string(),
                    ProjectStatus::Aborted => "Aborted".to_string(),
                    _ => match record.exit_code {
                        Some(code) => format!("Failed with exit code {}", code),
                        None => "Failed".to_string(),
                    },
                };
                Self {
                    status,
                    message,
                    completion: if status == ProjectStatus::Done {
                        100
                    } else {
                        completion
                    },
                    pid: None,
                    exit_code: record.exit_code,
                }
            }
        }
    }
}

/// Reject ids that could escape the projects directory.
pub fn validate_project_id(id: &str) -> CoreResult<()> {
    let valid = !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(CoreError::InvalidProjectId(id.to_string()))
    }
}

/// Files and directories of one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    pub id: String,
    pub root: PathBuf,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub tmp_dir: PathBuf,
    pub data_file: PathBuf,
    pub run: RunPaths,
}

impl ProjectLayout {
    pub fn new(id: &str, root: impl Into<PathBuf>) -> CoreResult<Self> {
        validate_project_id(id)?;
        let root = root.into();
        Ok(Self {
            id: id.to_string(),
            input_dir: root.join("input"),
            output_dir: root.join("output"),
            tmp_dir: root.join("tmp"),
            data_file: root.join(DATA_FILE),
            run: RunPaths::in_dir(&root),
            root,
        })
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Create the directory skeleton. Existing directories are left alone.
    pub fn materialize(&self) -> CoreResult<()> {
        for dir in [&self.root, &self.input_dir, &self.output_dir, &self.tmp_dir] {
            fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn input_path(&self, filename: &str) -> PathBuf {
        self.input_dir.join(filename)
    }

    pub fn output_path(&self, filename: &str) -> PathBuf {
        self.output_dir.join(filename)
    }

    /// Staged input files with their metadata, sorted by name.
    pub fn inputs(&self) -> CoreResult<Vec<(String, Metadata)>> {
        list_files(&self.input_dir)
    }

    /// Files present in the output directory, sorted by name.
    pub fn outputs(&self) -> CoreResult<Vec<(String, Metadata)>> {
        list_files(&self.output_dir)
    }

    /// Empty a directory and recreate it.
    pub fn clear_dir(dir: &Path) -> CoreResult<()> {
        if dir.exists() {
            fs::remove_dir_all(dir)?;
        }
        fs::create_dir_all(dir)?;
        Ok(())
    }
}

/// Regular, non-hidden files directly in `dir` with their sidecar metadata.
fn list_files(dir: &Path) -> CoreResult<Vec<(String, Metadata)>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let name = entry.file_name().to_string_lossy().to_string();
        if !entry.file_type().is_file() || name.starts_with('.') {
            continue;
        }
        let metadata = match Metadata::load(entry.path()) {
            Ok(Some(metadata)) => metadata,
            Ok(None) => Metadata::default(),
            Err(e) => {
                warn!("Ignoring unreadable metadata for {:?}: {}", entry.path(), e);
                Metadata::default()
            }
        };
        debug!("Found {} ({})", name, metadata.format);
        files.push((name, metadata));
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_project_ids() {
        assert!(validate_project_id("p1").is_ok());
        assert!(validate_project_id("run_2024-01.a").is_ok());
        for bad in ["", ".", "..", ".hidden", "a/b", "a b", "x\0"] {
            assert!(validate_project_id(bad).is_err(), "{:?}", bad);
        }
    }

    #[test]
    fn test_materialize_is_idempotent() {
        let dir = tempdir().unwrap();
        let layout = ProjectLayout::new("p1", dir.path().join("p1")).unwrap();
        assert!(!layout.exists());
        layout.materialize().unwrap();
        fs::write(layout.input_path("a.txt"), "hello").unwrap();
        layout.materialize().unwrap();
        assert!(layout.input_path("a.txt").exists());
        assert!(layout.output_dir.is_dir());
        assert!(layout.tmp_dir.is_dir());
    }

    #[test]
    fn test_inputs_skip_sidecars() {
        let dir = tempdir().unwrap();
        let layout = ProjectLayout::new("p1", dir.path()).unwrap();
        layout.materialize().unwrap();
        let file = layout.input_path("b.txt");
        fs::write(&file, "x").unwrap();
        Metadata::new("PlainTextFormat")
            .with_template("text")
            .save(&file)
            .unwrap();
        fs::write(layout.input_path("a.txt"), "y").unwrap();

        let inputs = layout.inputs().unwrap();
        let names: Vec<&str> = inputs.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt"]);
        assert_eq!(inputs[1].1.template.as_deref(), Some("text"));
        assert_eq!(inputs[0].1, Metadata::default());
    }

    #[test]
    fn test_state_messages() {
        let running = ProjectState::from_process(ProcessState::Running(42), None);
        assert_eq!(running.status, ProjectStatus::Running);
        assert_eq!(running.message, "Running");

        let progress =
            ProjectState::from_process(ProcessState::Running(42), Some((30, "tagging".into())));
        assert_eq!(progress.message, "tagging");
        assert_eq!(progress.completion, 30);

        let failed =
            ProjectState::from_process(ProcessState::Finished(ExitRecord::exited(Some(2))), None);
        assert_eq!(failed.status, ProjectStatus::Error);
        assert_eq!(failed.exit_code, Some(2));
        assert_eq!(failed.status.code(), 4);
    }
}
