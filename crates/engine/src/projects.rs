//! Project location collaborator.
//!
//! The engine has no project knowledge beyond where each project keeps
//! its files: it asks a [`ProjectManager`] to enumerate projects at
//! startup (for recovery) and to resolve each job's state directory.

use std::path::{Path, PathBuf};

/// A reference to one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectRef {
    pub id: String,
}

/// Resolves project directories for the engine.
pub trait ProjectManager: Send + Sync {
    /// Enumerate known projects.
    fn list_projects(&self) -> Vec<ProjectRef>;

    /// Resolve a path inside a project's directory.
    fn project_path(&self, project_id: &str, relative: &Path) -> PathBuf;
}

/// Filesystem-backed project manager: every child directory of the
/// projects root is a project, named by its directory.
#[derive(Debug, Clone)]
pub struct FsProjectManager {
    root: PathBuf,
}

impl FsProjectManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Build from the `PROJECTS_ROOT` env var (default `./projects`).
    pub fn from_env() -> Self {
        let root = std::env::var("PROJECTS_ROOT").unwrap_or_else(|_| "./projects".into());
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ProjectManager for FsProjectManager {
    fn list_projects(&self) -> Vec<ProjectRef> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::warn!(
                    root = %self.root.display(),
                    error = %err,
                    "Failed to list projects root",
                );
                return Vec::new();
            }
        };

        let mut projects: Vec<ProjectRef> = entries
            .flatten()
            .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
            .filter_map(|entry| entry.file_name().into_string().ok())
            .map(|id| ProjectRef { id })
            .collect();
        projects.sort_by(|a, b| a.id.cmp(&b.id));
        projects
    }

    fn project_path(&self, project_id: &str, relative: &Path) -> PathBuf {
        self.root.join(project_id).join(relative)
    }
}
