//! Project discovery and on-disk layout

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the state directory at the project root
pub const STATE_DIR: &str = ".widgetsmith";

/// Represents a widgetsmith project
#[derive(Debug, Clone)]
pub struct Project {
    /// Root directory of the project (parent of .widgetsmith/)
    root: PathBuf,
}

impl Project {
    /// Find project root by walking up from the current directory
    pub fn discover() -> Result<Self, ProjectError> {
        let current = std::env::current_dir()
            .map_err(|e| ProjectError::IoError(e.to_string()))?;
        Self::discover_from(&current)
    }

    /// Find project root by walking up from the given directory
    pub fn discover_from(start: &Path) -> Result<Self, ProjectError> {
        let mut current = start
            .canonicalize()
            .map_err(|e| ProjectError::IoError(e.to_string()))?;

        loop {
            if current.join(STATE_DIR).is_dir() {
                return Ok(Self { root: current });
            }

            if !current.pop() {
                return Err(ProjectError::NotFound {
                    searched_from: start.to_path_buf(),
                });
            }
        }
    }

    /// Use `root` as the project root without requiring an existing state directory
    ///
    /// The store creates its directories on first open, so library callers can
    /// point at any directory (one engine per project root).
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create a new project structure at the given path
    pub fn init(path: &Path) -> Result<Self, ProjectError> {
        let root = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());

        if root.join(STATE_DIR).exists() {
            return Err(ProjectError::AlreadyExists(root.clone()));
        }

        Self::write_layout(&root)?;
        Ok(Self { root })
    }

    /// Force initialization even if .widgetsmith/ exists
    ///
    /// Existing widgets, index and audits are left untouched; only the
    /// default config is rewritten.
    pub fn init_force(path: &Path) -> Result<Self, ProjectError> {
        let root = path
            .canonicalize()
            .unwrap_or_else(|_| path.to_path_buf());

        Self::write_layout(&root)?;
        Ok(Self { root })
    }

    fn write_layout(root: &Path) -> Result<(), ProjectError> {
        let project = Self::at(root);
        for dir in [project.widgets_dir(), project.index_dir(), project.audits_dir()] {
            std::fs::create_dir_all(&dir).map_err(|e| ProjectError::IoError(e.to_string()))?;
        }

        std::fs::write(project.state_dir().join("config.yaml"), Self::default_config())
            .map_err(|e| ProjectError::IoError(e.to_string()))?;

        Ok(())
    }

    fn default_config() -> &'static str {
        r#"# widgetsmith project configuration

# Maximum number of repair rounds after the first generation (default: 3)
# max_repair_attempts: 3

# Audit level used when none is given (fast, full)
# default_audit_level: fast

# Carry forward findings for unchanged lines when re-auditing
# audit_reuse: true
"#
    }

    /// Get the project root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the .widgetsmith state directory
    pub fn state_dir(&self) -> PathBuf {
        self.root.join(STATE_DIR)
    }

    /// Directory holding generated widget code files
    pub fn widgets_dir(&self) -> PathBuf {
        self.state_dir().join("widgets")
    }

    /// Directory holding the artifact index
    pub fn index_dir(&self) -> PathBuf {
        self.state_dir().join("index")
    }

    /// Path of the artifact index file
    pub fn index_file(&self) -> PathBuf {
        self.index_dir().join("artifacts.json")
    }

    /// Directory holding stored audit reports
    pub fn audits_dir(&self) -> PathBuf {
        self.state_dir().join("audits")
    }

    /// Path of the project config file
    pub fn config_file(&self) -> PathBuf {
        self.state_dir().join("config.yaml")
    }
}

/// Errors that can occur during project operations
#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("not a widgetsmith project (searched from {searched_from:?}). Run 'widgetsmith init' to create one.")]
    NotFound { searched_from: PathBuf },

    #[error("widgetsmith project already exists at {0:?}")]
    AlreadyExists(PathBuf),

    #[error("IO error: {0}")]
    IoError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_project_init_creates_structure() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();

        assert!(project.state_dir().exists());
        assert!(project.config_file().exists());
        assert!(project.widgets_dir().is_dir());
        assert!(project.index_dir().is_dir());
        assert!(project.audits_dir().is_dir());
    }

    #[test]
    fn test_project_init_fails_if_exists() {
        let tmp = tempdir().unwrap();
        Project::init(tmp.path()).unwrap();

        let err = Project::init(tmp.path()).unwrap_err();
        assert!(matches!(err, ProjectError::AlreadyExists(_)));
    }

    #[test]
    fn test_project_init_force_keeps_widgets() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();
        let widget = project.widgets_dir().join("chart_20240101_000000.js");
        std::fs::write(&widget, "export default function Widget() {}").unwrap();

        Project::init_force(tmp.path()).unwrap();
        assert!(widget.exists());
    }

    #[test]
    fn test_project_discover_finds_state_dir() {
        let tmp = tempdir().unwrap();
        Project::init(tmp.path()).unwrap();

        let subdir = tmp.path().join("notebooks/analysis");
        std::fs::create_dir_all(&subdir).unwrap();

        let project = Project::discover_from(&subdir).unwrap();
        assert_eq!(
            project.root().canonicalize().unwrap(),
            tmp.path().canonicalize().unwrap()
        );
    }

    #[test]
    fn test_project_discover_fails_without_state_dir() {
        let tmp = tempdir().unwrap();
        let err = Project::discover_from(tmp.path()).unwrap_err();
        assert!(matches!(err, ProjectError::NotFound { .. }));
    }
}
