//! Configuration management with layered hierarchy
//!
//! Built-in defaults, then the global user config, then the project's
//! `.widgetsmith/config.yaml`, then environment variables. Later layers win.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::core::audit::AuditLevel;
use crate::core::orchestrator::DEFAULT_MAX_REPAIR_ATTEMPTS;
use crate::core::Project;

/// widgetsmith configuration; unset keys fall through to the next layer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Repair rounds after the initial generation
    pub max_repair_attempts: Option<u32>,

    /// Audit level used when a command does not name one
    pub default_audit_level: Option<AuditLevel>,

    /// Carry findings for unchanged lines into the next audit
    pub audit_reuse: Option<bool>,
}

impl Config {
    /// Load configuration from all sources, merging in priority order
    pub fn load() -> Self {
        Self::load_for(Project::discover().ok().as_ref())
    }

    /// Load configuration for a specific project (or none)
    pub fn load_for(project: Option<&Project>) -> Self {
        let mut config = Config::default();

        // 1. Global user config (~/.config/widgetsmith/config.yaml)
        if let Some(global) = Self::global_config_path().and_then(|p| Self::read_file(&p)) {
            config.merge(global);
        }

        // 2. Project config (.widgetsmith/config.yaml)
        if let Some(project_config) = project.and_then(|p| Self::read_file(&p.config_file())) {
            config.merge(project_config);
        }

        // 3. Environment variables
        config.merge(Self::from_env());

        config
    }

    /// Path to the global config file
    pub fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "widgetsmith")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    fn read_file(path: &Path) -> Option<Config> {
        if !path.exists() {
            return None;
        }
        let contents = std::fs::read_to_string(path).ok()?;
        match serde_yml::from_str::<Config>(&contents) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring unreadable config file");
                None
            }
        }
    }

    fn from_env() -> Config {
        Config {
            max_repair_attempts: env_value("WIDGETSMITH_MAX_REPAIRS"),
            default_audit_level: env_value("WIDGETSMITH_AUDIT_LEVEL"),
            audit_reuse: env_value("WIDGETSMITH_AUDIT_REUSE"),
        }
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: Config) {
        if other.max_repair_attempts.is_some() {
            self.max_repair_attempts = other.max_repair_attempts;
        }
        if other.default_audit_level.is_some() {
            self.default_audit_level = other.default_audit_level;
        }
        if other.audit_reuse.is_some() {
            self.audit_reuse = other.audit_reuse;
        }
    }

    pub fn max_repair_attempts(&self) -> u32 {
        self.max_repair_attempts.unwrap_or(DEFAULT_MAX_REPAIR_ATTEMPTS)
    }

    pub fn default_audit_level(&self) -> AuditLevel {
        self.default_audit_level.unwrap_or_default()
    }

    pub fn audit_reuse(&self) -> bool {
        self.audit_reuse.unwrap_or(true)
    }
}

fn env_value<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = name, value = %raw, "ignoring unparseable environment override");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_repair_attempts(), 3);
        assert_eq!(config.default_audit_level(), AuditLevel::Fast);
        assert!(config.audit_reuse());
    }

    #[test]
    fn test_merge_prefers_set_values() {
        let mut base = Config {
            max_repair_attempts: Some(5),
            default_audit_level: Some(AuditLevel::Full),
            audit_reuse: None,
        };
        base.merge(Config {
            max_repair_attempts: None,
            default_audit_level: Some(AuditLevel::Fast),
            audit_reuse: Some(false),
        });
        assert_eq!(base.max_repair_attempts(), 5);
        assert_eq!(base.default_audit_level(), AuditLevel::Fast);
        assert!(!base.audit_reuse());
    }

    #[test]
    fn test_reads_project_yaml() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();
        std::fs::write(
            project.config_file(),
            "max_repair_attempts: 1\ndefault_audit_level: full\n",
        )
        .unwrap();

        let config = Config::read_file(&project.config_file()).unwrap();
        assert_eq!(config.max_repair_attempts, Some(1));
        assert_eq!(config.default_audit_level, Some(AuditLevel::Full));
        assert_eq!(config.audit_reuse, None);
    }

    #[test]
    fn test_default_project_config_is_all_comments() {
        let tmp = tempdir().unwrap();
        let project = Project::init(tmp.path()).unwrap();
        // An empty YAML document parses as no config at all
        let contents = std::fs::read_to_string(project.config_file()).unwrap();
        assert!(contents.lines().all(|l| l.is_empty() || l.starts_with('#')));
    }

    #[test]
    fn test_bad_yaml_is_ignored() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("config.yaml");
        std::fs::write(&path, "max_repair_attempts: [not, a, number]\n").unwrap();
        assert!(Config::read_file(&path).is_none());
    }
}
