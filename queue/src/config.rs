//! Layered TOML configuration: hardcoded defaults < bundled defaults < project file < overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectBoundaryError {
    #[error(
        "Working directory '{working_dir}' is outside project root '{project_root}'. \
         To allow external directories, either:\n\
         \x20 1. Pass allow_external=true for this task\n\
         \x20 2. Set allow_external_dirs=true on the orchestrator\n\
         \x20 3. Set safety.allow_external_dirs = true in .klauss.toml"
    )]
    OutsideProject {
        working_dir: String,
        project_root: String,
    },
}

fn default_project_name() -> String {
    "auto-detect".to_string()
}
fn default_workers_count() -> u32 {
    4
}
fn default_log_directory() -> String {
    "logs".to_string()
}
fn default_heartbeat_interval() -> u64 {
    5
}
fn default_stale_timeout() -> u64 {
    3600
}
fn default_priority() -> i64 {
    5
}
fn default_timeout() -> u64 {
    1800
}
fn default_poll_interval() -> f64 {
    2.0
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub name: String,
    pub description: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            name: default_project_name(),
            description: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: Option<String>,
    pub auto_cleanup_days: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    pub enforce_project_boundary: bool,
    pub allow_external_dirs: bool,
    pub confirm_destructive: bool,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            enforce_project_boundary: true,
            allow_external_dirs: false,
            confirm_destructive: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub default_count: u32,
    pub log_directory: String,
    pub restart_on_failure: bool,
    pub heartbeat_interval: u64,
    pub stale_timeout: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            default_count: default_workers_count(),
            log_directory: default_log_directory(),
            restart_on_failure: true,
            heartbeat_interval: default_heartbeat_interval(),
            stale_timeout: default_stale_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub priority: i64,
    pub timeout: u64,
    pub poll_interval: f64,
    pub llm_command: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            priority: default_priority(),
            timeout: default_timeout(),
            poll_interval: default_poll_interval(),
            llm_command: "claude".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringConfig {
    pub dashboard_enabled: bool,
    pub progress_updates: bool,
    pub detailed_logging: bool,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            dashboard_enabled: true,
            progress_updates: true,
            detailed_logging: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinationConfig {
    pub shared_db: Option<String>,
    pub enabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub project: ProjectConfig,
    pub database: DatabaseConfig,
    pub safety: SafetyConfig,
    pub workers: WorkersConfig,
    pub defaults: DefaultsConfig,
    pub monitoring: MonitoringConfig,
    pub coordination: CoordinationConfig,
    #[serde(default)]
    pub related_projects: std::collections::HashMap<String, String>,
    #[serde(default)]
    pub directories: std::collections::HashMap<String, String>,

    #[serde(skip)]
    pub project_root: Option<PathBuf>,
}

impl Config {
    /// Walk up from `start` (or the current directory) looking for a `.git` marker.
    pub fn find_project_root(start: Option<&Path>) -> PathBuf {
        let mut current = start
            .map(Path::to_path_buf)
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));
        loop {
            if current.join(".git").exists() {
                return current;
            }
            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return std::env::current_dir().unwrap_or(current),
            }
        }
    }

    /// Load configuration with precedence: overrides > project file (`.klauss.toml`) >
    /// bundled defaults > hardcoded `Default` impls.
    pub fn load(overrides: Option<toml::Value>) -> crate::error::QueueResult<Config> {
        let project_root = Self::find_project_root(None);

        let mut merged = toml::Value::Table(toml::value::Table::new());

        if let Ok(text) = std::fs::read_to_string(project_root.join(".klauss.toml")) {
            let project_config: toml::Value = toml::from_str(&text)
                .map_err(|e| crate::error::QueueError::Config(e.to_string()))?;
            merged = deep_merge(merged, project_config);
        }

        if let Some(overrides) = overrides {
            merged = deep_merge(merged, overrides);
        }

        let mut config: Config = merged
            .try_into()
            .map_err(|e: toml::de::Error| crate::error::QueueError::Config(e.to_string()))?;
        config.project_root = Some(project_root.clone());

        if config.project.name == "auto-detect" {
            config.project.name = project_root
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "auto-detect".to_string());
        }

        if config.database.path.is_none() {
            config.database.path = Some(format!("{}_claude_tasks.db", config.project.name));
        }

        Ok(config)
    }

    pub fn get_absolute_path(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            return p.to_path_buf();
        }
        match &self.project_root {
            Some(root) => root.join(p),
            None => p.to_path_buf(),
        }
    }

    pub fn is_within_project(&self, path: &str) -> bool {
        let Some(root) = &self.project_root else {
            return true;
        };
        self.get_absolute_path(path).starts_with(root)
    }

    pub fn validate_working_dir(
        &self,
        working_dir: Option<&str>,
        allow_external: bool,
    ) -> Result<(), ProjectBoundaryError> {
        let Some(working_dir) = working_dir else {
            return Ok(());
        };
        if working_dir.is_empty() || !self.safety.enforce_project_boundary {
            return Ok(());
        }
        if allow_external || self.safety.allow_external_dirs {
            return Ok(());
        }
        if !self.is_within_project(working_dir) {
            return Err(ProjectBoundaryError::OutsideProject {
                working_dir: working_dir.to_string(),
                project_root: self
                    .project_root
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_default(),
            });
        }
        Ok(())
    }
}

fn deep_merge(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_value) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_merge_overlays_nested_tables() {
        let base: toml::Value = toml::from_str("[workers]\ndefault_count = 4\nstale_timeout = 3600\n").unwrap();
        let overlay: toml::Value = toml::from_str("[workers]\ndefault_count = 8\n").unwrap();
        let merged = deep_merge(base, overlay);
        assert_eq!(merged["workers"]["default_count"].as_integer(), Some(8));
        assert_eq!(merged["workers"]["stale_timeout"].as_integer(), Some(3600));
    }

    #[test]
    fn defaults_are_sane() {
        let config = Config::default();
        assert_eq!(config.defaults.llm_command, "claude");
        assert_eq!(config.workers.default_count, 4);
    }

    #[test]
    fn boundary_violation_names_three_remedies() {
        let mut config = Config::default();
        config.project_root = Some(PathBuf::from("/tmp/project"));
        let err = config
            .validate_working_dir(Some("/etc"), false)
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("allow_external=true"));
        assert!(msg.contains(".klauss.toml"));
    }
}
