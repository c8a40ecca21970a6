//! Configuration loading with multi-layer merge

use super::ApiConnection;
use crate::workflow::WorkflowDefinition;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level flowcabal configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FlowConfig {
    /// Defaults applied to LLM calls
    #[serde(default)]
    pub defaults: Defaults,

    /// Where settings and workflows are stored
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Global default settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Fallbacks for nodes that leave connection fields empty
    #[serde(default = "ApiConnection::builtin")]
    pub connection: ApiConnection,
}

fn default_timeout() -> u64 {
    300
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            connection: ApiConnection::builtin(),
        }
    }
}

/// Storage location
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Database file; `~` is expanded
    pub path: Option<String>,
}

impl FlowConfig {
    /// Load configuration from the standard hierarchy
    ///
    /// Load order (later overrides earlier):
    /// 1. Built-in defaults
    /// 2. ~/.config/flowcabal/config.toml
    /// 3. .flowcabal/config.toml (project)
    pub fn load(project_dir: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(user_config_path) = Self::user_config_path() {
            if user_config_path.exists() {
                let user_config = Self::load_file(&user_config_path)
                    .with_context(|| format!("loading {}", user_config_path.display()))?;
                config.merge(user_config);
            }
        }

        let project_config_path = project_dir
            .map(|p| p.join(".flowcabal/config.toml"))
            .unwrap_or_else(|| PathBuf::from(".flowcabal/config.toml"));

        if project_config_path.exists() {
            let project_config = Self::load_file(&project_config_path)
                .with_context(|| format!("loading {}", project_config_path.display()))?;
            config.merge(project_config);
        }

        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: Self = toml::from_str(&contents)
            .with_context(|| format!("parsing {}", path.display()))?;
        Ok(config)
    }

    /// Get the user config path (~/.config/flowcabal/config.toml)
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("flowcabal/config.toml"))
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: Self) {
        let builtin = Defaults::default();

        if other.defaults.timeout != builtin.timeout {
            self.defaults.timeout = other.defaults.timeout;
        }

        // A layer only overrides the connection fields it sets
        let conn = other.defaults.connection;
        if !conn.endpoint.trim().is_empty() && conn.endpoint != builtin.connection.endpoint {
            self.defaults.connection.endpoint = conn.endpoint;
        }
        if !conn.api_key.trim().is_empty() {
            self.defaults.connection.api_key = conn.api_key;
        }
        if !conn.model.trim().is_empty() && conn.model != builtin.connection.model {
            self.defaults.connection.model = conn.model;
        }

        if other.storage.path.is_some() {
            self.storage.path = other.storage.path;
        }
    }

    /// Resolved database path, if one is configured
    pub fn storage_path(&self) -> Option<PathBuf> {
        self.storage
            .path
            .as_deref()
            .map(|p| PathBuf::from(shellexpand::tilde(p).into_owned()))
    }
}

/// Read a workflow document (JSON) from disk
pub fn load_workflow_file(path: &Path) -> Result<WorkflowDefinition> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let workflow: WorkflowDefinition = serde_json::from_str(&contents)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(workflow)
}
