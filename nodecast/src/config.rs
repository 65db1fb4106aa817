//! Client configuration
//!
//! Default config file: `./nodecast.toml`

use crate::error::{ClusterError, Result};
use crate::node::NodeRole;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration file
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub cluster: ClusterConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Fan-out client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClusterConfig {
    /// Per-node command timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Connection establishment timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// What a facade call does when its selector matches no node
    #[serde(default)]
    pub empty_selection: EmptySelectionPolicy,

    /// Worker threads for the client runtime (defaults to the tokio default)
    pub worker_threads: Option<usize>,

    /// Static cluster membership
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

fn default_request_timeout() -> u64 {
    5000
}

fn default_connect_timeout() -> u64 {
    2000
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout(),
            connect_timeout_ms: default_connect_timeout(),
            empty_selection: EmptySelectionPolicy::default(),
            worker_threads: None,
            nodes: Vec::new(),
        }
    }
}

impl ClusterConfig {
    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Check the configuration for values that can never work
    pub fn validate(&self) -> Result<()> {
        if self.request_timeout_ms == 0 {
            return Err(ClusterError::Config(
                "request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.worker_threads == Some(0) {
            return Err(ClusterError::Config(
                "worker_threads must be greater than zero".to_string(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for node in &self.nodes {
            if node.id.trim().is_empty() {
                return Err(ClusterError::Config(format!(
                    "node at '{}' has an empty id",
                    node.address
                )));
            }
            if !seen.insert(node.id.as_str()) {
                return Err(ClusterError::Config(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
        }
        Ok(())
    }
}

/// Policy applied when a selector matches no node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmptySelectionPolicy {
    /// Fail the call with `ClusterError::EmptySelection`
    #[default]
    Error,
    /// Return an aggregate with zero entries
    Empty,
}

/// One statically configured cluster member
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct NodeConfig {
    pub id: String,
    /// host:port
    pub address: String,
    #[serde(default)]
    pub role: NodeRole,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log output format: "pretty" or "json"
    /// Override with LOG_FORMAT env var
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter string
    /// Override with RUST_LOG env var
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_log_level() -> String {
    "warn,nodecast=info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Load config from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.cluster.validate()?;
        Ok(config)
    }

    /// Load config from a TOML file, falling back to defaults when it does not exist
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write config as TOML
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        fs::write(path, content)?;
        Ok(())
    }
}
