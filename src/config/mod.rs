//! Configuration management for the component manager
//!
//! Handles configuration loading from TOML/JSON files and environment
//! overrides.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::utils::{env_flag, env_opt};

/// Environment variable naming the components root
pub const ENV_COMPONENTS_ROOT: &str = "COMPONENTS_ROOT";
/// Environment switch reversing module load order
pub const ENV_REVERSE_LOAD: &str = "COMPONENTS_REVERSE_LOAD";
/// Environment switch enabling demo declarations
pub const ENV_DEMO: &str = "COMPONENTS_DEMO";
/// Environment switch selecting close-on-exit shutdown
pub const ENV_CLOSE_ON_SHUTDOWN: &str = "COMPONENTS_CLOSE_ON_SHUTDOWN";

/// When the manager closes itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPolicy {
    /// Close when the process shuts down (last handle dropped or signal)
    CloseOnExit,
    /// Close when the last attached dependent detaches
    LastDependentDetached,
}

impl Default for ShutdownPolicy {
    fn default() -> Self {
        ShutdownPolicy::LastDependentDetached
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log filter (e.g. "info", "component_manager=debug")
    #[serde(default)]
    pub filter: Option<String>,

    /// Emit JSON lines (requires the `json-logging` feature)
    #[serde(default)]
    pub json_format: bool,
}

/// Component container configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Directory containing module directories
    #[serde(default = "default_components_root")]
    pub components_root: PathBuf,

    /// Load modules in descending name order
    #[serde(default)]
    pub reverse_load_order: bool,

    /// Load `components-demo.toml` files
    #[serde(default)]
    pub demo: bool,

    /// Shutdown policy
    #[serde(default)]
    pub shutdown_policy: ShutdownPolicy,

    /// Flat property map (`property@service` overrides and `${key}` values)
    #[serde(default)]
    pub properties: HashMap<String, String>,

    /// Logging configuration
    #[serde(default)]
    pub logging: Option<LoggingConfig>,
}

fn default_components_root() -> PathBuf {
    PathBuf::from("components")
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            components_root: default_components_root(),
            reverse_load_order: false,
            demo: false,
            shutdown_policy: ShutdownPolicy::default(),
            properties: HashMap::new(),
            logging: None,
        }
    }
}

impl ContainerConfig {
    /// Load configuration from a TOML or JSON file, chosen by extension
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_file(path),
            _ => Self::from_toml_file(path),
        }
    }

    /// Load configuration from JSON file
    pub fn from_json_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ContainerConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from TOML file
    pub fn from_toml_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ContainerConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to JSON file
    pub fn to_json_file(&self, path: &Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Apply `COMPONENTS_*` environment overrides
    ///
    /// Boolean switches only ever turn a setting on.
    pub fn apply_env_overrides(mut self) -> Self {
        if let Some(root) = env_opt(ENV_COMPONENTS_ROOT) {
            debug!("{} overrides components root: {}", ENV_COMPONENTS_ROOT, root);
            self.components_root = PathBuf::from(root);
        }
        if let Some(reverse) = env_flag(ENV_REVERSE_LOAD) {
            self.reverse_load_order = reverse;
        }
        if let Some(demo) = env_flag(ENV_DEMO) {
            self.demo = demo;
        }
        if let Some(close) = env_flag(ENV_CLOSE_ON_SHUTDOWN) {
            self.shutdown_policy = if close {
                ShutdownPolicy::CloseOnExit
            } else {
                ShutdownPolicy::LastDependentDetached
            };
        }
        self
    }
}
