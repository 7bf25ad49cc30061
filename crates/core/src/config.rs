use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const DEFAULT_BACKEND: &str = "native";
pub const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 60;

/// Explicit paths to the external inspection tools.
///
/// Unset entries fall back to `OTOOL_BIN` / `NM_BIN`, then to the bare tool name on `PATH`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPaths {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otool: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nm: Option<PathBuf>,
}

/// Analyzer configuration, read from a JSON or YAML file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Inspection backend to use (`native` or `tools`).
    pub backend: String,
    /// Upper bound for each external tool invocation.
    pub tool_timeout_secs: u64,
    pub tools: ToolPaths,
    /// Embedded frameworks directory used to size package products.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frameworks_dir: Option<PathBuf>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            tool_timeout_secs: DEFAULT_TOOL_TIMEOUT_SECS,
            tools: ToolPaths::default(),
            frameworks_dir: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse JSON config {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to parse YAML config {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Unsupported config format for {0} (expected .json, .yaml, or .yml)")]
    UnsupportedFormat(PathBuf),
}

impl AnalyzerConfig {
    /// Load a config file; the format is chosen by extension.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default().to_lowercase();
        if !matches!(ext.as_str(), "json" | "yaml" | "yml") {
            return Err(ConfigError::UnsupportedFormat(path.to_path_buf()));
        }
        let body = fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        if ext == "json" {
            serde_json::from_str(&body)
                .map_err(|source| ConfigError::Json { path: path.to_path_buf(), source })
        } else {
            serde_yaml::from_str(&body)
                .map_err(|source| ConfigError::Yaml { path: path.to_path_buf(), source })
        }
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }
}
