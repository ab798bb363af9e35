use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use visor_util::dirs_path;
use visor_util::errors::VisorError;

/// Global user configuration loaded from `~/.visor/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,
}

/// Coordinator settings from `[coordinator]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default = "default_uri")]
    pub uri: String,
    #[serde(default = "default_root")]
    pub root: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            uri: default_uri(),
            root: default_root(),
        }
    }
}

fn default_uri() -> String {
    "file:~/.visor/registry.json".to_string()
}

fn default_root() -> String {
    visor_store::DEFAULT_ROOT.to_string()
}

impl GlobalConfig {
    /// Load the global configuration from `~/.visor/config.toml`, or return defaults if the file doesn't exist.
    pub fn load() -> miette::Result<Self> {
        Self::load_from(&Self::default_path())
    }

    /// Load from an explicit path; a missing file yields defaults.
    pub fn load_from(path: &std::path::Path) -> miette::Result<Self> {
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|e| VisorError::Config {
            message: format!("failed to read {}: {e}", path.display()),
        })?;
        toml::from_str(&content).map_err(|e| {
            VisorError::Config {
                message: format!("failed to parse {}: {e}", path.display()),
            }
            .into()
        })
    }

    /// Returns the default path to the global config file.
    pub fn default_path() -> PathBuf {
        dirs_path().join("config.toml")
    }
}
