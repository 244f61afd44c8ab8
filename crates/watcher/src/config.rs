//! Watch session configuration
//!
//! Loaded from TOML, e.g.:
//! ```toml
//! roots = ["src", "/var/data/incoming"]
//! thread_name = "my-watcher"
//! ```

use crate::error::{Result, WatchError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Directories to watch recursively
    #[serde(default)]
    pub roots: Vec<PathBuf>,

    /// Name of the background thread (default: "treewatch-monitor")
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            roots: vec![],
            thread_name: default_thread_name(),
        }
    }
}

fn default_thread_name() -> String {
    "treewatch-monitor".to_string()
}

impl WatchConfig {
    /// Load and validate a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: WatchConfig =
            toml::from_str(contents).map_err(|e| WatchError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        validate_thread_name(&self.thread_name)
    }
}

pub(crate) fn validate_thread_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(WatchError::Config("thread_name must not be empty".to_string()));
    }
    // Thread names are passed to the OS as C strings
    if name.contains('\0') {
        return Err(WatchError::Config(
            "thread_name must not contain NUL bytes".to_string(),
        ));
    }
    Ok(())
}
