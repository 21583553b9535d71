//! Runbook Configuration Module
//!
//! Config is stored in `~/.config/runbook/config.toml`.
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. CLI flags (`--store-dir`, `--shell`)
//! 2. Environment variables (`RUNBOOK_STORE_DIR`, `RUNBOOK_SHELL`, `RUNBOOK_KEY_POLICY`)
//! 3. Config file (`RUNBOOK_CONFIG` or `~/.config/runbook/config.toml`)
//! 4. Defaults

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::environment::KeyPolicy;
use crate::error::{Result, RunbookError};
use crate::launcher::DEFAULT_SHELL;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunbookConfig {
    /// Directory holding `workflows.json`
    #[serde(default = "default_store_dir")]
    pub store_dir: PathBuf,

    /// Interpreter every workflow script is run with
    #[serde(default = "default_shell")]
    pub shell: PathBuf,

    /// Handling of argument keys that are not valid variable names
    #[serde(default)]
    pub key_policy: KeyPolicy,
}

fn default_store_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("runbook")
}

fn default_shell() -> PathBuf {
    PathBuf::from(DEFAULT_SHELL)
}

impl Default for RunbookConfig {
    fn default() -> Self {
        Self {
            store_dir: default_store_dir(),
            shell: default_shell(),
            key_policy: KeyPolicy::default(),
        }
    }
}

impl RunbookConfig {
    /// Returns `~/.config/runbook/` on Unix, `%APPDATA%/runbook/` on Windows
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("runbook")
    }

    /// `RUNBOOK_CONFIG` if set, else `~/.config/runbook/config.toml`
    pub fn config_path() -> PathBuf {
        match std::env::var_os("RUNBOOK_CONFIG") {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => Self::config_dir().join("config.toml"),
        }
    }

    /// Load from the default location, then apply env overrides
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())?.with_env()
    }

    /// Load from `path`; defaults if it doesn't exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| RunbookError::Config {
            reason: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        toml::from_str(&content).map_err(|e| RunbookError::Config {
            reason: format!("Failed to parse config file {}: {}", path.display(), e),
        })
    }

    /// Save to `path`, creating the parent directory if needed
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| RunbookError::Config {
                reason: format!("Failed to create config directory: {}", e),
            })?;
        }

        let content = toml::to_string_pretty(self).map_err(|e| RunbookError::Config {
            reason: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(path, content).map_err(|e| RunbookError::Config {
            reason: format!("Failed to write config file: {}", e),
        })
    }

    /// Environment variables take precedence over config file values
    pub fn with_env(mut self) -> Result<Self> {
        if let Some(dir) = non_empty_env("RUNBOOK_STORE_DIR") {
            self.store_dir = PathBuf::from(dir);
        }
        if let Some(shell) = non_empty_env("RUNBOOK_SHELL") {
            self.shell = PathBuf::from(shell);
        }
        if let Some(policy) = non_empty_env("RUNBOOK_KEY_POLICY") {
            self.key_policy = policy
                .parse()
                .map_err(|reason| RunbookError::Config { reason })?;
        }
        Ok(self)
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
