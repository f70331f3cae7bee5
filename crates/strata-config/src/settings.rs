//! Engine settings from `settings.yaml`
//!
//! Looked up in `<project>/.strata/settings.yaml`, then in the user config
//! directory. Missing keys take their defaults. `STRATA_PARALLELISM` and
//! `STRATA_LOCK_TIMEOUT` (seconds) override whatever the file says.

use crate::error::{ConfigError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const SETTINGS_FILE: &str = "settings.yaml";
pub const PARALLELISM_ENV: &str = "STRATA_PARALLELISM";
pub const LOCK_TIMEOUT_ENV: &str = "STRATA_LOCK_TIMEOUT";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            multiplier: 2.0,
        }
    }
}

impl RetrySettings {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Provider operations in flight at once
    pub parallelism: usize,
    /// Refresh recorded state before planning
    pub refresh: bool,
    /// Age in seconds after which a state lock counts as abandoned
    pub lock_timeout_secs: u64,
    pub retry: RetrySettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            parallelism: 10,
            refresh: true,
            lock_timeout_secs: 3600,
            retry: RetrySettings::default(),
        }
    }
}

impl Settings {
    /// Settings for the project at `project_root`, environment applied
    pub fn load(project_root: &Path) -> Result<Self> {
        let mut settings = match Self::locate(project_root) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        settings.apply_env()?;
        settings.validate()?;
        Ok(settings)
    }

    fn locate(project_root: &Path) -> Option<PathBuf> {
        let project = project_root.join(".strata").join(SETTINGS_FILE);
        if project.exists() {
            return Some(project);
        }
        dirs::config_dir()
            .map(|dir| dir.join("strata").join(SETTINGS_FILE))
            .filter(|path| path.exists())
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let settings = Self::from_yaml(&content).map_err(|source| ConfigError::InvalidSettings {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "Loaded settings");
        Ok(settings)
    }

    pub fn from_yaml(content: &str) -> std::result::Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(parallelism) = env_number(PARALLELISM_ENV)? {
            self.parallelism = parallelism as usize;
        }
        if let Some(secs) = env_number(LOCK_TIMEOUT_ENV)? {
            self.lock_timeout_secs = secs;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.parallelism == 0 {
            return Err(ConfigError::Invalid("parallelism must be at least 1".to_string()));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.retry.multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "retry.multiplier must be at least 1.0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }
}

fn env_number(name: &str) -> Result<Option<u64>> {
    match std::env::var(name) {
        Ok(value) => match value.trim().parse::<u64>() {
            Ok(number) => Ok(Some(number)),
            Err(_) => Err(ConfigError::InvalidEnv {
                name: name.to_string(),
                value,
            }),
        },
        Err(_) => Ok(None),
    }
}
