//! Project discovery and engine setup

use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use strata_cloud::state::STATE_DIR;
use strata_cloud::{Engine, EngineOptions, RetryConfig};
use strata_cloud_sim::{FaultPlan, SimCloud};
use strata_config::{ConfigError, Settings};
use strata_core::Configuration;

/// Scripted provider faults, e.g. `vpc:create:permanent`
pub const SIM_FAULTS_ENV: &str = "STRATA_SIM_FAULTS";

pub struct Project {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub config: Configuration,
    pub settings: Settings,
}

impl Project {
    pub fn load() -> anyhow::Result<Self> {
        let config_path = strata_config::find_config_file()?;
        let root = root_for(&config_path);
        let config = strata_core::parse_kdl_file(&config_path)
            .with_context(|| format!("failed to load {}", config_path.display()))?;
        let settings = Settings::load(&root)?;

        tracing::debug!(
            project = %config.project,
            config = %config_path.display(),
            resources = config.resources.len(),
            "Loaded project"
        );
        Ok(Self {
            root,
            config_path,
            config,
            settings,
        })
    }

    pub async fn engine(&self, parallelism: Option<usize>) -> anyhow::Result<Engine> {
        let cloud = SimCloud::open(&self.root).await?;
        if let Ok(faults) = std::env::var(SIM_FAULTS_ENV) {
            let plan: FaultPlan = faults.parse()?;
            cloud.inject_plan(plan);
        }

        let retry = &self.settings.retry;
        let options = EngineOptions {
            parallelism: parallelism.unwrap_or(self.settings.parallelism).max(1),
            retry: RetryConfig {
                max_attempts: retry.max_attempts,
                initial_delay: retry.initial_delay(),
                max_delay: retry.max_delay(),
                backoff_multiplier: retry.multiplier,
            },
            lock_timeout: self.settings.lock_timeout(),
        };
        Ok(Engine::new(strata_cloud_sim::registry(Arc::new(cloud)), &self.root).with_options(options))
    }
}

/// Project root for commands that work without a configuration file
pub fn locate_root() -> anyhow::Result<PathBuf> {
    match strata_config::find_config_file() {
        Ok(path) => Ok(root_for(&path)),
        Err(ConfigError::ConfigFileNotFound) => Ok(std::env::current_dir()?),
        Err(e) => Err(e.into()),
    }
}

/// Directory holding the configuration, or the one above `.strata/`.
fn root_for(config_path: &Path) -> PathBuf {
    let dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    if dir.file_name().is_some_and(|name| name == STATE_DIR) {
        dir.parent().unwrap_or(dir).to_path_buf()
    } else {
        dir.to_path_buf()
    }
}
