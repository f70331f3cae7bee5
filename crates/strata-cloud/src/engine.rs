//! Plan/apply orchestration
//!
//! The caller holds the [`StateLock`] across `plan` and `apply` so nothing
//! else can change state in between. `apply` still checks the state serial
//! it planned against.

use crate::error::{CloudError, Result};
use crate::executor::{ApplyReport, DEFAULT_PARALLELISM, Executor, ExecutorConfig};
use crate::refresh::{RefreshReport, refresh};
use crate::registry::ProviderRegistry;
use crate::retry::RetryConfig;
use crate::state::{StateLock, StateManager, StateStore};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use strata_core::{
    Configuration, DependencyGraph, Plan, PlanMode, SchemaRegistry, StateSnapshot, diff,
    diff_destroy,
};
use tokio_util::sync::CancellationToken;

pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub parallelism: usize,
    pub retry: RetryConfig,
    /// Age after which a lock is treated as abandoned
    pub lock_timeout: Duration,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            parallelism: DEFAULT_PARALLELISM,
            retry: RetryConfig::default(),
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

/// A plan together with the state it was computed from
#[derive(Debug, Clone)]
pub struct PlannedRun {
    pub plan: Plan,
    /// Recorded state after refresh
    pub state: StateSnapshot,
    pub refresh: Option<RefreshReport>,
    base_serial: u64,
    lineage: String,
}

impl PlannedRun {
    pub fn base_serial(&self) -> u64 {
        self.base_serial
    }
}

pub struct Engine {
    registry: Arc<ProviderRegistry>,
    manager: StateManager,
    options: EngineOptions,
}

impl Engine {
    pub fn new(registry: ProviderRegistry, project_root: impl AsRef<Path>) -> Self {
        Self {
            registry: Arc::new(registry),
            manager: StateManager::new(project_root),
            options: EngineOptions::default(),
        }
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn state_manager(&self) -> &StateManager {
        &self.manager
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn schemas(&self) -> SchemaRegistry {
        self.registry.schemas()
    }

    /// Check the configuration against provider schemas and the graph.
    pub fn validate(&self, config: &Configuration) -> Result<()> {
        self.schemas().validate(&config.resources)?;
        let graph = DependencyGraph::build(&config.resources)?;
        tracing::debug!(project = %config.project, resources = graph.len(), "Configuration is valid");
        Ok(())
    }

    pub async fn lock(&self, operation: &str) -> Result<StateLock> {
        self.manager
            .acquire_lock(operation, self.options.lock_timeout)
            .await
    }

    /// Diff the configuration against recorded state, refreshing it first
    /// when asked. Nothing is written.
    pub async fn plan(
        &self,
        config: &Configuration,
        mode: PlanMode,
        refresh_state: bool,
    ) -> Result<PlannedRun> {
        let document = self.manager.load().await?;
        let recorded = document.snapshot();

        let (state, refresh_report) = if refresh_state && !recorded.is_empty() {
            let report = refresh(&self.registry, &recorded, &self.options.retry).await?;
            (report.state.clone(), Some(report))
        } else {
            (recorded, None)
        };

        let plan = match mode {
            PlanMode::Normal => diff(&config.resources, &state, &self.schemas())?,
            PlanMode::Destroy => diff_destroy(&config.resources, &state)?,
        };

        tracing::info!(
            project = %config.project,
            mode = ?mode,
            summary = %plan.summary(),
            "Planned"
        );
        Ok(PlannedRun {
            plan,
            state,
            refresh: refresh_report,
            base_serial: document.serial,
            lineage: document.lineage,
        })
    }

    /// Execute a planned run under `lock`.
    ///
    /// Refreshed state is written first so the executor starts from what
    /// the plan saw. The returned report is `Ok` even when entries fail.
    pub async fn apply(
        &self,
        run: &PlannedRun,
        lock: &StateLock,
        cancel: CancellationToken,
    ) -> Result<ApplyReport> {
        match self.manager.read_lock().await? {
            Some(current) if current.id == lock.id() => {}
            Some(current) => {
                return Err(CloudError::LockMismatch {
                    expected: lock.id().to_string(),
                    found: current.id,
                });
            }
            None => return Err(CloudError::NotLocked),
        }

        let document = self.manager.load().await?;
        // Never-saved state gets a fresh lineage on every load.
        let never_saved = run.base_serial == 0 && document.serial == 0;
        if document.serial != run.base_serial || (!never_saved && document.lineage != run.lineage) {
            return Err(CloudError::StateError(format!(
                "state changed since the plan was made (serial {} -> {}); plan again",
                run.base_serial, document.serial
            )));
        }

        let store = Arc::new(StateStore::open(self.manager.clone(), document));
        if run.refresh.as_ref().is_some_and(|r| r.has_changes()) {
            tracing::info!("Persisting refreshed state");
            store.replace_all(run.state.clone()).await?;
        }

        let executor = Executor::new(
            self.registry.clone(),
            store,
            ExecutorConfig {
                parallelism: self.options.parallelism,
                retry: self.options.retry.clone(),
            },
        )
        .with_cancellation(cancel);

        Ok(executor.execute(&run.plan).await)
    }
}
