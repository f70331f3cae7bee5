//! Plan executor
//!
//! Each entry moves `Pending -> InProgress -> {Succeeded, Failed}`, or is
//! marked `Skipped` when something it waits on failed, or `NotStarted`
//! when cancellation stopped dispatch before it became ready.
//!
//! Ready entries run concurrently on a [`JoinSet`], bounded by a
//! semaphore. References are resolved against the live state store at
//! dispatch time, so identities assigned by earlier creates flow to
//! their dependents.
//!
//! Cancellation only ever drops a provider call, never a state commit. A
//! call that returned is recorded before the entry finishes.

use crate::error::{CloudError, ProviderError, Result};
use crate::provider::{CreateRequest, CreatedResource, DeleteOutcome, ResourceProvider};
use crate::registry::ProviderRegistry;
use crate::retry::{RetryConfig, retry_with_backoff};
use crate::state::StateStore;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use strata_core::{
    Attributes, Plan, PlanAction, PlanEntry, Reference, ResourceAddress, ResourceSpec,
    ResourceState,
};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_PARALLELISM: usize = 10;

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Maximum number of provider operations in flight
    pub parallelism: usize,
    pub retry: RetryConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            parallelism: DEFAULT_PARALLELISM,
            retry: RetryConfig::default(),
        }
    }
}

/// Terminal outcome of one plan entry
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// Resulting state, or `None` when the instance was removed
    Succeeded(Option<ResourceState>),
    Failed(String),
    Skipped { failed_dependency: ResourceAddress },
    NotStarted,
}

impl ApplyOutcome {
    pub fn is_succeeded(&self) -> bool {
        matches!(self, ApplyOutcome::Succeeded(_))
    }

    pub fn label(&self) -> &'static str {
        match self {
            ApplyOutcome::Succeeded(_) => "succeeded",
            ApplyOutcome::Failed(_) => "failed",
            ApplyOutcome::Skipped { .. } => "skipped",
            ApplyOutcome::NotStarted => "not started",
        }
    }
}

/// Result of a single plan entry
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyResult {
    /// Position of the entry in the plan
    pub index: usize,
    pub address: ResourceAddress,
    pub action: PlanAction,
    pub replacement: bool,
    pub deposed: bool,
    pub outcome: ApplyOutcome,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyCounts {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub not_started: usize,
}

impl fmt::Display for ApplyCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed, {} skipped, {} not started",
            self.succeeded, self.failed, self.skipped, self.not_started
        )
    }
}

/// One result per plan entry, in plan order
#[derive(Debug, Clone, PartialEq)]
pub struct ApplyReport {
    pub results: Vec<ApplyResult>,
    pub cancelled: bool,
    pub duration_ms: u64,
}

impl ApplyReport {
    pub fn counts(&self) -> ApplyCounts {
        self.results
            .iter()
            .fold(ApplyCounts::default(), |mut counts, r| {
                match r.outcome {
                    ApplyOutcome::Succeeded(_) => counts.succeeded += 1,
                    ApplyOutcome::Failed(_) => counts.failed += 1,
                    ApplyOutcome::Skipped { .. } => counts.skipped += 1,
                    ApplyOutcome::NotStarted => counts.not_started += 1,
                }
                counts
            })
    }

    pub fn is_success(&self) -> bool {
        self.results.iter().all(|r| r.outcome.is_succeeded())
    }

    pub fn result_for(&self, address: &ResourceAddress, action: PlanAction) -> Option<&ApplyResult> {
        self.results
            .iter()
            .find(|r| &r.address == address && r.action == action)
    }
}

pub struct Executor {
    registry: Arc<ProviderRegistry>,
    store: Arc<StateStore>,
    config: ExecutorConfig,
    cancel: CancellationToken,
    run_id: String,
}

impl Executor {
    pub fn new(registry: Arc<ProviderRegistry>, store: Arc<StateStore>, config: ExecutorConfig) -> Self {
        Self {
            registry,
            store,
            config,
            cancel: CancellationToken::new(),
            run_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Prefix of every create idempotency key issued by this executor
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub async fn execute(&self, plan: &Plan) -> ApplyReport {
        let started = Instant::now();
        let n = plan.entries.len();
        let mut outcomes: Vec<Option<ApplyOutcome>> = vec![None; n];
        let mut dispatched = vec![false; n];
        let mut running: HashMap<tokio::task::Id, usize> = HashMap::new();
        let mut tasks: JoinSet<(usize, ApplyOutcome)> = JoinSet::new();
        let semaphore = Arc::new(Semaphore::new(self.config.parallelism.max(1)));
        let worker = Arc::new(Worker {
            registry: self.registry.clone(),
            store: self.store.clone(),
            retry: self.config.retry.clone(),
            run_id: self.run_id.clone(),
            cancel: self.cancel.clone(),
        });
        let mut cancelled = false;

        tracing::info!(run_id = %self.run_id, entries = n, parallelism = self.config.parallelism, "Executing plan");

        loop {
            propagate_skips(plan, &mut outcomes, &dispatched);

            if !cancelled && self.cancel.is_cancelled() {
                cancelled = true;
                tracing::warn!(in_flight = running.len(), "Cancellation requested, no new operations will start");
            }

            let mut progressed = false;
            if !cancelled {
                for (i, entry) in plan.entries.iter().enumerate() {
                    if dispatched[i] || outcomes[i].is_some() {
                        continue;
                    }
                    let ready = entry
                        .depends_on
                        .iter()
                        .all(|&d| outcomes[d].as_ref().is_some_and(|o| o.is_succeeded()));
                    if !ready {
                        continue;
                    }
                    if self.cancel.is_cancelled() {
                        break;
                    }

                    if entry.is_noop() {
                        dispatched[i] = true;
                        outcomes[i] = Some(ApplyOutcome::Succeeded(self.store.get(&entry.address).await));
                        progressed = true;
                        continue;
                    }

                    let Ok(permit) = semaphore.clone().try_acquire_owned() else {
                        break;
                    };
                    dispatched[i] = true;

                    let worker = worker.clone();
                    let entry = entry.clone();
                    let handle = tasks.spawn(async move {
                        let _permit = permit;
                        (i, worker.run(entry).await)
                    });
                    running.insert(handle.id(), i);
                }
            }

            if progressed {
                continue;
            }
            if tasks.is_empty() {
                break;
            }

            tokio::select! {
                joined = tasks.join_next_with_id() => match joined {
                    Some(Ok((id, (i, outcome)))) => {
                        running.remove(&id);
                        outcomes[i] = Some(outcome);
                    }
                    Some(Err(e)) => {
                        if let Some(i) = running.remove(&e.id()) {
                            let message = format!("operation panicked: {}", e);
                            tracing::warn!(resource = %plan.entries[i].address, %message, "Operation did not complete");
                            outcomes[i] = Some(ApplyOutcome::Failed(message));
                        }
                    }
                    None => {}
                },
                _ = self.cancel.cancelled(), if !cancelled => {}
            }
        }

        let results: Vec<ApplyResult> = plan
            .entries
            .iter()
            .zip(outcomes)
            .enumerate()
            .map(|(index, (entry, outcome))| ApplyResult {
                index,
                address: entry.address.clone(),
                action: entry.action,
                replacement: entry.replacement,
                deposed: entry.deposed,
                outcome: outcome.unwrap_or(ApplyOutcome::NotStarted),
            })
            .collect();

        let report = ApplyReport {
            results,
            cancelled,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        tracing::info!(counts = %report.counts(), duration_ms = report.duration_ms, "Plan executed");
        report
    }
}

/// Entries waiting on a failed or skipped entry are skipped, naming the
/// original failure. Dependencies always precede dependents in a plan,
/// so one forward pass reaches every transitive dependent.
fn propagate_skips(plan: &Plan, outcomes: &mut [Option<ApplyOutcome>], dispatched: &[bool]) {
    for i in 0..plan.entries.len() {
        if outcomes[i].is_some() || dispatched[i] {
            continue;
        }
        let root = plan.entries[i]
            .depends_on
            .iter()
            .find_map(|&d| match &outcomes[d] {
                Some(ApplyOutcome::Failed(_)) => Some(plan.entries[d].address.clone()),
                Some(ApplyOutcome::Skipped { failed_dependency }) => Some(failed_dependency.clone()),
                _ => None,
            });
        if let Some(failed_dependency) = root {
            tracing::info!(resource = %plan.entries[i].address, failed = %failed_dependency, "Skipping");
            outcomes[i] = Some(ApplyOutcome::Skipped { failed_dependency });
        }
    }
}

/// Runs one entry against its provider and commits the result.
struct Worker {
    registry: Arc<ProviderRegistry>,
    store: Arc<StateStore>,
    retry: RetryConfig,
    run_id: String,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(&self, entry: PlanEntry) -> ApplyOutcome {
        tracing::info!(resource = %entry.address, action = %entry.action, "Starting");

        let result = match entry.action {
            PlanAction::Create => self.create(&entry).await.map(Some),
            PlanAction::Update => self.update(&entry).await,
            PlanAction::Destroy => self.destroy(&entry).await.map(|_| None),
            PlanAction::NoOp => Ok(self.store.get(&entry.address).await),
        };

        match result {
            Ok(state) => {
                tracing::info!(resource = %entry.address, action = %entry.action, "Complete");
                ApplyOutcome::Succeeded(state)
            }
            Err(e) => {
                tracing::warn!(resource = %entry.address, action = %entry.action, error = %e, "Failed");
                ApplyOutcome::Failed(e.to_string())
            }
        }
    }

    /// Await a provider call. Abortable providers have the call dropped
    /// once cancellation fires; a call that already returned wins.
    async fn call<T, Fut>(&self, provider: &dyn ResourceProvider, operation: Fut) -> Result<T>
    where
        Fut: Future<Output = std::result::Result<T, ProviderError>>,
    {
        if !provider.capabilities().abortable {
            return Ok(operation.await?);
        }
        tokio::select! {
            biased;
            result = operation => Ok(result?),
            _ = self.cancel.cancelled() => Err(CloudError::Aborted),
        }
    }

    fn declaration<'e>(&self, entry: &'e PlanEntry) -> Result<&'e ResourceSpec> {
        entry.spec.as_ref().ok_or_else(|| {
            CloudError::StateError(format!("{} {} has no declaration", entry.action, entry.address))
        })
    }

    /// Resolve every declared attribute against live state.
    async fn resolve(&self, spec: &ResourceSpec) -> Result<Attributes> {
        let snapshot = self.store.snapshot().await;
        let lookup = |r: &Reference| {
            snapshot
                .get(&r.address)
                .and_then(|s| s.get_attribute(&r.attribute))
                .cloned()
        };
        spec.attributes
            .iter()
            .map(|(name, expr)| {
                expr.resolve(&lookup)
                    .map(|value| (name.clone(), value))
                    .ok_or_else(|| CloudError::UnresolvedReference {
                        address: spec.address.clone(),
                        attribute: name.clone(),
                    })
            })
            .collect()
    }

    async fn create(&self, entry: &PlanEntry) -> Result<ResourceState> {
        let spec = self.declaration(entry)?;
        let provider = self.registry.get(entry.address.resource_type())?;
        let request = CreateRequest {
            address: entry.address.clone(),
            attributes: self.resolve(spec).await?,
            idempotency_key: format!("{}:{}", self.run_id, entry.address),
        };

        let operation = format!("create {}", entry.address);
        let CreatedResource { id, mut attributes } = self
            .call(
                provider.as_ref(),
                retry_with_backoff(&self.retry, &operation, || {
                    let provider = provider.clone();
                    let request = request.clone();
                    async move { provider.create(request).await }
                }),
            )
            .await?;

        attributes
            .entry("id".to_string())
            .or_insert_with(|| Value::from(id.clone()));
        self.store
            .commit_create(
                &entry.address,
                id,
                attributes,
                spec.dependencies().into_iter().collect(),
            )
            .await
    }

    async fn update(&self, entry: &PlanEntry) -> Result<Option<ResourceState>> {
        let spec = self.declaration(entry)?;
        let provider = self.registry.get(entry.address.resource_type())?;
        let current = self.store.get(&entry.address).await.ok_or_else(|| {
            CloudError::StateError(format!("{} is not in state", entry.address))
        })?;

        let resolved = self.resolve(spec).await?;
        let changed: Attributes = entry
            .changed_attributes()
            .map(|name| (name.to_string(), resolved.get(name).cloned().unwrap_or(Value::Null)))
            .collect();

        let operation = format!("update {}", entry.address);
        let mut attributes = self
            .call(
                provider.as_ref(),
                retry_with_backoff(&self.retry, &operation, || {
                    let provider = provider.clone();
                    let id = current.id.clone();
                    let changed = changed.clone();
                    async move { provider.update(&id, &changed).await }
                }),
            )
            .await?;

        attributes
            .entry("id".to_string())
            .or_insert_with(|| Value::from(current.id.clone()));
        self.store
            .commit_update(&entry.address, attributes, spec.dependencies().into_iter().collect())
            .await
    }

    async fn destroy(&self, entry: &PlanEntry) -> Result<()> {
        let provider = self.registry.get(entry.address.resource_type())?;
        let id = entry.instance_id.clone().ok_or_else(|| {
            CloudError::StateError(format!("destroy of {} has no instance id", entry.address))
        })?;

        let operation = format!("delete {}", entry.address);
        let outcome = self
            .call(
                provider.as_ref(),
                retry_with_backoff(&self.retry, &operation, || {
                    let provider = provider.clone();
                    let id = id.clone();
                    async move { provider.delete(&id).await }
                }),
            )
            .await?;

        if outcome == DeleteOutcome::NotFound {
            tracing::debug!(resource = %entry.address, id = %id, "Already gone");
        }
        self.store.commit_destroy(&entry.address, &id).await
    }
}
