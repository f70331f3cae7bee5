//! In-memory cloud backend
//!
//! Objects live in one document, optionally persisted to
//! `.strata/sim-cloud.json` after every mutation so separate CLI runs see
//! the same cloud.

use crate::error::Result;
use crate::faults::{Fault, FaultPlan, Operation};
use crate::schemas::{EKS_CLUSTER, LAUNCH_TEMPLATE, NODE_GROUP, id_prefix};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use strata_cloud::{
    CreateRequest, CreatedResource, DeleteOutcome, ProviderError, ProviderResult,
};
use strata_core::{Attributes, ResourceSchema};
use tokio::fs;
use tokio::sync::Mutex;

pub const SIM_CLOUD_FILE: &str = "sim-cloud.json";
const SIM_CLOUD_DIR: &str = ".strata";

/// One object in the simulated cloud
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimObject {
    pub id: String,
    pub resource_type: String,
    pub attributes: Attributes,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CloudDocument {
    next_id: u64,
    objects: BTreeMap<String, SimObject>,
    /// Idempotency key to object id
    #[serde(default)]
    idempotency: BTreeMap<String, String>,
}

pub struct SimCloud {
    path: Option<PathBuf>,
    document: Mutex<CloudDocument>,
    faults: std::sync::Mutex<FaultPlan>,
    latency: Duration,
    calls: AtomicUsize,
}

impl SimCloud {
    pub fn in_memory() -> Self {
        Self {
            path: None,
            document: Mutex::new(CloudDocument::default()),
            faults: std::sync::Mutex::new(FaultPlan::new()),
            latency: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    /// Open the cloud persisted under `project_root`, or start an empty one.
    pub async fn open(project_root: impl AsRef<Path>) -> Result<Self> {
        let path = project_root.as_ref().join(SIM_CLOUD_DIR).join(SIM_CLOUD_FILE);
        let document = if path.exists() {
            let content = fs::read_to_string(&path).await?;
            serde_json::from_str(&content)?
        } else {
            CloudDocument::default()
        };
        tracing::debug!(path = %path.display(), objects = document.objects.len(), "Opened simulated cloud");

        Ok(Self {
            path: Some(path),
            document: Mutex::new(document),
            ..Self::in_memory()
        })
    }

    /// Delay every call by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn inject(&self, fault: Fault) {
        tracing::debug!(?fault, "Injecting fault");
        self.fault_plan().push(fault);
    }

    pub fn inject_plan(&self, plan: FaultPlan) {
        let mut faults = self.fault_plan();
        for fault in plan.into_faults() {
            faults.push(fault);
        }
    }

    fn fault_plan(&self) -> std::sync::MutexGuard<'_, FaultPlan> {
        match self.faults.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Number of provider calls served, failed ones included
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn object(&self, id: &str) -> Option<SimObject> {
        self.document.lock().await.objects.get(id).cloned()
    }

    pub async fn objects(&self, resource_type: &str) -> Vec<SimObject> {
        self.document
            .lock()
            .await
            .objects
            .values()
            .filter(|o| o.resource_type == resource_type)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.document.lock().await.objects.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Delete an object behind the engine's back.
    pub async fn remove_out_of_band(&self, id: &str) -> Result<Option<SimObject>> {
        let mut document = self.document.lock().await;
        let removed = document.objects.remove(id);
        self.persist(&document).await?;
        Ok(removed)
    }

    /// Change an attribute behind the engine's back.
    pub async fn set_out_of_band(&self, id: &str, name: &str, value: Value) -> Result<bool> {
        let mut document = self.document.lock().await;
        let Some(object) = document.objects.get_mut(id) else {
            return Ok(false);
        };
        object.attributes.insert(name.to_string(), value);
        object.updated_at = Utc::now();
        self.persist(&document).await?;
        Ok(true)
    }

    async fn persist(&self, document: &CloudDocument) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, serde_json::to_string_pretty(document)?).await?;
        fs::rename(&staging, path).await?;
        Ok(())
    }

    async fn enter(&self, resource_type: &str, operation: Operation) -> ProviderResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match self.fault_plan().take(resource_type, operation, false) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn leave(&self, resource_type: &str, operation: Operation) -> ProviderResult<()> {
        match self.fault_plan().take(resource_type, operation, true) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    pub(crate) async fn create(
        &self,
        schema: &ResourceSchema,
        request: CreateRequest,
    ) -> ProviderResult<CreatedResource> {
        let resource_type = schema.resource_type.as_str();
        self.enter(resource_type, Operation::Create).await?;

        let mut attributes = request.attributes;
        attributes.retain(|_, v| !v.is_null());
        validate(schema, &attributes)?;

        let mut document = self.document.lock().await;
        if let Some(existing) = document
            .idempotency
            .get(&request.idempotency_key)
            .and_then(|id| document.objects.get(id))
        {
            tracing::debug!(id = %existing.id, key = %request.idempotency_key, "Create replayed");
            return Ok(CreatedResource {
                id: existing.id.clone(),
                attributes: existing.attributes.clone(),
            });
        }

        document.next_id += 1;
        let id = format!("{}-{:08x}", id_prefix(resource_type), document.next_id);
        add_outputs(resource_type, &id, &mut attributes);

        let now = Utc::now();
        document.objects.insert(
            id.clone(),
            SimObject {
                id: id.clone(),
                resource_type: resource_type.to_string(),
                attributes: attributes.clone(),
                created_at: now,
                updated_at: now,
            },
        );
        document.idempotency.insert(request.idempotency_key, id.clone());
        self.persist(&document).await?;
        drop(document);

        tracing::debug!(%id, address = %request.address, "Created");
        self.leave(resource_type, Operation::Create)?;
        Ok(CreatedResource { id, attributes })
    }

    pub(crate) async fn read(&self, resource_type: &str, id: &str) -> ProviderResult<Option<Attributes>> {
        self.enter(resource_type, Operation::Read).await?;
        let document = self.document.lock().await;
        Ok(document
            .objects
            .get(id)
            .filter(|o| o.resource_type == resource_type)
            .map(|o| o.attributes.clone()))
    }

    pub(crate) async fn update(
        &self,
        schema: &ResourceSchema,
        id: &str,
        changed: &Attributes,
    ) -> ProviderResult<Attributes> {
        let resource_type = schema.resource_type.as_str();
        self.enter(resource_type, Operation::Update).await?;

        for name in changed.keys() {
            match schema.get(name) {
                None => return Err(validation(format!("unknown attribute '{}'", name))),
                Some(attr) if attr.computed || attr.requires_replacement() => {
                    return Err(validation(format!("'{}' cannot be changed in place", name)));
                }
                Some(_) => {}
            }
        }

        let mut document = self.document.lock().await;
        let Some(object) = document
            .objects
            .get_mut(id)
            .filter(|o| o.resource_type == resource_type)
        else {
            return Err(ProviderError::permanent(format!(
                "ResourceNotFound: {} {} does not exist",
                resource_type, id
            )));
        };

        let mut attributes = object.attributes.clone();
        for (name, value) in changed {
            if value.is_null() {
                attributes.remove(name);
            } else {
                attributes.insert(name.clone(), value.clone());
            }
        }
        validate_required(schema, &attributes)?;
        if resource_type == LAUNCH_TEMPLATE {
            let version = attributes.get("latest_version").and_then(Value::as_u64).unwrap_or(1);
            attributes.insert("latest_version".to_string(), Value::from(version + 1));
        }

        object.attributes = attributes.clone();
        object.updated_at = Utc::now();
        self.persist(&document).await?;
        drop(document);

        self.leave(resource_type, Operation::Update)?;
        Ok(attributes)
    }

    pub(crate) async fn delete(&self, resource_type: &str, id: &str) -> ProviderResult<DeleteOutcome> {
        self.enter(resource_type, Operation::Delete).await?;

        let mut document = self.document.lock().await;
        let Some(object) = document
            .objects
            .get(id)
            .filter(|o| o.resource_type == resource_type)
        else {
            return Ok(DeleteOutcome::NotFound);
        };

        let handles: Vec<&str> = std::iter::once(object.id.as_str())
            .chain(object.attributes.get("arn").and_then(Value::as_str))
            .collect();
        if let Some(user) = document
            .objects
            .values()
            .find(|o| o.id != id && o.attributes.values().any(|v| mentions(v, &handles)))
        {
            return Err(ProviderError::permanent(format!(
                "DependencyViolation: {} {} is still in use by {} {}",
                resource_type, id, user.resource_type, user.id
            )));
        }

        document.objects.remove(id);
        document.idempotency.retain(|_, object_id| object_id != id);
        self.persist(&document).await?;
        drop(document);

        tracing::debug!(%id, "Deleted");
        self.leave(resource_type, Operation::Delete)?;
        Ok(DeleteOutcome::Deleted)
    }
}

fn validation(message: String) -> ProviderError {
    ProviderError::permanent(format!("ValidationError: {}", message))
}

fn validate(schema: &ResourceSchema, attributes: &Attributes) -> ProviderResult<()> {
    for name in attributes.keys() {
        match schema.get(name) {
            None => return Err(validation(format!("unknown attribute '{}'", name))),
            Some(attr) if attr.computed => {
                return Err(validation(format!("'{}' is set by the cloud", name)));
            }
            Some(_) => {}
        }
    }
    validate_required(schema, attributes)
}

fn validate_required(schema: &ResourceSchema, attributes: &Attributes) -> ProviderResult<()> {
    match schema
        .attributes
        .iter()
        .find(|(name, attr)| attr.required && !attributes.contains_key(*name))
    {
        Some((name, _)) => Err(validation(format!(
            "{} requires attribute '{}'",
            schema.resource_type, name
        ))),
        None => Ok(()),
    }
}

fn add_outputs(resource_type: &str, id: &str, attributes: &mut Attributes) {
    attributes.insert("id".to_string(), Value::from(id));
    attributes.insert(
        "arn".to_string(),
        Value::from(format!("arn:sim:{}:{}", resource_type, id)),
    );
    match resource_type {
        LAUNCH_TEMPLATE => {
            attributes.insert("latest_version".to_string(), Value::from(1));
        }
        EKS_CLUSTER => {
            attributes.insert(
                "endpoint".to_string(),
                Value::from(format!("https://{}.eks.sim.local", id)),
            );
        }
        NODE_GROUP => {
            attributes.insert("status".to_string(), Value::from("ACTIVE"));
        }
        _ => {}
    }
}

/// Whether `value` contains any of `handles`, at any depth.
fn mentions(value: &Value, handles: &[&str]) -> bool {
    match value {
        Value::String(s) => handles.contains(&s.as_str()),
        Value::Array(items) => items.iter().any(|v| mentions(v, handles)),
        Value::Object(map) => map.values().any(|v| mentions(v, handles)),
        _ => false,
    }
}
