//! Live state store used while a plan executes
//!
//! Every commit takes the per-address mutex, then the document lock, then
//! persists the whole document. One save per committed operation.
//!
//! Changes are made on a copy of the document, which replaces the live one
//! only once it is on disk.

use super::{StateDocument, StateManager};
use crate::error::Result;
use std::collections::HashMap;
use std::sync::Arc;
use strata_core::{Attributes, ResourceAddress, ResourceState, StateSnapshot};
use tokio::sync::Mutex;

pub struct StateStore {
    manager: StateManager,
    document: Mutex<StateDocument>,
    addresses: std::sync::Mutex<HashMap<ResourceAddress, Arc<Mutex<()>>>>,
}

impl StateStore {
    /// Wrap a loaded document. The caller must hold the state lock.
    pub fn open(manager: StateManager, document: StateDocument) -> Self {
        Self {
            manager,
            document: Mutex::new(document),
            addresses: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn address_lock(&self, address: &ResourceAddress) -> Arc<Mutex<()>> {
        let mut locks = match self.addresses.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        locks.entry(address.clone()).or_default().clone()
    }

    pub async fn snapshot(&self) -> StateSnapshot {
        self.document.lock().await.snapshot()
    }

    pub async fn document(&self) -> StateDocument {
        self.document.lock().await.clone()
    }

    pub async fn get(&self, address: &ResourceAddress) -> Option<ResourceState> {
        self.document.lock().await.get(address).cloned()
    }

    async fn persist(&self, live: &mut StateDocument, mut next: StateDocument) -> Result<()> {
        self.manager.save(&mut next).await?;
        *live = next;
        Ok(())
    }

    /// Replace every recorded resource at once and persist.
    pub async fn replace_all(&self, resources: StateSnapshot) -> Result<()> {
        let mut document = self.document.lock().await;
        let mut next = document.clone();
        next.resources = resources;
        self.persist(&mut document, next).await
    }

    /// Record a created instance. An existing current instance becomes
    /// deposed, which is what a create-before-destroy replacement expects.
    pub async fn commit_create(
        &self,
        address: &ResourceAddress,
        id: String,
        attributes: Attributes,
        dependencies: Vec<ResourceAddress>,
    ) -> Result<ResourceState> {
        let lock = self.address_lock(address);
        let _guard = lock.lock().await;

        let mut document = self.document.lock().await;
        let mut next = document.clone();
        let state = match next.resources.get_mut(address) {
            Some(existing) => {
                tracing::debug!(resource = %address, deposed = %existing.id, "Deposing previous instance");
                existing.depose_and_replace(id, attributes);
                existing.dependencies = dependencies;
                existing.clone()
            }
            None => {
                let state = ResourceState::new(address.clone(), id, attributes)
                    .with_dependencies(dependencies);
                next.set(state.clone());
                state
            }
        };
        self.persist(&mut document, next).await?;
        Ok(state)
    }

    pub async fn commit_update(
        &self,
        address: &ResourceAddress,
        attributes: Attributes,
        dependencies: Vec<ResourceAddress>,
    ) -> Result<Option<ResourceState>> {
        let lock = self.address_lock(address);
        let _guard = lock.lock().await;

        let mut document = self.document.lock().await;
        let mut next = document.clone();
        let state = next.resources.get_mut(address).map(|existing| {
            existing.set_attributes(attributes);
            existing.dependencies = dependencies;
            existing.clone()
        });
        self.persist(&mut document, next).await?;
        Ok(state)
    }

    /// Forget a destroyed instance, current or deposed.
    pub async fn commit_destroy(&self, address: &ResourceAddress, instance_id: &str) -> Result<()> {
        let lock = self.address_lock(address);
        let _guard = lock.lock().await;

        let mut document = self.document.lock().await;
        let mut next = document.clone();
        let current = next.get(address).map(|r| (r.id == instance_id, r.deposed.len()));
        match current {
            None => return Ok(()),
            Some((true, deposed)) => {
                if deposed > 0 {
                    tracing::warn!(resource = %address, deposed, "Removing resource with deposed instances left");
                }
                next.remove(address);
            }
            Some((false, _)) => {
                if let Some(existing) = next.resources.get_mut(address) {
                    existing.deposed.retain(|d| d.id != instance_id);
                }
            }
        }
        self.persist(&mut document, next).await
    }
}
