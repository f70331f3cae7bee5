//! Provider lookup table

use crate::error::{CloudError, Result};
use crate::provider::ResourceProvider;
use std::collections::BTreeMap;
use std::sync::Arc;
use strata_core::SchemaRegistry;

#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn ResourceProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Later registrations for the same type replace earlier ones.
    pub fn register(&mut self, provider: Arc<dyn ResourceProvider>) {
        let resource_type = provider.resource_type().to_string();
        tracing::debug!(resource_type = %resource_type, "Registered provider");
        self.providers.insert(resource_type, provider);
    }

    pub fn with(mut self, provider: Arc<dyn ResourceProvider>) -> Self {
        self.register(provider);
        self
    }

    pub fn get(&self, resource_type: &str) -> Result<Arc<dyn ResourceProvider>> {
        self.providers
            .get(resource_type)
            .cloned()
            .ok_or_else(|| CloudError::ProviderNotFound(resource_type.to_string()))
    }

    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(|k| k.as_str())
    }

    pub fn schemas(&self) -> SchemaRegistry {
        self.providers
            .values()
            .fold(SchemaRegistry::new(), |registry, p| registry.with(p.schema()))
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("types", &self.providers.keys().collect::<Vec<_>>())
            .finish()
    }
}
