//! Resource provider trait definition

use crate::error::ProviderError;
use async_trait::async_trait;
use strata_core::{Attributes, ResourceAddress, ResourceSchema};

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// What a provider allows the executor to do with in-flight calls.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProviderCapabilities {
    /// In-flight operations may be dropped on cancellation.
    pub abortable: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreateRequest {
    pub address: ResourceAddress,
    pub attributes: Attributes,
    /// Same key for every attempt of one create within a run. Providers
    /// return the existing object instead of creating a second one.
    pub idempotency_key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CreatedResource {
    pub id: String,
    pub attributes: Attributes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

/// CRUD operations for one resource type
///
/// Providers are registered in a [`crate::ProviderRegistry`] keyed by
/// [`ResourceProvider::resource_type`].
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Returns the resource type this provider manages (e.g., "vpc")
    fn resource_type(&self) -> &str;

    fn schema(&self) -> ResourceSchema;

    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities::default()
    }

    async fn create(&self, request: CreateRequest) -> ProviderResult<CreatedResource>;

    /// Current attributes, or `None` when the object no longer exists
    async fn read(&self, id: &str) -> ProviderResult<Option<Attributes>>;

    /// Apply changed attributes and return the full attribute set
    async fn update(&self, id: &str, changed: &Attributes) -> ProviderResult<Attributes>;

    async fn delete(&self, id: &str) -> ProviderResult<DeleteOutcome>;
}
