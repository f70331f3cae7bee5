//! Refresh recorded state from the real world

use crate::error::Result;
use crate::registry::ProviderRegistry;
use crate::retry::{RetryConfig, retry_with_backoff};
use strata_core::{ResourceAddress, StateSnapshot};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    pub state: StateSnapshot,
    /// Recorded resources whose object no longer exists
    pub removed: Vec<ResourceAddress>,
    /// Resources whose real attributes differ from the recorded ones
    pub drifted: Vec<ResourceAddress>,
}

impl RefreshReport {
    pub fn has_changes(&self) -> bool {
        !self.removed.is_empty() || !self.drifted.is_empty()
    }
}

/// Read every recorded resource back from its provider.
///
/// Vanished objects are dropped so the next diff re-creates them. The
/// input snapshot is left untouched.
pub async fn refresh(
    registry: &ProviderRegistry,
    snapshot: &StateSnapshot,
    retry: &RetryConfig,
) -> Result<RefreshReport> {
    let mut report = RefreshReport {
        state: snapshot.clone(),
        ..Default::default()
    };

    for (address, recorded) in snapshot {
        let provider = registry.get(address.resource_type())?;
        let operation = format!("read {}", address);
        let id = recorded.id.clone();
        let current = retry_with_backoff(retry, &operation, || {
            let provider = provider.clone();
            let id = id.clone();
            async move { provider.read(&id).await }
        })
        .await?;

        match current {
            None => {
                tracing::warn!(resource = %address, id = %recorded.id, "Resource no longer exists");
                report.state.remove(address);
                report.removed.push(address.clone());
            }
            Some(mut attributes) => {
                attributes
                    .entry("id".to_string())
                    .or_insert_with(|| serde_json::Value::from(recorded.id.clone()));
                if attributes != recorded.attributes {
                    tracing::info!(resource = %address, "Drift detected");
                    if let Some(state) = report.state.get_mut(address) {
                        state.set_attributes(attributes);
                    }
                    report.drifted.push(address.clone());
                }
            }
        }
    }

    tracing::debug!(
        resources = snapshot.len(),
        removed = report.removed.len(),
        drifted = report.drifted.len(),
        "Refreshed state"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::provider::{
        CreateRequest, CreatedResource, DeleteOutcome, ProviderResult, ResourceProvider,
    };
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use strata_core::{Attributes, ResourceSchema, ResourceState};

    /// Serves reads from a fixed table, failing the first `flaky` calls.
    struct TableProvider {
        objects: HashMap<String, Attributes>,
        flaky: AtomicU32,
    }

    #[async_trait]
    impl ResourceProvider for TableProvider {
        fn resource_type(&self) -> &str {
            "vpc"
        }

        fn schema(&self) -> ResourceSchema {
            ResourceSchema::new("vpc")
        }

        async fn create(&self, _request: CreateRequest) -> ProviderResult<CreatedResource> {
            Err(ProviderError::permanent("read-only"))
        }

        async fn read(&self, id: &str) -> ProviderResult<Option<Attributes>> {
            if self.flaky.load(Ordering::SeqCst) > 0 {
                self.flaky.fetch_sub(1, Ordering::SeqCst);
                return Err(ProviderError::transient("throttled"));
            }
            Ok(self.objects.get(id).cloned())
        }

        async fn update(&self, _id: &str, _changed: &Attributes) -> ProviderResult<Attributes> {
            Err(ProviderError::permanent("read-only"))
        }

        async fn delete(&self, _id: &str) -> ProviderResult<DeleteOutcome> {
            Ok(DeleteOutcome::NotFound)
        }
    }

    fn attrs(pairs: &[(&str, serde_json::Value)]) -> Attributes {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn recorded(name: &str, id: &str, cidr: &str) -> (ResourceAddress, ResourceState) {
        let address = ResourceAddress::new("vpc", name);
        let state = ResourceState::new(
            address.clone(),
            id,
            attrs(&[("id", json!(id)), ("cidr_block", json!(cidr))]),
        );
        (address, state)
    }

    #[tokio::test]
    async fn test_refresh_detects_drift_and_removal() {
        let provider = TableProvider {
            objects: [
                ("vpc-1".to_string(), attrs(&[("cidr_block", json!("10.0.0.0/16"))])),
                ("vpc-2".to_string(), attrs(&[("id", json!("vpc-2")), ("cidr_block", json!("10.9.0.0/16"))])),
            ]
            .into_iter()
            .collect(),
            flaky: AtomicU32::new(2),
        };
        let registry = ProviderRegistry::new().with(Arc::new(provider));

        let snapshot: StateSnapshot = [
            recorded("same", "vpc-1", "10.0.0.0/16"),
            recorded("drifted", "vpc-2", "10.1.0.0/16"),
            recorded("gone", "vpc-3", "10.2.0.0/16"),
        ]
        .into_iter()
        .collect();

        let report = refresh(&registry, &snapshot, &RetryConfig::immediate(5))
            .await
            .unwrap();

        let gone = ResourceAddress::new("vpc", "gone");
        let drifted = ResourceAddress::new("vpc", "drifted");
        assert!(report.has_changes());
        assert_eq!(report.removed, vec![gone.clone()]);
        assert_eq!(report.drifted, vec![drifted.clone()]);
        assert!(!report.state.contains_key(&gone));
        assert_eq!(
            report.state[&drifted].get_attribute("cidr_block"),
            Some(&json!("10.9.0.0/16"))
        );
        // id is kept even when the provider leaves it out
        assert_eq!(
            report.state[&ResourceAddress::new("vpc", "same")].get_attribute("id"),
            Some(&json!("vpc-1"))
        );
        assert_eq!(snapshot.len(), 3);
    }

    #[tokio::test]
    async fn test_refresh_fails_without_provider() {
        let snapshot: StateSnapshot = [recorded("main", "vpc-1", "10.0.0.0/16")].into_iter().collect();
        let err = refresh(&ProviderRegistry::new(), &snapshot, &RetryConfig::immediate(1))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::CloudError::ProviderNotFound(_)));
    }
}
