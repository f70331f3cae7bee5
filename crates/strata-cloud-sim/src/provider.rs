//! ResourceProvider implementation over [`SimCloud`]

use crate::cloud::SimCloud;
use crate::schemas;
use async_trait::async_trait;
use std::sync::Arc;
use strata_cloud::{
    CreateRequest, CreatedResource, DeleteOutcome, ProviderCapabilities, ProviderRegistry,
    ProviderResult, ResourceProvider,
};
use strata_core::{Attributes, ResourceSchema};

/// Provider for one simulated resource type
pub struct SimProvider {
    schema: ResourceSchema,
    cloud: Arc<SimCloud>,
}

impl SimProvider {
    /// `None` for a type the simulated cloud does not offer
    pub fn new(resource_type: &str, cloud: Arc<SimCloud>) -> Option<Self> {
        schemas::schema(resource_type).map(|schema| Self { schema, cloud })
    }
}

#[async_trait]
impl ResourceProvider for SimProvider {
    fn resource_type(&self) -> &str {
        &self.schema.resource_type
    }

    fn schema(&self) -> ResourceSchema {
        self.schema.clone()
    }

    /// Nothing is half-applied when a call is dropped: changes land in one step.
    fn capabilities(&self) -> ProviderCapabilities {
        ProviderCapabilities { abortable: true }
    }

    async fn create(&self, request: CreateRequest) -> ProviderResult<CreatedResource> {
        self.cloud.create(&self.schema, request).await
    }

    async fn read(&self, id: &str) -> ProviderResult<Option<Attributes>> {
        self.cloud.read(&self.schema.resource_type, id).await
    }

    async fn update(&self, id: &str, changed: &Attributes) -> ProviderResult<Attributes> {
        self.cloud.update(&self.schema, id, changed).await
    }

    async fn delete(&self, id: &str) -> ProviderResult<DeleteOutcome> {
        self.cloud.delete(&self.schema.resource_type, id).await
    }
}

/// Registry with a provider for every simulated resource type
pub fn registry(cloud: Arc<SimCloud>) -> ProviderRegistry {
    schemas::RESOURCE_TYPES
        .iter()
        .filter_map(|t| SimProvider::new(t, cloud.clone()))
        .fold(ProviderRegistry::new(), |registry, provider| {
            registry.with(Arc::new(provider))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::faults::{Fault, Operation};
    use serde_json::json;
    use strata_cloud::{RetryConfig, retry_with_backoff};
    use strata_core::ResourceAddress;
    use tempfile::tempdir;

    fn attrs(pairs: &[(&str, serde_json::Value)]) -> Attributes {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    fn request(resource_type: &str, key: &str, attributes: Attributes) -> CreateRequest {
        CreateRequest {
            address: ResourceAddress::new(resource_type, "test"),
            attributes,
            idempotency_key: key.to_string(),
        }
    }

    fn vpc_request(key: &str) -> CreateRequest {
        request("vpc", key, attrs(&[("cidr_block", json!("10.0.0.0/16"))]))
    }

    fn provider(cloud: &Arc<SimCloud>, resource_type: &str) -> Arc<dyn ResourceProvider> {
        registry(cloud.clone()).get(resource_type).unwrap()
    }

    #[tokio::test]
    async fn test_create_read_update_delete() {
        let cloud = Arc::new(SimCloud::in_memory());
        let vpc = provider(&cloud, "vpc");

        let created = vpc.create(vpc_request("run:vpc.main")).await.unwrap();
        assert!(created.id.starts_with("vpc-"));
        assert_eq!(created.attributes["id"], json!(created.id));
        assert_eq!(
            created.attributes["arn"],
            json!(format!("arn:sim:vpc:{}", created.id))
        );

        let updated = vpc
            .update(&created.id, &attrs(&[("tags", json!({"env": "prod"}))]))
            .await
            .unwrap();
        assert_eq!(updated["tags"], json!({"env": "prod"}));
        assert_eq!(updated["cidr_block"], json!("10.0.0.0/16"));
        assert_eq!(vpc.read(&created.id).await.unwrap(), Some(updated));

        assert_eq!(vpc.delete(&created.id).await.unwrap(), DeleteOutcome::Deleted);
        assert_eq!(vpc.delete(&created.id).await.unwrap(), DeleteOutcome::NotFound);
        assert_eq!(vpc.read(&created.id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_create_is_deduplicated_by_idempotency_key() {
        let cloud = Arc::new(SimCloud::in_memory());
        let vpc = provider(&cloud, "vpc");

        let first = vpc.create(vpc_request("run-1:vpc.main")).await.unwrap();
        let again = vpc.create(vpc_request("run-1:vpc.main")).await.unwrap();
        let other = vpc.create(vpc_request("run-2:vpc.main")).await.unwrap();

        assert_eq!(first.id, again.id);
        assert_ne!(first.id, other.id);
        assert_eq!(cloud.len().await, 2);
    }

    #[tokio::test]
    async fn test_lost_create_response_is_recovered_by_retry() {
        let cloud = Arc::new(SimCloud::in_memory());
        cloud.inject(Fault::transient("vpc", Operation::Create).after_commit());
        let vpc = provider(&cloud, "vpc");

        let created = retry_with_backoff(&RetryConfig::immediate(3), "create vpc.main", || {
            let vpc = vpc.clone();
            async move { vpc.create(vpc_request("run:vpc.main")).await }
        })
        .await
        .unwrap();

        assert_eq!(cloud.len().await, 1);
        assert_eq!(cloud.objects("vpc").await[0].id, created.id);
        assert_eq!(cloud.call_count(), 2);
    }

    #[tokio::test]
    async fn test_validation_errors_are_permanent() {
        let cloud = Arc::new(SimCloud::in_memory());
        let subnet = provider(&cloud, "subnet");

        let missing = subnet
            .create(request("subnet", "k1", attrs(&[("cidr_block", json!("10.0.1.0/24"))])))
            .await
            .unwrap_err();
        assert!(!missing.is_transient());
        assert!(missing.message.contains("vpc_id"));

        let computed = subnet
            .create(request(
                "subnet",
                "k2",
                attrs(&[
                    ("vpc_id", json!("vpc-1")),
                    ("cidr_block", json!("10.0.1.0/24")),
                    ("arn", json!("arn:forged")),
                ]),
            ))
            .await
            .unwrap_err();
        assert!(computed.message.contains("arn"));
        assert!(cloud.is_empty().await);
    }

    #[tokio::test]
    async fn test_update_refuses_replacement_attributes() {
        let cloud = Arc::new(SimCloud::in_memory());
        let vpc = provider(&cloud, "vpc");
        let created = vpc.create(vpc_request("k")).await.unwrap();

        let err = vpc
            .update(&created.id, &attrs(&[("cidr_block", json!("10.9.0.0/16"))]))
            .await
            .unwrap_err();
        assert!(err.message.contains("cannot be changed in place"));

        let err = vpc.update("vpc-missing", &Attributes::new()).await.unwrap_err();
        assert!(err.message.contains("ResourceNotFound"));
    }

    #[tokio::test]
    async fn test_delete_refuses_referenced_objects() {
        let cloud = Arc::new(SimCloud::in_memory());
        let vpc = provider(&cloud, "vpc");
        let subnet = provider(&cloud, "subnet");

        let v = vpc.create(vpc_request("k-vpc")).await.unwrap();
        let s = subnet
            .create(request(
                "subnet",
                "k-subnet",
                attrs(&[("vpc_id", json!(v.id)), ("cidr_block", json!("10.0.1.0/24"))]),
            ))
            .await
            .unwrap();

        let err = vpc.delete(&v.id).await.unwrap_err();
        assert!(!err.is_transient());
        assert!(err.message.contains("DependencyViolation"));
        assert!(err.message.contains(&s.id));

        subnet.delete(&s.id).await.unwrap();
        assert_eq!(vpc.delete(&v.id).await.unwrap(), DeleteOutcome::Deleted);
    }

    #[tokio::test]
    async fn test_arn_references_also_block_delete() {
        let cloud = Arc::new(SimCloud::in_memory());
        let role = provider(&cloud, "iam_role");
        let cluster = provider(&cloud, "eks_cluster");

        let r = role
            .create(request(
                "iam_role",
                "k-role",
                attrs(&[("name", json!("cluster")), ("assume_role_policy", json!("{}"))]),
            ))
            .await
            .unwrap();
        let c = cluster
            .create(request(
                "eks_cluster",
                "k-eks",
                attrs(&[
                    ("name", json!("main")),
                    ("role_arn", r.attributes["arn"].clone()),
                    ("subnet_ids", json!(["subnet-1"])),
                ]),
            ))
            .await
            .unwrap();
        assert!(c.attributes["endpoint"].as_str().unwrap().starts_with("https://"));

        assert!(role.delete(&r.id).await.is_err());
    }

    #[tokio::test]
    async fn test_persisted_cloud_survives_reopen() {
        let temp_dir = tempdir().unwrap();
        let id = {
            let cloud = Arc::new(SimCloud::open(temp_dir.path()).await.unwrap());
            provider(&cloud, "vpc").create(vpc_request("k")).await.unwrap().id
        };
        assert!(temp_dir.path().join(".strata/sim-cloud.json").exists());

        let cloud = Arc::new(SimCloud::open(temp_dir.path()).await.unwrap());
        assert!(cloud.object(&id).await.is_some());

        // ids keep counting up across runs
        let next = provider(&cloud, "vpc").create(vpc_request("k2")).await.unwrap();
        assert_ne!(next.id, id);
    }

    #[tokio::test]
    async fn test_out_of_band_changes_show_up_in_reads() {
        let cloud = Arc::new(SimCloud::in_memory());
        let vpc = provider(&cloud, "vpc");
        let created = vpc.create(vpc_request("k")).await.unwrap();

        assert!(
            cloud
                .set_out_of_band(&created.id, "tags", json!({"owner": "someone"}))
                .await
                .unwrap()
        );
        let read = vpc.read(&created.id).await.unwrap().unwrap();
        assert_eq!(read["tags"], json!({"owner": "someone"}));

        cloud.remove_out_of_band(&created.id).await.unwrap();
        assert_eq!(vpc.read(&created.id).await.unwrap(), None);
    }

    #[test]
    fn test_registry_covers_every_type() {
        let registry = registry(Arc::new(SimCloud::in_memory()));
        let types: Vec<&str> = registry.types().collect();
        let mut expected = schemas::RESOURCE_TYPES.to_vec();
        expected.sort();
        assert_eq!(types, expected);
        assert!(SimProvider::new("bucket", Arc::new(SimCloud::in_memory())).is_none());
    }
}
