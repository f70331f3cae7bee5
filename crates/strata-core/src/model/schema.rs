//! Resource type schemas
//!
//! Every attribute is classified statically. An attribute without an
//! explicit [`UpdateBehavior`] is treated as requiring replacement.

use crate::error::{CoreError, Result};
use crate::model::ResourceSpec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateBehavior {
    /// Can be changed on the live resource.
    InPlace,
    /// Changing it destroys and recreates the resource.
    Replace,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeSchema {
    pub update: Option<UpdateBehavior>,
    pub required: bool,
    /// Set by the provider only; never declared in configuration.
    pub computed: bool,
}

impl AttributeSchema {
    pub fn in_place() -> Self {
        Self {
            update: Some(UpdateBehavior::InPlace),
            ..Default::default()
        }
    }

    pub fn replace() -> Self {
        Self {
            update: Some(UpdateBehavior::Replace),
            ..Default::default()
        }
    }

    pub fn unclassified() -> Self {
        Self::default()
    }

    pub fn computed() -> Self {
        Self {
            computed: true,
            ..Default::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn requires_replacement(&self) -> bool {
        self.update != Some(UpdateBehavior::InPlace)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSchema {
    pub resource_type: String,
    pub attributes: BTreeMap<String, AttributeSchema>,
    /// Default replacement ordering for this type.
    pub create_before_destroy: bool,
}

impl ResourceSchema {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            attributes: BTreeMap::new(),
            create_before_destroy: false,
        }
    }

    pub fn attribute(mut self, name: impl Into<String>, schema: AttributeSchema) -> Self {
        self.attributes.insert(name.into(), schema);
        self
    }

    pub fn with_create_before_destroy(mut self, value: bool) -> Self {
        self.create_before_destroy = value;
        self
    }

    pub fn get(&self, name: &str) -> Option<&AttributeSchema> {
        self.attributes.get(name)
    }

    /// Unknown attributes require replacement too.
    pub fn requires_replacement(&self, name: &str) -> bool {
        self.get(name).is_none_or(|a| a.requires_replacement())
    }

    pub fn is_computed(&self, name: &str) -> bool {
        self.get(name).is_some_and(|a| a.computed)
    }
}

/// Lookup table of schemas keyed by resource type.
#[derive(Debug, Clone, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, ResourceSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, schema: ResourceSchema) {
        self.schemas.insert(schema.resource_type.clone(), schema);
    }

    pub fn with(mut self, schema: ResourceSchema) -> Self {
        self.register(schema);
        self
    }

    pub fn get(&self, resource_type: &str) -> Option<&ResourceSchema> {
        self.schemas.get(resource_type)
    }

    pub fn require(&self, resource_type: &str) -> Result<&ResourceSchema> {
        self.get(resource_type).ok_or_else(|| {
            CoreError::config(format!(
                "unknown resource type '{}' (known: {})",
                resource_type,
                self.schemas.keys().cloned().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(|s| s.as_str())
    }

    /// Check declared attributes and references against the schemas.
    pub fn validate(&self, specs: &[ResourceSpec]) -> Result<()> {
        for spec in specs {
            let schema = self.require(spec.address.resource_type())?;

            for name in spec.attributes.keys() {
                match schema.get(name) {
                    None => {
                        return Err(CoreError::schema(
                            &spec.address,
                            format!("unknown attribute '{}'", name),
                        ));
                    }
                    Some(attr) if attr.computed => {
                        return Err(CoreError::schema(
                            &spec.address,
                            format!("attribute '{}' is computed and cannot be set", name),
                        ));
                    }
                    Some(_) => {}
                }
            }

            for (name, attr) in &schema.attributes {
                if attr.required && !spec.attributes.contains_key(name) {
                    return Err(CoreError::schema(
                        &spec.address,
                        format!("missing required attribute '{}'", name),
                    ));
                }
            }

            for reference in spec.references() {
                let target = self.require(reference.address.resource_type())?;
                if target.get(&reference.attribute).is_none() {
                    return Err(CoreError::schema(
                        &spec.address,
                        format!(
                            "reference {} names unknown attribute '{}' of type '{}'",
                            reference, reference.attribute, target.resource_type
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ResourceAddress;

    fn registry() -> SchemaRegistry {
        SchemaRegistry::new()
            .with(
                ResourceSchema::new("vpc")
                    .attribute("id", AttributeSchema::computed())
                    .attribute("cidr_block", AttributeSchema::replace().required())
                    .attribute("tags", AttributeSchema::in_place())
                    .attribute("instance_tenancy", AttributeSchema::unclassified()),
            )
            .with(
                ResourceSchema::new("subnet")
                    .attribute("vpc_id", AttributeSchema::replace().required()),
            )
    }

    #[test]
    fn test_unclassified_defaults_to_replacement() {
        let registry = registry();
        let vpc = registry.get("vpc").unwrap();
        assert!(vpc.requires_replacement("instance_tenancy"));
        assert!(vpc.requires_replacement("cidr_block"));
        assert!(!vpc.requires_replacement("tags"));
        assert!(vpc.requires_replacement("not_declared"));
    }

    #[test]
    fn test_validate_rejects_unknown_attribute() {
        let spec = ResourceSpec::new(ResourceAddress::new("vpc", "main"))
            .with_literal("cidr_block", "10.0.0.0/16")
            .with_literal("colour", "blue");

        let err = registry().validate(&[spec]).unwrap_err();
        assert!(matches!(err, CoreError::Schema { .. }));
        assert!(err.to_string().contains("colour"));
    }

    #[test]
    fn test_validate_rejects_computed_and_missing_required() {
        let computed = ResourceSpec::new(ResourceAddress::new("vpc", "main"))
            .with_literal("cidr_block", "10.0.0.0/16")
            .with_literal("id", "vpc-123");
        assert!(registry().validate(&[computed]).is_err());

        let missing = ResourceSpec::new(ResourceAddress::new("vpc", "main"));
        let err = registry().validate(&[missing]).unwrap_err();
        assert!(err.to_string().contains("cidr_block"));
    }

    #[test]
    fn test_validate_checks_reference_targets() {
        let vpc = ResourceAddress::new("vpc", "main");
        let ok = ResourceSpec::new(ResourceAddress::new("subnet", "a"))
            .with_reference("vpc_id", vpc.clone(), "id");
        assert!(registry().validate(&[ok]).is_ok());

        let bad = ResourceSpec::new(ResourceAddress::new("subnet", "a"))
            .with_reference("vpc_id", vpc, "arn");
        assert!(registry().validate(&[bad]).is_err());
    }

    #[test]
    fn test_unknown_type_is_config_error() {
        let spec = ResourceSpec::new(ResourceAddress::new("bucket", "logs"));
        let err = registry().validate(&[spec]).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }
}
