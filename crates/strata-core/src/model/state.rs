//! Recorded state of applied resources

use crate::model::ResourceAddress;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Attribute name to value, as returned by a provider.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// An instance displaced by a create-before-destroy replacement, waiting
/// to be destroyed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeposedInstance {
    pub id: String,
    pub attributes: Attributes,
}

/// Last known real-world state of one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub address: ResourceAddress,

    /// Provider-assigned identity.
    pub id: String,

    pub attributes: Attributes,

    /// Dependencies at the time of the last apply. Orders destroys of
    /// resources that are no longer declared.
    #[serde(default)]
    pub dependencies: Vec<ResourceAddress>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub deposed: Vec<DeposedInstance>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResourceState {
    pub fn new(address: ResourceAddress, id: impl Into<String>, attributes: Attributes) -> Self {
        let now = Utc::now();
        Self {
            address,
            id: id.into(),
            attributes,
            dependencies: Vec::new(),
            deposed: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_dependencies(mut self, dependencies: Vec<ResourceAddress>) -> Self {
        self.dependencies = dependencies;
        self
    }

    pub fn set_attributes(&mut self, attributes: Attributes) {
        self.attributes = attributes;
        self.updated_at = Utc::now();
    }

    pub fn get_attribute(&self, name: &str) -> Option<&serde_json::Value> {
        self.attributes.get(name)
    }

    /// Move the current instance aside and adopt a new one.
    pub fn depose_and_replace(&mut self, id: impl Into<String>, attributes: Attributes) {
        let old_id = std::mem::replace(&mut self.id, id.into());
        let old_attributes = std::mem::replace(&mut self.attributes, attributes);
        self.deposed.push(DeposedInstance {
            id: old_id,
            attributes: old_attributes,
        });
        self.updated_at = Utc::now();
    }
}

/// Read-only view of recorded state used by the diff engine.
pub type StateSnapshot = BTreeMap<ResourceAddress, ResourceState>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_depose_and_replace_keeps_old_instance() {
        let mut state = ResourceState::new(
            ResourceAddress::new("launch_template", "workers"),
            "lt-1",
            [("id".to_string(), json!("lt-1"))].into_iter().collect(),
        );

        state.depose_and_replace("lt-2", [("id".to_string(), json!("lt-2"))].into_iter().collect());

        assert_eq!(state.id, "lt-2");
        assert_eq!(state.deposed.len(), 1);
        assert_eq!(state.deposed[0].id, "lt-1");
        assert_eq!(state.get_attribute("id"), Some(&json!("lt-2")));
    }
}
