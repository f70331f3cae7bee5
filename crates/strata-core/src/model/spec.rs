//! Declared resources

use crate::model::{Expr, Reference, ResourceAddress};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Per-resource lifecycle overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lifecycle {
    /// Overrides the resource type's default when set.
    pub create_before_destroy: Option<bool>,
    /// Refuse any plan that destroys or replaces this resource.
    pub prevent_destroy: bool,
}

/// Desired state of one resource, as declared in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub address: ResourceAddress,
    pub attributes: BTreeMap<String, Expr>,
    /// Explicit ordering edges on top of the ones references imply.
    #[serde(default)]
    pub depends_on: Vec<ResourceAddress>,
    #[serde(default)]
    pub lifecycle: Lifecycle,
}

impl ResourceSpec {
    pub fn new(address: ResourceAddress) -> Self {
        Self {
            address,
            attributes: BTreeMap::new(),
            depends_on: Vec::new(),
            lifecycle: Lifecycle::default(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, expr: Expr) -> Self {
        self.attributes.insert(name.into(), expr);
        self
    }

    pub fn with_literal(self, name: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.with_attribute(name, Expr::literal(value))
    }

    pub fn with_reference(
        self,
        name: impl Into<String>,
        target: ResourceAddress,
        attribute: impl Into<String>,
    ) -> Self {
        self.with_attribute(name, Expr::reference(target, attribute))
    }

    pub fn with_depends_on(mut self, target: ResourceAddress) -> Self {
        self.depends_on.push(target);
        self
    }

    pub fn with_create_before_destroy(mut self, value: bool) -> Self {
        self.lifecycle.create_before_destroy = Some(value);
        self
    }

    pub fn references(&self) -> impl Iterator<Item = &Reference> {
        self.attributes.values().flat_map(|e| e.references())
    }

    /// Every address this resource must come after, references and `depends_on` combined.
    pub fn dependencies(&self) -> BTreeSet<ResourceAddress> {
        self.references()
            .map(|r| r.address.clone())
            .chain(self.depends_on.iter().cloned())
            .filter(|a| a != &self.address)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dependencies_merge_references_and_depends_on() {
        let vpc = ResourceAddress::new("vpc", "main");
        let role = ResourceAddress::new("iam_role", "cluster");
        let spec = ResourceSpec::new(ResourceAddress::new("subnet", "a"))
            .with_reference("vpc_id", vpc.clone(), "id")
            .with_literal("cidr_block", "10.0.1.0/24")
            .with_depends_on(role.clone())
            .with_depends_on(vpc.clone());

        let deps: Vec<_> = spec.dependencies().into_iter().collect();
        assert_eq!(deps, vec![role, vpc]);
    }
}
