//! Resource addresses

use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unique identifier of a declared resource: `(type, logical name)`.
///
/// Rendered and serialized as `type.name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ResourceAddress {
    resource_type: String,
    name: String,
}

impl ResourceAddress {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }

    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ResourceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

impl FromStr for ResourceAddress {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('.') {
            Some((resource_type, name)) if is_identifier(resource_type) && is_identifier(name) => {
                Ok(Self::new(resource_type, name))
            }
            _ => Err(CoreError::InvalidAddress(s.to_string())),
        }
    }
}

impl TryFrom<String> for ResourceAddress {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ResourceAddress> for String {
    fn from(address: ResourceAddress) -> Self {
        address.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let address: ResourceAddress = "subnet.private-a".parse().unwrap();
        assert_eq!(address.resource_type(), "subnet");
        assert_eq!(address.name(), "private-a");
        assert_eq!(address.to_string(), "subnet.private-a");
    }

    #[test]
    fn test_rejects_malformed() {
        assert!("subnet".parse::<ResourceAddress>().is_err());
        assert!(".a".parse::<ResourceAddress>().is_err());
        assert!("vpc.main.id".parse::<ResourceAddress>().is_err());
    }

    #[test]
    fn test_serializes_as_string() {
        let address = ResourceAddress::new("vpc", "main");
        let json = serde_json::to_string(&address).unwrap();
        assert_eq!(json, "\"vpc.main\"");
        let back: ResourceAddress = serde_json::from_str(&json).unwrap();
        assert_eq!(back, address);
    }
}
