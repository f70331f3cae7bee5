use crate::model::ResourceAddress;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("KDL parse error: {0}")]
    KdlParse(#[from] kdl::KdlError),

    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to read {path}: {message}")]
    IoError { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("dependency cycle detected: {}", format_cycle(.addresses))]
    Cycle { addresses: Vec<ResourceAddress> },

    #[error("schema error in {address}: {message}")]
    Schema {
        address: ResourceAddress,
        message: String,
    },

    #[error("invalid resource address '{0}': expected <type>.<name>")]
    InvalidAddress(String),
}

impl CoreError {
    pub fn config(message: impl Into<String>) -> Self {
        CoreError::Config(message.into())
    }

    pub fn schema(address: &ResourceAddress, message: impl Into<String>) -> Self {
        CoreError::Schema {
            address: address.clone(),
            message: message.into(),
        }
    }

    /// Structural errors are detected before anything is mutated.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            CoreError::Config(_)
                | CoreError::Cycle { .. }
                | CoreError::Schema { .. }
                | CoreError::KdlParse(_)
                | CoreError::InvalidAddress(_)
        )
    }
}

fn format_cycle(addresses: &[ResourceAddress]) -> String {
    let mut parts: Vec<String> = addresses.iter().map(|a| a.to_string()).collect();
    if let Some(first) = parts.first().cloned() {
        parts.push(first);
    }
    parts.join(" -> ")
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_names_every_address() {
        let err = CoreError::Cycle {
            addresses: vec![
                ResourceAddress::new("vpc", "a"),
                ResourceAddress::new("subnet", "b"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "dependency cycle detected: vpc.a -> subnet.b -> vpc.a"
        );
        assert!(err.is_structural());
    }
}
