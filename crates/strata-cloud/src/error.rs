//! Cloud error types

use chrono::{DateTime, Utc};
use strata_core::{CoreError, ResourceAddress};
use thiserror::Error;

/// Whether a failed provider call is worth retrying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rate limits, timeouts, eventual consistency
    Transient,
    /// Validation, permissions, dependency violations
    Permanent,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::Permanent => write!(f, "permanent"),
        }
    }
}

/// Error returned by a resource provider operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderError {
    pub kind: ErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transient,
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Permanent,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind == ErrorKind::Transient
    }
}

/// Cloud errors
#[derive(Error, Debug)]
pub enum CloudError {
    #[error("Provider not found for resource type: {0}")]
    ProviderNotFound(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("State file error: {0}")]
    StateError(String),

    #[error("{address}: attribute '{attribute}' references a value that is not in state")]
    UnresolvedReference {
        address: ResourceAddress,
        attribute: String,
    },

    #[error(
        "State is locked by {holder} ({operation}) since {acquired_at}. \
         Retry later, or run `strata force-unlock {id}` if that process is gone"
    )]
    StateLocked {
        id: String,
        holder: String,
        operation: String,
        acquired_at: DateTime<Utc>,
    },

    #[error("Lock id mismatch: state is locked with {found}, not {expected}")]
    LockMismatch { expected: String, found: String },

    #[error("State is not locked")]
    NotLocked,

    /// A provider call dropped by cancellation
    #[error("aborted")]
    Aborted,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type Result<T> = std::result::Result<T, CloudError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locked_message_suggests_force_unlock() {
        let err = CloudError::StateLocked {
            id: "abc".to_string(),
            holder: "ci-runner".to_string(),
            operation: "apply".to_string(),
            acquired_at: Utc::now(),
        };
        let message = err.to_string();
        assert!(message.contains("ci-runner"));
        assert!(message.contains("strata force-unlock abc"));
    }

    #[test]
    fn test_provider_error_kind() {
        assert!(ProviderError::transient("throttled").is_transient());
        assert!(!ProviderError::permanent("denied").is_transient());
    }
}
