//! Simulated cloud error types

use strata_cloud::ProviderError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SimError {
    #[error("invalid fault '{0}': expected <type>:<create|read|update|delete>:<transient|permanent>[:times]")]
    InvalidFault(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SimError>;

impl From<SimError> for ProviderError {
    fn from(err: SimError) -> Self {
        match err {
            // A failed write of the backing file can succeed on the next attempt.
            SimError::IoError(e) => ProviderError::transient(format!("sim cloud storage: {}", e)),
            other => ProviderError::permanent(other.to_string()),
        }
    }
}
