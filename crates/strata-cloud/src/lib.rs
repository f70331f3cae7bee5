//! Strata Cloud
//!
//! Provider abstraction, persisted state and the concurrent plan executor.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                   strata CLI                     │
//! │            (plan / apply / destroy)              │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                 strata-cloud                     │
//! │  ┌──────────────────────────────────────────┐   │
//! │  │  Engine: refresh → diff → execute        │   │
//! │  └──────────────────────────────────────────┘   │
//! │  ┌──────────────┐  ┌──────────────┐            │
//! │  │   Executor   │  │  State Mgmt  │            │
//! │  │ (JoinSet +   │  │ (lock, store │            │
//! │  │  semaphore)  │  │  + backup)   │            │
//! │  └──────────────┘  └──────────────┘            │
//! └───────┬─────────────────────────────────────────┘
//!         │  trait ResourceProvider { ... }
//! ┌───────▼───────┐
//! │  strata-cloud │
//! │     -sim      │
//! └───────────────┘
//! ```

pub mod engine;
pub mod error;
pub mod executor;
pub mod provider;
pub mod refresh;
pub mod registry;
pub mod retry;
pub mod state;

// Re-exports
pub use engine::{DEFAULT_LOCK_TIMEOUT, Engine, EngineOptions, PlannedRun};
pub use error::{CloudError, ErrorKind, ProviderError, Result};
pub use executor::{
    ApplyCounts, ApplyOutcome, ApplyReport, ApplyResult, DEFAULT_PARALLELISM, Executor,
    ExecutorConfig,
};
pub use provider::{
    CreateRequest, CreatedResource, DeleteOutcome, ProviderCapabilities, ProviderResult,
    ResourceProvider,
};
pub use refresh::{RefreshReport, refresh};
pub use registry::ProviderRegistry;
pub use retry::{RetryConfig, retry_with_backoff};
pub use state::{LockInfo, StateDocument, StateLock, StateManager, StateStore};
pub use strata_core::PlanMode;
pub use tokio_util::sync::CancellationToken;
