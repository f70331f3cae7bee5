//! Simulated cloud provider for Strata
//!
//! Implements [`strata_cloud::ResourceProvider`] for a small set of
//! networking, identity and cluster resource types against an in-process
//! cloud. Used by the CLI as its bundled provider and by tests.
//!
//! # Behaviour
//!
//! - Required attributes are enforced and computed ones (`id`, `arn`, ...) are assigned
//! - Deleting an object another object still refers to fails with `DependencyViolation`
//! - Creates are deduplicated by idempotency key
//! - Faults can be scripted per resource type and operation
//!
//! # Example
//!
//! ```ignore
//! use strata_cloud_sim::{Fault, Operation, SimCloud, registry};
//! use std::sync::Arc;
//!
//! let cloud = Arc::new(SimCloud::open(".").await?);
//! cloud.inject(Fault::transient("vpc", Operation::Create).times(2));
//! let providers = registry(cloud.clone());
//! ```

pub mod cloud;
pub mod error;
pub mod faults;
pub mod provider;
pub mod schemas;

pub use cloud::{SIM_CLOUD_FILE, SimCloud, SimObject};
pub use error::{Result, SimError};
pub use faults::{Fault, FaultPlan, Operation};
pub use provider::{SimProvider, registry};
pub use schemas::RESOURCE_TYPES;
