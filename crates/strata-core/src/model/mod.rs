//! Resource model

mod address;
mod expr;
mod schema;
mod spec;
mod state;

pub use address::ResourceAddress;
pub use expr::{Expr, Reference};
pub use schema::{AttributeSchema, ResourceSchema, SchemaRegistry, UpdateBehavior};
pub use spec::{Lifecycle, ResourceSpec};
pub use state::{Attributes, DeposedInstance, ResourceState, StateSnapshot};
