pub mod apply;
pub mod destroy;
pub mod force_unlock;
pub mod plan;
pub mod state;
pub mod validate;
