//! Strata core
//!
//! Resource model, KDL configuration parser, dependency graph and diff
//! engine. Everything here is pure: no I/O besides reading the
//! configuration file.

pub mod error;
pub mod graph;
pub mod model;
pub mod parser;
pub mod plan;

pub use error::{CoreError, Result};
pub use graph::DependencyGraph;
pub use model::*;
pub use parser::{Configuration, parse_kdl_file, parse_kdl_string};
pub use plan::{
    AttributeChange, Plan, PlanAction, PlanEntry, PlanMode, PlanSummary, PlannedValue, diff,
    diff_destroy,
};
