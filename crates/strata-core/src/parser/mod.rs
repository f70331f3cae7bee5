//! KDL configuration parser
//!
//! Turns a KDL document into the set of declared [`ResourceSpec`]s.
//!
//! ```kdl
//! project "platform"
//!
//! resource "vpc" "main" {
//!     cidr_block "10.0.0.0/16"
//!     tags env="prod"
//! }
//!
//! resource "subnet" "a" {
//!     vpc_id "${vpc.main.id}"
//!     cidr_block "10.0.1.0/24"
//! }
//! ```

mod resource;

use crate::error::{CoreError, Result};
use crate::model::ResourceSpec;
use kdl::KdlDocument;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use resource::parse_resource;

/// Parsed configuration: everything the engine needs from the user.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    pub project: String,
    pub resources: Vec<ResourceSpec>,
}

impl Configuration {
    pub fn new(project: impl Into<String>, resources: Vec<ResourceSpec>) -> Self {
        Self {
            project: project.into(),
            resources,
        }
    }
}

/// Parse a KDL file. The project name defaults to the parent directory name.
pub fn parse_kdl_file<P: AsRef<Path>>(path: P) -> Result<Configuration> {
    let path = path.as_ref();
    let content = fs::read_to_string(path).map_err(|e| CoreError::IoError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let name = path
        .canonicalize()
        .ok()
        .as_deref()
        .and_then(|p| p.parent())
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("unnamed")
        .to_string();
    parse_kdl_string(&content, name)
}

pub fn parse_kdl_string(content: &str, default_name: String) -> Result<Configuration> {
    let doc: KdlDocument = content.parse()?;

    let mut project = default_name;
    let mut resources = Vec::new();
    let mut seen = BTreeSet::new();

    for node in doc.nodes() {
        match node.name().value() {
            "project" => {
                if let Some(name) = node.entries().first().and_then(|e| e.value().as_string()) {
                    project = name.to_string();
                }
            }
            "resource" => {
                let spec = parse_resource(node)?;
                if !seen.insert(spec.address.clone()) {
                    return Err(CoreError::config(format!(
                        "resource {} is declared more than once",
                        spec.address
                    )));
                }
                resources.push(spec);
            }
            other => {
                tracing::warn!(node = other, "Ignoring unknown top-level node");
            }
        }
    }

    tracing::debug!(project = %project, resources = resources.len(), "Parsed configuration");
    Ok(Configuration { project, resources })
}
