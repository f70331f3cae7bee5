//! Plan types produced by the diff engine

mod diff;

pub use diff::{diff, diff_destroy};

use crate::model::{Attributes, ResourceAddress, ResourceSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Type of operation an entry performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanAction {
    /// Create a new resource
    Create,
    /// Change attributes of an existing resource in place
    Update,
    /// Destroy an existing resource
    Destroy,
    /// No changes needed
    NoOp,
}

impl fmt::Display for PlanAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanAction::Create => write!(f, "create"),
            PlanAction::Update => write!(f, "update"),
            PlanAction::Destroy => write!(f, "destroy"),
            PlanAction::NoOp => write!(f, "no-op"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanMode {
    /// Reconcile recorded state towards the configuration
    #[default]
    Normal,
    /// Remove everything recorded in state
    Destroy,
}

/// Value an attribute is expected to have once the plan is applied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum PlannedValue {
    Known(serde_json::Value),
    /// Only the provider can tell, after apply.
    Unknown,
}

impl PlannedValue {
    pub fn known(&self) -> Option<&serde_json::Value> {
        match self {
            PlannedValue::Known(v) => Some(v),
            PlannedValue::Unknown => None,
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, PlannedValue::Unknown)
    }
}

impl fmt::Display for PlannedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlannedValue::Known(v) => write!(f, "{}", v),
            PlannedValue::Unknown => write!(f, "(known after apply)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeChange {
    pub name: String,
    pub before: Option<serde_json::Value>,
    /// `Known(null)` when the attribute is no longer declared.
    pub after: PlannedValue,
    pub forces_replacement: bool,
}

/// One operation in a plan, bound to a resource address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub address: ResourceAddress,
    pub action: PlanAction,

    /// Half of a destroy/create pair replacing one instance.
    pub replacement: bool,

    /// Destroys a deposed instance rather than the current one.
    pub deposed: bool,

    /// Remote identity this entry operates on. None for creates.
    pub instance_id: Option<String>,

    pub before: Option<Attributes>,
    pub after: BTreeMap<String, PlannedValue>,
    pub changes: Vec<AttributeChange>,

    /// Indices of entries that must be terminal before this one runs.
    pub depends_on: Vec<usize>,

    /// Declaration the executor resolves against live state. Present for
    /// creates, updates and no-ops.
    pub spec: Option<ResourceSpec>,
}

impl PlanEntry {
    pub fn is_noop(&self) -> bool {
        self.action == PlanAction::NoOp
    }

    /// Names of the attributes an update sends to the provider.
    pub fn changed_attributes(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().map(|c| c.name.as_str())
    }
}

impl fmt::Display for PlanEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.action, self.address)?;
        if self.replacement {
            write!(f, " [replace]")?;
        }
        if self.deposed {
            write!(f, " [deposed]")?;
        }
        Ok(())
    }
}

/// Ordered set of entries. Every entry appears after all entries it
/// depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub mode: PlanMode,
    pub entries: Vec<PlanEntry>,
}

impl Plan {
    pub fn empty(mode: PlanMode) -> Self {
        Self {
            mode,
            entries: Vec::new(),
        }
    }

    pub fn has_changes(&self) -> bool {
        self.entries.iter().any(|e| !e.is_noop())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries_by_action(&self, action: PlanAction) -> Vec<&PlanEntry> {
        self.entries.iter().filter(|e| e.action == action).collect()
    }

    pub fn entries_for<'a>(
        &'a self,
        address: &'a ResourceAddress,
    ) -> impl Iterator<Item = &'a PlanEntry> + 'a {
        self.entries.iter().filter(move |e| &e.address == address)
    }

    /// `(address, action)` pairs in plan order.
    pub fn actions(&self) -> Vec<(String, PlanAction)> {
        self.entries
            .iter()
            .map(|e| (e.address.to_string(), e.action))
            .collect()
    }

    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.entries_by_action(PlanAction::Create).len(),
            update: self.entries_by_action(PlanAction::Update).len(),
            destroy: self.entries_by_action(PlanAction::Destroy).len(),
            replace: self
                .entries
                .iter()
                .filter(|e| e.replacement && e.action == PlanAction::Create)
                .count(),
            no_change: self.entries_by_action(PlanAction::NoOp).len(),
        }
    }
}

/// Summary of planned entries
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub destroy: usize,
    /// Replace pairs, also counted in `create` and `destroy`.
    pub replace: usize,
    pub no_change: usize,
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to destroy, {} unchanged",
            self.create, self.update, self.destroy, self.no_change
        )?;
        if self.replace > 0 {
            write!(f, " ({} replaced)", self.replace)?;
        }
        Ok(())
    }
}
