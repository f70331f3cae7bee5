//! Diff engine
//!
//! Visits every address in `declared ∪ recorded` in dependency order and
//! decides what has to happen to it. Planned attribute values flow from
//! dependencies to dependents, so a replaced resource makes every
//! reference to its computed attributes unknown.
//!
//! Execution edges:
//! - a create or update waits on the create/update of each dependency
//! - a destroy waits on the dependents that still point at the instance
//! - destroy-before-create replacement runs `Destroy -> Create`
//! - create-before-destroy runs `Create -> dependents -> Destroy(old)`

use super::{AttributeChange, Plan, PlanAction, PlanEntry, PlanMode, PlannedValue};
use crate::error::{CoreError, Result};
use crate::graph::DependencyGraph;
use crate::model::{
    Reference, ResourceAddress, ResourceSchema, ResourceSpec, ResourceState, SchemaRegistry,
    StateSnapshot,
};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap};

/// Plan the changes that bring `state` in line with `specs`.
pub fn diff(
    specs: &[ResourceSpec],
    state: &StateSnapshot,
    schemas: &SchemaRegistry,
) -> Result<Plan> {
    schemas.validate(specs)?;
    DependencyGraph::build(specs)?;
    Differ::new(specs, state, schemas).run(PlanMode::Normal)
}

/// Plan the removal of everything in `state`. `specs` is only consulted
/// for `prevent_destroy`.
pub fn diff_destroy(specs: &[ResourceSpec], state: &StateSnapshot) -> Result<Plan> {
    if let Some(spec) = specs
        .iter()
        .find(|s| s.lifecycle.prevent_destroy && state.contains_key(&s.address))
    {
        return Err(prevent_destroy_error(&spec.address));
    }
    let schemas = SchemaRegistry::new();
    Differ::new(&[], state, &schemas).run(PlanMode::Destroy)
}

fn prevent_destroy_error(address: &ResourceAddress) -> CoreError {
    CoreError::config(format!(
        "{} has lifecycle.prevent_destroy set, but the plan would destroy it",
        address
    ))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Create,
    Update,
    Replace,
    NoOp,
    Destroy,
}

struct Decided<'a> {
    address: ResourceAddress,
    decision: Decision,
    spec: Option<&'a ResourceSpec>,
    prior: Option<&'a ResourceState>,
    after: BTreeMap<String, PlannedValue>,
    changes: Vec<AttributeChange>,
}

/// Entry indices per address, in generation order.
#[derive(Debug, Default)]
struct Slots {
    create: Option<usize>,
    update: Option<usize>,
    destroy: Option<usize>,
    deposed: Vec<usize>,
}

impl Slots {
    fn writes(&self) -> impl Iterator<Item = usize> + '_ {
        self.create.iter().chain(self.update.iter()).copied()
    }

    fn destroys(&self) -> impl Iterator<Item = usize> + '_ {
        self.deposed.iter().chain(self.destroy.iter()).copied()
    }
}

struct Differ<'a> {
    specs: BTreeMap<&'a ResourceAddress, &'a ResourceSpec>,
    state: &'a StateSnapshot,
    schemas: &'a SchemaRegistry,
}

impl<'a> Differ<'a> {
    fn new(specs: &'a [ResourceSpec], state: &'a StateSnapshot, schemas: &'a SchemaRegistry) -> Self {
        Self {
            specs: specs.iter().map(|s| (&s.address, s)).collect(),
            state,
            schemas,
        }
    }

    fn run(&self, mode: PlanMode) -> Result<Plan> {
        let edges = self
            .specs
            .values()
            .map(|s| (s.address.clone(), s.dependencies().into_iter().collect()))
            .chain(
                self.state
                    .values()
                    .filter(|r| !self.specs.contains_key(&r.address))
                    .map(|r| (r.address.clone(), r.dependencies.clone())),
            );
        let graph = DependencyGraph::from_edges(edges)?;

        let decided = self.decide(&graph)?;
        let cbd = self.create_before_destroy(&graph, &decided);

        for d in decided.values() {
            if d.decision == Decision::Replace && d.spec.is_some_and(|s| s.lifecycle.prevent_destroy)
            {
                return Err(prevent_destroy_error(&d.address));
            }
        }

        let (entries, slots) = self.emit(&graph, &decided, &cbd);
        let waits = self.edges(&decided, &cbd, &slots, entries.len());
        let entries = order(entries, waits)?;

        tracing::debug!(entries = entries.len(), ?mode, "Computed plan");
        Ok(Plan { mode, entries })
    }

    fn decide(&self, graph: &DependencyGraph) -> Result<BTreeMap<ResourceAddress, Decided<'a>>> {
        let mut planned: HashMap<ResourceAddress, BTreeMap<String, PlannedValue>> = HashMap::new();
        let mut decided = BTreeMap::new();

        for address in graph.topological_order() {
            let spec = self.specs.get(address).copied();
            let prior = self.state.get(address);

            let (decision, after, changes) = match (spec, prior) {
                (Some(spec), None) => {
                    let schema = self.schemas.require(address.resource_type())?;
                    let declared = resolve(spec, &planned);
                    let changes = declared
                        .iter()
                        .map(|(name, after)| AttributeChange {
                            name: name.clone(),
                            before: None,
                            after: after.clone(),
                            forces_replacement: false,
                        })
                        .collect();
                    (Decision::Create, with_unknown_computed(declared, schema), changes)
                }
                (Some(spec), Some(prior)) => {
                    let schema = self.schemas.require(address.resource_type())?;
                    compare(spec, prior, schema, &planned)
                }
                (None, Some(prior)) => (Decision::Destroy, known(prior), Vec::new()),
                (None, None) => continue,
            };

            planned.insert(address.clone(), after.clone());
            decided.insert(
                address.clone(),
                Decided {
                    address: address.clone(),
                    decision,
                    spec,
                    prior,
                    after,
                    changes,
                },
            );
        }

        Ok(decided)
    }

    /// Effective create-before-destroy per replaced address. Walking
    /// dependents first pushes the flag down to replaced dependencies.
    fn create_before_destroy(
        &self,
        graph: &DependencyGraph,
        decided: &BTreeMap<ResourceAddress, Decided<'a>>,
    ) -> BTreeMap<ResourceAddress, bool> {
        let mut cbd: BTreeMap<ResourceAddress, bool> = decided
            .values()
            .filter(|d| d.decision == Decision::Replace)
            .filter_map(|d| {
                let spec = d.spec?;
                let default = self
                    .schemas
                    .get(d.address.resource_type())
                    .is_some_and(|s| s.create_before_destroy);
                Some((
                    d.address.clone(),
                    spec.lifecycle.create_before_destroy.unwrap_or(default),
                ))
            })
            .collect();

        for address in graph.topological_order().into_iter().rev() {
            if cbd.get(address) != Some(&true) {
                continue;
            }
            let Some(spec) = self.specs.get(address) else {
                continue;
            };
            for dep in spec.dependencies() {
                if let Some(flag) = cbd.get_mut(&dep) {
                    if !*flag {
                        tracing::debug!(resource = %dep, dependent = %address, "Inherited create_before_destroy");
                    }
                    *flag = true;
                }
            }
        }
        cbd
    }

    fn emit(
        &self,
        graph: &DependencyGraph,
        decided: &BTreeMap<ResourceAddress, Decided<'a>>,
        cbd: &BTreeMap<ResourceAddress, bool>,
    ) -> (Vec<PlanEntry>, BTreeMap<ResourceAddress, Slots>) {
        let mut entries = Vec::new();
        let mut slots: BTreeMap<ResourceAddress, Slots> = BTreeMap::new();

        for address in graph.topological_order() {
            let Some(d) = decided.get(address) else {
                continue;
            };
            let slot = slots.entry(address.clone()).or_default();

            if let Some(prior) = d.prior {
                for instance in &prior.deposed {
                    let i = push(
                        &mut entries,
                        PlanEntry {
                            address: address.clone(),
                            action: PlanAction::Destroy,
                            replacement: false,
                            deposed: true,
                            instance_id: Some(instance.id.clone()),
                            before: Some(instance.attributes.clone()),
                            after: BTreeMap::new(),
                            changes: Vec::new(),
                            depends_on: Vec::new(),
                            spec: None,
                        },
                    );
                    slot.deposed.push(i);
                }
            }

            let write = |action: PlanAction, replacement: bool| PlanEntry {
                address: address.clone(),
                action,
                replacement,
                deposed: false,
                instance_id: match action {
                    PlanAction::Create => None,
                    _ => d.prior.map(|p| p.id.clone()),
                },
                before: d.prior.map(|p| p.attributes.clone()),
                after: d.after.clone(),
                changes: d.changes.clone(),
                depends_on: Vec::new(),
                spec: d.spec.cloned(),
            };
            let destroy = |replacement: bool| PlanEntry {
                address: address.clone(),
                action: PlanAction::Destroy,
                replacement,
                deposed: false,
                instance_id: d.prior.map(|p| p.id.clone()),
                before: d.prior.map(|p| p.attributes.clone()),
                after: BTreeMap::new(),
                changes: d.changes.clone(),
                depends_on: Vec::new(),
                spec: None,
            };

            match d.decision {
                Decision::Create => {
                    let i = push(&mut entries, write(PlanAction::Create, false));
                    slot.create = Some(i);
                }
                Decision::Update => {
                    let i = push(&mut entries, write(PlanAction::Update, false));
                    slot.update = Some(i);
                }
                Decision::NoOp => {
                    push(&mut entries, write(PlanAction::NoOp, false));
                }
                Decision::Destroy => {
                    let i = push(&mut entries, destroy(false));
                    slot.destroy = Some(i);
                }
                Decision::Replace if cbd.get(address).copied().unwrap_or(false) => {
                    let c = push(&mut entries, write(PlanAction::Create, true));
                    let x = push(&mut entries, destroy(true));
                    slot.create = Some(c);
                    slot.destroy = Some(x);
                }
                Decision::Replace => {
                    let x = push(&mut entries, destroy(true));
                    let c = push(&mut entries, write(PlanAction::Create, true));
                    slot.create = Some(c);
                    slot.destroy = Some(x);
                }
            }
        }

        (entries, slots)
    }

    fn edges(
        &self,
        decided: &BTreeMap<ResourceAddress, Decided<'a>>,
        cbd: &BTreeMap<ResourceAddress, bool>,
        slots: &BTreeMap<ResourceAddress, Slots>,
        len: usize,
    ) -> Vec<BTreeSet<usize>> {
        let mut waits = vec![BTreeSet::new(); len];

        // Recorded and declared dependents of every address.
        let mut dependents: BTreeMap<&ResourceAddress, BTreeSet<&ResourceAddress>> = BTreeMap::new();
        for d in decided.values() {
            let declared = d.spec.map(|s| s.dependencies()).unwrap_or_default();
            let recorded = d.prior.map(|p| p.dependencies.iter()).into_iter().flatten();
            for dep in declared.iter().chain(recorded) {
                if let Some((key, _)) = decided.get_key_value(dep) {
                    dependents.entry(key).or_default().insert(&d.address);
                }
            }
        }

        let empty = Slots::default();
        let slot_of = |a: &ResourceAddress| slots.get(a).unwrap_or(&empty);

        for d in decided.values() {
            let own = slot_of(&d.address);

            if let Some(spec) = d.spec {
                for dep in spec.dependencies() {
                    let theirs: Vec<usize> = slot_of(&dep).writes().collect();
                    for mine in own.writes() {
                        waits[mine].extend(theirs.iter().copied());
                    }
                }
            }

            let replaced_cbd =
                d.decision == Decision::Replace && cbd.get(&d.address).copied().unwrap_or(false);
            let replaced_dbc = d.decision == Decision::Replace && !replaced_cbd;

            if replaced_dbc {
                if let (Some(create), Some(destroy)) = (own.create, own.destroy) {
                    waits[create].insert(destroy);
                }
            }
            if replaced_cbd {
                if let (Some(create), Some(destroy)) = (own.create, own.destroy) {
                    waits[destroy].insert(create);
                }
            }

            // After a destroy-before-create, dependents' writes point at the
            // new instance and must wait for it, so only their destroys come
            // first.
            let blockers: Vec<usize> = dependents
                .get(&d.address)
                .into_iter()
                .flatten()
                .flat_map(|r| {
                    let theirs = slot_of(r);
                    if replaced_dbc {
                        theirs.destroys().collect::<Vec<_>>()
                    } else {
                        theirs.writes().chain(theirs.destroys()).collect()
                    }
                })
                .collect();

            for destroy in own.destroys() {
                waits[destroy].extend(blockers.iter().copied());
            }

            if !replaced_cbd {
                if let Some(destroy) = own.destroy {
                    waits[destroy].extend(own.deposed.iter().copied());
                }
            }
        }

        for (i, w) in waits.iter_mut().enumerate() {
            w.remove(&i);
        }
        waits
    }
}

fn push(entries: &mut Vec<PlanEntry>, entry: PlanEntry) -> usize {
    entries.push(entry);
    entries.len() - 1
}

fn resolve(
    spec: &ResourceSpec,
    planned: &HashMap<ResourceAddress, BTreeMap<String, PlannedValue>>,
) -> BTreeMap<String, PlannedValue> {
    let lookup = |r: &Reference| {
        planned
            .get(&r.address)
            .and_then(|attrs| attrs.get(&r.attribute))
            .and_then(|v| v.known())
            .cloned()
    };
    spec.attributes
        .iter()
        .map(|(name, expr)| {
            let value = expr
                .resolve(&lookup)
                .map_or(PlannedValue::Unknown, PlannedValue::Known);
            (name.clone(), value)
        })
        .collect()
}

fn known(prior: &ResourceState) -> BTreeMap<String, PlannedValue> {
    prior
        .attributes
        .iter()
        .map(|(k, v)| (k.clone(), PlannedValue::Known(v.clone())))
        .collect()
}

fn with_unknown_computed(
    mut values: BTreeMap<String, PlannedValue>,
    schema: &ResourceSchema,
) -> BTreeMap<String, PlannedValue> {
    for (name, attr) in &schema.attributes {
        if attr.computed {
            values.insert(name.clone(), PlannedValue::Unknown);
        }
    }
    values
}

fn compare(
    spec: &ResourceSpec,
    prior: &ResourceState,
    schema: &ResourceSchema,
    planned: &HashMap<ResourceAddress, BTreeMap<String, PlannedValue>>,
) -> (Decision, BTreeMap<String, PlannedValue>, Vec<AttributeChange>) {
    let declared = resolve(spec, planned);
    let mut changes = Vec::new();

    for (name, after) in &declared {
        let before = prior.attributes.get(name);
        let changed = match after {
            PlannedValue::Known(v) => before != Some(v),
            PlannedValue::Unknown => true,
        };
        if changed {
            changes.push(AttributeChange {
                name: name.clone(),
                before: before.cloned(),
                after: after.clone(),
                forces_replacement: schema.requires_replacement(name),
            });
        }
    }

    for (name, before) in &prior.attributes {
        if declared.contains_key(name) || schema.is_computed(name) || before.is_null() {
            continue;
        }
        changes.push(AttributeChange {
            name: name.clone(),
            before: Some(before.clone()),
            after: PlannedValue::Known(serde_json::Value::Null),
            forces_replacement: schema.requires_replacement(name),
        });
    }
    changes.sort_by(|a, b| a.name.cmp(&b.name));

    if changes.is_empty() {
        return (Decision::NoOp, known(prior), changes);
    }

    if changes.iter().any(|c| c.forces_replacement) {
        return (
            Decision::Replace,
            with_unknown_computed(declared, schema),
            changes,
        );
    }

    let mut after = known(prior);
    for change in &changes {
        if declared.contains_key(&change.name) {
            after.insert(change.name.clone(), change.after.clone());
        } else {
            after.remove(&change.name);
        }
    }
    (Decision::Update, after, changes)
}

/// Sort entries over their wait edges. Ties go to the lower generation
/// index, which keeps the output deterministic.
fn order(entries: Vec<PlanEntry>, waits: Vec<BTreeSet<usize>>) -> Result<Vec<PlanEntry>> {
    let n = entries.len();
    let mut remaining: Vec<usize> = waits.iter().map(|w| w.len()).collect();
    let mut released_by: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (i, w) in waits.iter().enumerate() {
        for &j in w {
            released_by[j].push(i);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
        .filter(|&i| remaining[i] == 0)
        .map(Reverse)
        .collect();
    let mut sequence = Vec::with_capacity(n);
    while let Some(Reverse(i)) = ready.pop() {
        sequence.push(i);
        for &k in &released_by[i] {
            remaining[k] -= 1;
            if remaining[k] == 0 {
                ready.push(Reverse(k));
            }
        }
    }

    if sequence.len() != n {
        let addresses: BTreeSet<ResourceAddress> = (0..n)
            .filter(|&i| remaining[i] > 0)
            .map(|i| entries[i].address.clone())
            .collect();
        return Err(CoreError::Cycle {
            addresses: addresses.into_iter().collect(),
        });
    }

    let mut position = vec![0; n];
    for (pos, &i) in sequence.iter().enumerate() {
        position[i] = pos;
    }

    let mut slots: Vec<Option<PlanEntry>> = entries.into_iter().map(Some).collect();
    let mut out = Vec::with_capacity(n);
    for &i in &sequence {
        if let Some(mut entry) = slots[i].take() {
            entry.depends_on = waits[i].iter().map(|&j| position[j]).collect();
            entry.depends_on.sort_unstable();
            out.push(entry);
        }
    }
    Ok(out)
}
