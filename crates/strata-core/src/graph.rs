//! Dependency graph builder
//!
//! Resources are stored in an arena indexed by position; edges are index
//! sets. An edge `a -> b` means `a` depends on `b`, so `b` must be created
//! or updated first.

use crate::error::{CoreError, Result};
use crate::model::{ResourceAddress, ResourceSpec};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap, HashMap};

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: Vec<ResourceAddress>,
    index: HashMap<ResourceAddress, usize>,
    dependencies: Vec<BTreeSet<usize>>,
    dependents: Vec<BTreeSet<usize>>,
    order: Vec<usize>,
}

impl DependencyGraph {
    /// Build from declared specs. Duplicate addresses and references to
    /// undeclared resources are configuration errors; cycles are
    /// [`CoreError::Cycle`].
    pub fn build(specs: &[ResourceSpec]) -> Result<Self> {
        let mut edges: BTreeMap<ResourceAddress, BTreeSet<ResourceAddress>> = BTreeMap::new();
        for spec in specs {
            if edges
                .insert(spec.address.clone(), spec.dependencies())
                .is_some()
            {
                return Err(CoreError::config(format!(
                    "resource {} is declared more than once",
                    spec.address
                )));
            }
        }

        for (address, deps) in &edges {
            if let Some(missing) = deps.iter().find(|d| !edges.contains_key(*d)) {
                return Err(CoreError::config(format!(
                    "{} depends on undeclared resource {}",
                    address, missing
                )));
            }
        }

        Self::from_edge_map(edges)
    }

    /// Build from arbitrary `(node, dependencies)` pairs. Dependencies on
    /// addresses that are not nodes themselves are dropped.
    pub fn from_edges<I>(edges: I) -> Result<Self>
    where
        I: IntoIterator<Item = (ResourceAddress, Vec<ResourceAddress>)>,
    {
        let mut map: BTreeMap<ResourceAddress, BTreeSet<ResourceAddress>> = BTreeMap::new();
        for (address, deps) in edges {
            map.entry(address).or_default().extend(deps);
        }
        let known: BTreeSet<ResourceAddress> = map.keys().cloned().collect();
        for (address, deps) in map.iter_mut() {
            deps.retain(|d| known.contains(d) && d != address);
        }
        Self::from_edge_map(map)
    }

    fn from_edge_map(edges: BTreeMap<ResourceAddress, BTreeSet<ResourceAddress>>) -> Result<Self> {
        // BTreeMap iteration keeps indices in address order, which makes
        // every traversal below deterministic.
        let nodes: Vec<ResourceAddress> = edges.keys().cloned().collect();
        let index: HashMap<ResourceAddress, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, a)| (a.clone(), i))
            .collect();

        let mut dependencies = vec![BTreeSet::new(); nodes.len()];
        let mut dependents = vec![BTreeSet::new(); nodes.len()];
        for (address, deps) in &edges {
            let from = index[address];
            for dep in deps {
                let to = index[dep];
                dependencies[from].insert(to);
                dependents[to].insert(from);
            }
        }

        let mut graph = Self {
            nodes,
            index,
            dependencies,
            dependents,
            order: Vec::new(),
        };
        graph.order = graph.sort()?;
        tracing::debug!(nodes = graph.nodes.len(), "Built dependency graph");
        Ok(graph)
    }

    fn sort(&self) -> Result<Vec<usize>> {
        let mut remaining: Vec<usize> = self.dependencies.iter().map(|d| d.len()).collect();
        let mut ready: BinaryHeap<Reverse<usize>> = remaining
            .iter()
            .enumerate()
            .filter(|(_, n)| **n == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse(node)) = ready.pop() {
            order.push(node);
            for &dependent in &self.dependents[node] {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    ready.push(Reverse(dependent));
                }
            }
        }

        if order.len() == self.nodes.len() {
            return Ok(order);
        }

        let stuck: BTreeSet<usize> = (0..self.nodes.len())
            .filter(|i| remaining[*i] > 0)
            .collect();
        Err(CoreError::Cycle {
            addresses: self.find_cycle(&stuck),
        })
    }

    /// Every stuck node still waits on another stuck node, so walking
    /// dependencies from any of them must revisit a node.
    fn find_cycle(&self, stuck: &BTreeSet<usize>) -> Vec<ResourceAddress> {
        let Some(&start) = stuck.iter().next() else {
            return Vec::new();
        };
        let mut path: Vec<usize> = Vec::new();
        let mut seen_at: HashMap<usize, usize> = HashMap::new();
        let mut current = start;
        loop {
            if let Some(&pos) = seen_at.get(&current) {
                return path[pos..]
                    .iter()
                    .map(|&i| self.nodes[i].clone())
                    .collect();
            }
            seen_at.insert(current, path.len());
            path.push(current);
            match self.dependencies[current]
                .iter()
                .find(|d| stuck.contains(*d))
            {
                Some(&next) => current = next,
                None => {
                    return path.iter().map(|&i| self.nodes[i].clone()).collect();
                }
            }
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, address: &ResourceAddress) -> bool {
        self.index.contains_key(address)
    }

    /// Addresses with every dependency before its dependents. Ties are
    /// broken by address order.
    pub fn topological_order(&self) -> Vec<&ResourceAddress> {
        self.order.iter().map(|&i| &self.nodes[i]).collect()
    }

    pub fn dependencies_of(&self, address: &ResourceAddress) -> Vec<&ResourceAddress> {
        self.neighbours(address, &self.dependencies)
    }

    pub fn dependents_of(&self, address: &ResourceAddress) -> Vec<&ResourceAddress> {
        self.neighbours(address, &self.dependents)
    }

    fn neighbours<'a>(
        &'a self,
        address: &ResourceAddress,
        table: &'a [BTreeSet<usize>],
    ) -> Vec<&'a ResourceAddress> {
        self.index
            .get(address)
            .map(|&i| table[i].iter().map(|&j| &self.nodes[j]).collect())
            .unwrap_or_default()
    }

    /// Everything that directly or indirectly depends on `address`.
    pub fn transitive_dependents(&self, address: &ResourceAddress) -> BTreeSet<ResourceAddress> {
        let mut out = BTreeSet::new();
        let Some(&start) = self.index.get(address) else {
            return out;
        };
        let mut stack = vec![start];
        let mut visited = BTreeSet::new();
        while let Some(node) = stack.pop() {
            for &dependent in &self.dependents[node] {
                if visited.insert(dependent) {
                    out.insert(self.nodes[dependent].clone());
                    stack.push(dependent);
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn addr(s: &str) -> ResourceAddress {
        s.parse().unwrap()
    }

    fn network_specs() -> Vec<ResourceSpec> {
        vec![
            ResourceSpec::new(addr("subnet.a"))
                .with_reference("vpc_id", addr("vpc.main"), "id"),
            ResourceSpec::new(addr("vpc.main")).with_literal("cidr_block", "10.0.0.0/16"),
            ResourceSpec::new(addr("node_group.workers"))
                .with_reference("subnet_id", addr("subnet.a"), "id")
                .with_depends_on(addr("iam_role.node")),
            ResourceSpec::new(addr("iam_role.node")).with_literal("name", "node"),
        ]
    }

    #[test]
    fn test_topological_order_puts_dependencies_first() {
        let graph = DependencyGraph::build(&network_specs()).unwrap();
        let order: Vec<String> = graph
            .topological_order()
            .iter()
            .map(|a| a.to_string())
            .collect();
        assert_eq!(
            order,
            vec!["iam_role.node", "vpc.main", "subnet.a", "node_group.workers"]
        );
    }

    #[test]
    fn test_single_threaded_simulation_respects_edges() {
        // Walking the topological order, every create must find all its
        // dependencies already created.
        let specs = network_specs();
        let graph = DependencyGraph::build(&specs).unwrap();
        let mut created: HashSet<ResourceAddress> = HashSet::new();
        for address in graph.topological_order() {
            let spec = specs.iter().find(|s| &s.address == address).unwrap();
            for dep in spec.dependencies() {
                assert!(created.contains(&dep), "{} created before {}", address, dep);
            }
            created.insert(address.clone());
        }
        assert_eq!(created.len(), specs.len());
    }

    #[test]
    fn test_cycle_names_both_addresses() {
        let specs = vec![
            ResourceSpec::new(addr("thing.a")).with_reference("peer", addr("thing.b"), "id"),
            ResourceSpec::new(addr("thing.b")).with_reference("peer", addr("thing.a"), "id"),
        ];
        match DependencyGraph::build(&specs) {
            Err(CoreError::Cycle { addresses }) => {
                assert_eq!(addresses, vec![addr("thing.a"), addr("thing.b")]);
            }
            other => panic!("expected cycle, got {:?}", other),
        }
    }

    #[test]
    fn test_cycle_excludes_nodes_outside_it() {
        let specs = vec![
            ResourceSpec::new(addr("thing.root")).with_reference("x", addr("thing.b"), "id"),
            ResourceSpec::new(addr("thing.b")).with_reference("x", addr("thing.c"), "id"),
            ResourceSpec::new(addr("thing.c")).with_reference("x", addr("thing.b"), "id"),
        ];
        let Err(CoreError::Cycle { addresses }) = DependencyGraph::build(&specs) else {
            panic!("expected cycle");
        };
        assert_eq!(addresses, vec![addr("thing.b"), addr("thing.c")]);
    }

    #[test]
    fn test_undeclared_reference_is_config_error() {
        let specs = vec![
            ResourceSpec::new(addr("subnet.a")).with_reference("vpc_id", addr("vpc.gone"), "id"),
        ];
        assert!(matches!(
            DependencyGraph::build(&specs),
            Err(CoreError::Config(_))
        ));
    }

    #[test]
    fn test_duplicate_address_is_config_error() {
        let specs = vec![
            ResourceSpec::new(addr("vpc.main")),
            ResourceSpec::new(addr("vpc.main")),
        ];
        assert!(matches!(
            DependencyGraph::build(&specs),
            Err(CoreError::Config(_))
        ));
    }

    #[test]
    fn test_transitive_dependents() {
        let graph = DependencyGraph::build(&network_specs()).unwrap();
        let dependents = graph.transitive_dependents(&addr("vpc.main"));
        assert_eq!(
            dependents.into_iter().collect::<Vec<_>>(),
            vec![addr("node_group.workers"), addr("subnet.a")]
        );
        assert_eq!(graph.dependencies_of(&addr("subnet.a")), vec![&addr("vpc.main")]);
        assert_eq!(graph.dependents_of(&addr("subnet.a")), vec![&addr("node_group.workers")]);
    }

    #[test]
    fn test_from_edges_drops_unknown_targets() {
        let graph = DependencyGraph::from_edges(vec![
            (addr("subnet.a"), vec![addr("vpc.main"), addr("vpc.deleted")]),
            (addr("vpc.main"), vec![]),
        ])
        .unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.dependencies_of(&addr("subnet.a")), vec![&addr("vpc.main")]);
    }
}
