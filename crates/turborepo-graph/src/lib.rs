//! The workspace package graph: a directed acyclic graph of package names
//! plus a synthetic root node, built once per run from an already-discovered
//! package list and each package's declared workspace dependencies.

mod error;

use std::collections::HashMap;

pub use error::GraphError;
use petgraph::{
    stable_graph::{NodeIndex, StableDiGraph},
    visit::Dfs,
    Direction,
};
use turborepo_task_id::PackageName;

/// Edge `A -> B` reads "A depends on B": building or running `A` requires
/// `B`'s outputs to exist first. Every real package additionally has an
/// edge to the synthetic root package, so workspace-wide tasks owned by the
/// root are always reachable.
pub struct WorkspaceGraph {
    graph: StableDiGraph<PackageName, ()>,
    index: HashMap<PackageName, NodeIndex>,
}

impl WorkspaceGraph {
    /// Builds the graph from `packages`, a `(package, its dependencies)`
    /// list as already resolved by workspace discovery. Dependencies that
    /// don't name a known package are ignored rather than rejected, since
    /// they may be external (npm registry) packages rather than workspace
    /// siblings; the caller is expected to have already filtered those out
    /// if it wants stricter behavior.
    pub fn build<I>(packages: I) -> Result<Self, GraphError>
    where
        I: IntoIterator<Item = (PackageName, Vec<PackageName>)>,
    {
        let packages: Vec<_> = packages.into_iter().collect();

        let mut graph = StableDiGraph::new();
        let mut index = HashMap::with_capacity(packages.len() + 1);

        let root_idx = graph.add_node(PackageName::root());
        index.insert(PackageName::root(), root_idx);

        for (name, _) in &packages {
            if name.is_root() {
                continue;
            }
            let idx = graph.add_node(name.clone());
            index.insert(name.clone(), idx);
        }

        for (name, deps) in &packages {
            if name.is_root() {
                continue;
            }
            let from = index[name];
            for dep in deps {
                if let Some(&to) = index.get(dep) {
                    graph.add_edge(from, to, ());
                }
            }
            graph.add_edge(from, root_idx, ());
        }

        if let Err(cycle) = petgraph::algo::toposort(&graph, None) {
            let name = graph[cycle.node_id()].clone();
            return Err(GraphError::Cycle(name.to_string()));
        }

        Ok(Self { graph, index })
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, package: &PackageName) -> bool {
        self.index.contains_key(package)
    }

    pub fn packages(&self) -> impl Iterator<Item = &PackageName> {
        self.graph.node_weights()
    }

    /// The packages `package` directly depends on.
    pub fn direct_dependencies(&self, package: &PackageName) -> Result<Vec<PackageName>, GraphError> {
        let idx = self.node(package)?;
        Ok(self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .map(|n| self.graph[n].clone())
            .collect())
    }

    /// Every package `package` transitively depends on, not including
    /// itself. Used to pull in a task's topological (`^task`) dependencies
    /// across the whole workspace dependency chain, not just one hop.
    pub fn ancestors(&self, package: &PackageName) -> Result<Vec<PackageName>, GraphError> {
        let idx = self.node(package)?;
        let mut dfs = Dfs::new(&self.graph, idx);
        dfs.next(&self.graph); // skip `package` itself
        let mut out = Vec::new();
        while let Some(next) = dfs.next(&self.graph) {
            out.push(self.graph[next].clone());
        }
        Ok(out)
    }

    /// Every package that transitively depends on `package`, not including
    /// itself. Used to know which packages' tasks must be skipped when
    /// `package`'s task fails under continue-on-error.
    pub fn descendants(&self, package: &PackageName) -> Result<Vec<PackageName>, GraphError> {
        let idx = self.node(package)?;
        let reversed = petgraph::visit::Reversed(&self.graph);
        let mut dfs = Dfs::new(&reversed, idx);
        dfs.next(&reversed);
        let mut out = Vec::new();
        while let Some(next) = dfs.next(&reversed) {
            out.push(self.graph[next].clone());
        }
        Ok(out)
    }

    fn node(&self, package: &PackageName) -> Result<NodeIndex, GraphError> {
        self.index
            .get(package)
            .copied()
            .ok_or_else(|| GraphError::UnknownPackage(package.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg(name: &str) -> PackageName {
        PackageName::new(name)
    }

    #[test]
    fn root_is_always_present() {
        let graph = WorkspaceGraph::build(vec![(pkg("web"), vec![])]).unwrap();
        assert!(graph.contains(&PackageName::root()));
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn every_package_depends_on_root() {
        let graph = WorkspaceGraph::build(vec![(pkg("web"), vec![])]).unwrap();
        let deps = graph.direct_dependencies(&pkg("web")).unwrap();
        assert_eq!(deps, vec![PackageName::root()]);
    }

    #[test]
    fn ancestors_are_transitive_dependencies() {
        let graph = WorkspaceGraph::build(vec![
            (pkg("web"), vec![pkg("ui")]),
            (pkg("ui"), vec![pkg("core")]),
            (pkg("core"), vec![]),
        ])
        .unwrap();
        let mut ancestors = graph.ancestors(&pkg("web")).unwrap();
        ancestors.sort();
        let mut expected = vec![pkg("ui"), pkg("core"), PackageName::root()];
        expected.sort();
        assert_eq!(ancestors, expected);
    }

    #[test]
    fn descendants_are_transitive_dependents() {
        let graph = WorkspaceGraph::build(vec![
            (pkg("web"), vec![pkg("ui")]),
            (pkg("ui"), vec![pkg("core")]),
            (pkg("core"), vec![]),
        ])
        .unwrap();
        let descendants = graph.descendants(&pkg("core")).unwrap();
        assert_eq!(descendants, vec![pkg("ui"), pkg("web")]);
    }

    #[test]
    fn detects_cycle() {
        let err = WorkspaceGraph::build(vec![
            (pkg("a"), vec![pkg("b")]),
            (pkg("b"), vec![pkg("a")]),
        ])
        .unwrap_err();
        assert!(matches!(err, GraphError::Cycle(_)));
    }

    #[test]
    fn unknown_package_query_errors() {
        let graph = WorkspaceGraph::build(vec![(pkg("web"), vec![])]).unwrap();
        assert!(matches!(
            graph.direct_dependencies(&pkg("missing")),
            Err(GraphError::UnknownPackage(_))
        ));
    }
}
