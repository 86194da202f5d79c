//! The task graph: a directed acyclic graph of package-qualified tasks plus
//! a synthetic root node, built from the workspace package graph and each
//! package's resolved turbo.json by expanding every task's `dependsOn`
//! entries into edges.

mod builder;
mod error;
mod validate;

use std::{collections::HashMap, fmt};

pub use builder::EngineBuilder;
pub use error::EngineError;
use petgraph::{
    stable_graph::{NodeIndex, StableDiGraph},
    visit::{EdgeRef, IntoEdgeReferences},
    Direction,
};
use turborepo_task_id::TaskId;
use turborepo_turbo_json::TaskDefinition;

/// A node in the task graph: either the synthetic root, sunk to whenever a
/// task has no dependencies of its own, or a concrete package-qualified
/// task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskNode {
    Root,
    Task(TaskId<'static>),
}

impl fmt::Display for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskNode::Root => write!(f, "___ROOT___"),
            TaskNode::Task(id) => write!(f, "{id}"),
        }
    }
}

/// The built, validated task graph plus each task's resolved definition.
/// Edge `A -> B` reads "A depends on B", matching the workspace package
/// graph's convention.
pub struct TaskGraph {
    graph: StableDiGraph<TaskNode, ()>,
    index: HashMap<TaskId<'static>, NodeIndex>,
    root_index: NodeIndex,
    definitions: HashMap<TaskId<'static>, TaskDefinition>,
}

impl TaskGraph {
    pub fn task_ids(&self) -> impl Iterator<Item = &TaskId<'static>> {
        self.index.keys()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn definition(&self, task_id: &TaskId<'_>) -> Option<&TaskDefinition> {
        self.definitions.get(&owned(task_id))
    }

    /// A dependency-first ordering of every task: each task appears after
    /// everything it depends on. Used to hash and schedule tasks one
    /// completed dependency layer at a time.
    pub fn task_order(&self) -> Vec<TaskId<'static>> {
        let order = petgraph::algo::toposort(&self.graph, None)
            .expect("graph was validated acyclic at build time");
        order
            .into_iter()
            .rev()
            .filter_map(|idx| match &self.graph[idx] {
                TaskNode::Task(id) => Some(id.clone()),
                TaskNode::Root => None,
            })
            .collect()
    }

    /// Tasks with no dependency edges other than to the synthetic root can
    /// start immediately; a scheduler uses this as its initial ready set.
    pub fn tasks_with_no_dependencies(&self) -> Vec<TaskId<'static>> {
        self.graph
            .neighbors_directed(self.root_index, Direction::Incoming)
            .filter_map(|n| match &self.graph[n] {
                TaskNode::Task(id) => Some(id.clone()),
                TaskNode::Root => None,
            })
            .collect()
    }

    /// The tasks `task_id` depends on directly.
    pub fn dependencies(&self, task_id: &TaskId<'_>) -> Vec<TaskId<'static>> {
        self.neighbors(task_id, Direction::Outgoing)
    }

    /// The tasks that directly depend on `task_id`.
    pub fn dependents(&self, task_id: &TaskId<'_>) -> Vec<TaskId<'static>> {
        self.neighbors(task_id, Direction::Incoming)
    }

    fn neighbors(&self, task_id: &TaskId<'_>, direction: Direction) -> Vec<TaskId<'static>> {
        let Some(&idx) = self.index.get(&owned(task_id)) else {
            return Vec::new();
        };
        self.graph
            .neighbors_directed(idx, direction)
            .filter_map(|n| match &self.graph[n] {
                TaskNode::Task(id) => Some(id.clone()),
                TaskNode::Root => None,
            })
            .collect()
    }

    /// Renders the graph in the same `digraph` shape a dependency-aware
    /// build orchestrator would print for `--graph=dot`.
    pub fn to_dot(&self) -> String {
        let mut edges: Vec<String> = self
            .graph
            .edge_references()
            .map(|edge| {
                let source = self.graph[edge.source()].to_string();
                let target = self.graph[edge.target()].to_string();
                format!("\t\t\"[root] {source}\" -> \"[root] {target}\"")
            })
            .collect();
        edges.sort();

        format!(
            "\ndigraph {{\n\tcompound = \"true\"\n\tnewrank = \"true\"\n\tsubgraph \"root\" {{\n{}\n\t}}\n}}\n\n",
            edges.join("\n")
        )
    }
}

fn owned(task_id: &TaskId<'_>) -> TaskId<'static> {
    TaskId::new(task_id.package().to_owned(), task_id.task().to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_displays_with_synthetic_name() {
        assert_eq!(TaskNode::Root.to_string(), "___ROOT___");
    }

    #[test]
    fn task_node_displays_qualified_id() {
        let node = TaskNode::Task(TaskId::new("web", "build"));
        assert_eq!(node.to_string(), "web#build");
    }

    #[test]
    fn tasks_with_no_dependencies_matches_root_connected_tasks() {
        use std::collections::HashMap;

        use turborepo_graph::WorkspaceGraph;
        use turborepo_task_id::{PackageName, TaskName};
        use turborepo_turbo_json::TurboJson;

        let workspace = WorkspaceGraph::build(vec![(PackageName::new("web"), vec![])]).unwrap();
        let root = TurboJson::parse("turbo.json", r#"{"tasks": {"build": {}}}"#).unwrap();
        let overrides: HashMap<PackageName, TurboJson> = HashMap::new();
        let graph = EngineBuilder::new(&workspace, &root, &overrides, false)
            .build(
                &[PackageName::new("web")],
                &[TaskName::from("build".to_string())],
            )
            .unwrap();
        assert_eq!(graph.tasks_with_no_dependencies(), vec![TaskId::new("web", "build")]);
    }
}
