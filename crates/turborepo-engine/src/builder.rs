//! Builds a [`TaskGraph`] from a workspace package graph plus the root and
//! per-package turbo.json configurations, expanding each requested task's
//! `dependsOn` entries into edges one BFS layer at a time.

use std::collections::{HashMap, HashSet, VecDeque};

use itertools::Itertools;
use petgraph::stable_graph::{NodeIndex, StableDiGraph};
use turborepo_graph::WorkspaceGraph;
use turborepo_task_id::{PackageName, TaskId, TaskName};
use turborepo_turbo_json::{TaskDefinition, TurboJson};

use crate::{error::EngineError, validate::validate_task_name, TaskGraph, TaskNode};

/// Constructs a [`TaskGraph`] for a requested set of `(package, task)` entry
/// points.
///
/// `only` restricts the final graph to exactly the requested entry points
/// (their dependency edges are dropped after the graph is otherwise fully
/// built, and any node pulled in purely to satisfy a dependency of a
/// requested task but not itself requested is dropped along with them).
/// `parallel` strips every non-root edge before any dependency expansion
/// happens, so each requested task runs independent of the others.
pub struct EngineBuilder<'a> {
    workspace_graph: &'a WorkspaceGraph,
    root_turbo_json: &'a TurboJson,
    package_turbo_jsons: &'a HashMap<PackageName, TurboJson>,
    single_package: bool,
    parallel: bool,
    only: bool,
}

impl<'a> EngineBuilder<'a> {
    pub fn new(
        workspace_graph: &'a WorkspaceGraph,
        root_turbo_json: &'a TurboJson,
        package_turbo_jsons: &'a HashMap<PackageName, TurboJson>,
        single_package: bool,
    ) -> Self {
        Self {
            workspace_graph,
            root_turbo_json,
            package_turbo_jsons,
            single_package,
            parallel: false,
            only: false,
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_only(mut self, only: bool) -> Self {
        self.only = only;
        self
    }

    /// Builds the graph for every `(package, task)` pair in the cartesian
    /// product of `packages` and `tasks`.
    pub fn build(
        self,
        packages: &[PackageName],
        tasks: &[TaskName<'static>],
    ) -> Result<TaskGraph, EngineError> {
        for task in tasks {
            validate_task_name(task.as_str()).map_err(EngineError::InvalidTaskName)?;
        }

        let mut graph = StableDiGraph::new();
        let mut index: HashMap<TaskId<'static>, NodeIndex> = HashMap::new();
        let mut definitions: HashMap<TaskId<'static>, TaskDefinition> = HashMap::new();
        let root_index = graph.add_node(TaskNode::Root);

        let requested: HashSet<TaskId<'static>> = packages
            .iter()
            .cartesian_product(tasks.iter())
            .map(|(pkg, task)| task_id_for(pkg, task))
            .collect();

        let mut queue: VecDeque<TaskId<'static>> = requested.iter().cloned().collect();
        let mut visited: HashSet<TaskId<'static>> = HashSet::new();

        while let Some(task_id) = queue.pop_front() {
            if visited.contains(&task_id) {
                continue;
            }
            visited.insert(task_id.clone());

            let package = task_id.package_name();
            if !package.is_root() && !self.workspace_graph.contains(&package) {
                return Err(EngineError::UnknownPackage {
                    task: task_id.to_string(),
                    package: package.to_string(),
                });
            }

            let package_override = self.package_turbo_jsons.get(&package);
            let (definition, _warnings) = self
                .root_turbo_json
                .task_definition(&task_id, package_override, self.single_package)
                .map_err(|err| match err {
                    turborepo_turbo_json::TurboJsonError::UnknownTask(_) => {
                        EngineError::UnknownTask(task_id.to_string())
                    }
                    other => EngineError::TurboJson(other),
                })?;

            let to_index = node_index(&mut graph, &mut index, task_id.clone());

            let mut has_outgoing_edge = false;

            if !self.parallel {
                for dep in &definition.task_dependencies {
                    let from_id = task_id_for(&package, dep);
                    if self.only && !requested.contains(&from_id) {
                        continue;
                    }
                    let from_index = node_index(&mut graph, &mut index, from_id.clone());
                    graph.add_edge(to_index, from_index, ());
                    has_outgoing_edge = true;
                    queue.push_back(from_id);
                }

                for dep in &definition.package_dependencies {
                    let from_id = dep.clone();
                    if self.only && !requested.contains(&from_id) {
                        continue;
                    }
                    let from_index = node_index(&mut graph, &mut index, from_id.clone());
                    graph.add_edge(to_index, from_index, ());
                    has_outgoing_edge = true;
                    queue.push_back(from_id);
                }

                if !package.is_root() {
                    let dep_pkgs = self
                        .workspace_graph
                        .direct_dependencies(&package)
                        .map_err(|_| EngineError::UnknownPackage {
                            task: task_id.to_string(),
                            package: package.to_string(),
                        })?;
                    for dep_task in &definition.topological_dependencies {
                        for dep_pkg in &dep_pkgs {
                            if dep_pkg.is_root() {
                                continue;
                            }
                            let from_id = task_id_for(dep_pkg, dep_task);
                            if self.only && !requested.contains(&from_id) {
                                continue;
                            }
                            let from_index = node_index(&mut graph, &mut index, from_id.clone());
                            graph.add_edge(to_index, from_index, ());
                            has_outgoing_edge = true;
                            queue.push_back(from_id);
                        }
                    }
                }
            }

            if !has_outgoing_edge {
                graph.add_edge(to_index, root_index, ());
            }

            definitions.insert(task_id, definition);
        }

        let (graph, index, root_index) = if self.only {
            prune_to_requested(&graph, &index, &requested)
        } else {
            (graph, index, root_index)
        };
        if self.only {
            definitions.retain(|id, _| requested.contains(id));
        }

        validate_acyclic(&graph)?;
        validate_no_self_dependency(&graph)?;
        validate_persistent_rule(&graph, &definitions)?;

        Ok(TaskGraph {
            graph,
            index,
            root_index,
            definitions,
        })
    }
}

/// Rebuilds the graph containing only the requested entry points and the
/// root node, re-pointing every kept node with no surviving outgoing edge
/// back to root. Nodes pulled in solely to satisfy a dependency of a
/// requested task, but not themselves requested, are dropped.
fn prune_to_requested(
    graph: &StableDiGraph<TaskNode, ()>,
    index: &HashMap<TaskId<'static>, NodeIndex>,
    requested: &HashSet<TaskId<'static>>,
) -> (
    StableDiGraph<TaskNode, ()>,
    HashMap<TaskId<'static>, NodeIndex>,
    NodeIndex,
) {
    let mut pruned = StableDiGraph::new();
    let mut pruned_index = HashMap::new();
    let pruned_root = pruned.add_node(TaskNode::Root);

    for task_id in requested {
        if index.contains_key(task_id) {
            let idx = pruned.add_node(TaskNode::Task(task_id.clone()));
            pruned_index.insert(task_id.clone(), idx);
        }
    }

    for task_id in requested {
        let Some(&old_idx) = index.get(task_id) else {
            continue;
        };
        let Some(&new_from) = pruned_index.get(task_id) else {
            continue;
        };
        let mut has_edge = false;
        for neighbor in graph.neighbors_directed(old_idx, petgraph::Direction::Outgoing) {
            if let TaskNode::Task(dep_id) = &graph[neighbor] {
                if let Some(&new_to) = pruned_index.get(dep_id) {
                    pruned.add_edge(new_from, new_to, ());
                    has_edge = true;
                }
            }
        }
        if !has_edge {
            pruned.add_edge(new_from, pruned_root, ());
        }
    }

    (pruned, pruned_index, pruned_root)
}

fn task_id_for(package: &PackageName, task: &TaskName<'_>) -> TaskId<'static> {
    TaskId::new(package.as_str().to_owned(), task.as_str().to_owned())
}

fn node_index(
    graph: &mut StableDiGraph<TaskNode, ()>,
    index: &mut HashMap<TaskId<'static>, NodeIndex>,
    task_id: TaskId<'static>,
) -> NodeIndex {
    *index
        .entry(task_id.clone())
        .or_insert_with(|| graph.add_node(TaskNode::Task(task_id)))
}

fn validate_acyclic(graph: &StableDiGraph<TaskNode, ()>) -> Result<(), EngineError> {
    petgraph::algo::toposort(graph, None)
        .map(|_| ())
        .map_err(|cycle| EngineError::Cycle(graph[cycle.node_id()].to_string()))
}

fn validate_no_self_dependency(graph: &StableDiGraph<TaskNode, ()>) -> Result<(), EngineError> {
    for idx in graph.node_indices() {
        if graph.find_edge(idx, idx).is_some() {
            return Err(EngineError::SelfDependency(graph[idx].to_string()));
        }
    }
    Ok(())
}

/// Nothing may depend on a persistent task: it never exits, so anything
/// waiting on its completion would wait forever.
fn validate_persistent_rule(
    graph: &StableDiGraph<TaskNode, ()>,
    definitions: &HashMap<TaskId<'static>, TaskDefinition>,
) -> Result<(), EngineError> {
    for edge in graph.edge_indices() {
        let (dependent_idx, dependency_idx) = graph
            .edge_endpoints(edge)
            .expect("edge index came from this graph");
        let TaskNode::Task(dependency_id) = &graph[dependency_idx] else {
            continue;
        };
        let TaskNode::Task(dependent_id) = &graph[dependent_idx] else {
            continue;
        };
        if definitions
            .get(dependency_id)
            .map(|def| def.persistent)
            .unwrap_or(false)
        {
            return Err(EngineError::PersistentViolation {
                dependency: dependency_id.to_string(),
                dependent: dependent_id.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use turborepo_task_id::PackageName;

    use super::*;

    fn turbo_json(tasks_json: &str) -> TurboJson {
        let contents = format!(r#"{{"tasks":{tasks_json}}}"#);
        TurboJson::parse("turbo.json", &contents).unwrap()
    }

    fn workspace() -> WorkspaceGraph {
        WorkspaceGraph::build(vec![
            (PackageName::new("web"), vec![PackageName::new("ui")]),
            (PackageName::new("ui"), vec![]),
        ])
        .unwrap()
    }

    #[test]
    fn cartesian_product_creates_one_task_per_package() {
        let root = turbo_json(r#"{"build": {}}"#);
        let overrides = HashMap::new();
        let graph = EngineBuilder::new(&workspace(), &root, &overrides, false)
            .build(
                &[PackageName::new("web"), PackageName::new("ui")],
                &[TaskName::from("build".to_string())],
            )
            .unwrap();
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn task_dependencies_create_edges() {
        let root = turbo_json(r#"{"build": {"dependsOn": ["lint"]}, "lint": {}}"#);
        let overrides = HashMap::new();
        let graph = EngineBuilder::new(&workspace(), &root, &overrides, false)
            .build(&[PackageName::new("web")], &[TaskName::from("build".to_string())])
            .unwrap();
        let deps = graph.dependencies(&TaskId::new("web", "build"));
        assert_eq!(deps, vec![TaskId::new("web", "lint")]);
    }

    #[test]
    fn topological_dependencies_cross_into_workspace_dependencies() {
        let root = turbo_json(r#"{"build": {"dependsOn": ["^build"]}}"#);
        let overrides = HashMap::new();
        let graph = EngineBuilder::new(&workspace(), &root, &overrides, false)
            .build(&[PackageName::new("web")], &[TaskName::from("build".to_string())])
            .unwrap();
        let deps = graph.dependencies(&TaskId::new("web", "build"));
        assert_eq!(deps, vec![TaskId::new("ui", "build")]);
    }

    #[test]
    fn tasks_with_no_dependencies_connect_to_root() {
        let root = turbo_json(r#"{"build": {}}"#);
        let overrides = HashMap::new();
        let graph = EngineBuilder::new(&workspace(), &root, &overrides, false)
            .build(&[PackageName::new("web")], &[TaskName::from("build".to_string())])
            .unwrap();
        assert_eq!(graph.dependencies(&TaskId::new("web", "build")).len(), 1);
    }

    #[test]
    fn unknown_task_errors() {
        let root = turbo_json(r#"{"build": {}}"#);
        let overrides = HashMap::new();
        let err = EngineBuilder::new(&workspace(), &root, &overrides, false)
            .build(&[PackageName::new("web")], &[TaskName::from("test".to_string())])
            .unwrap_err();
        assert!(matches!(err, EngineError::UnknownTask(_)));
    }

    #[test]
    fn self_dependency_is_rejected() {
        let root = turbo_json(r#"{"build": {"dependsOn": ["build"]}}"#);
        let overrides = HashMap::new();
        let err = EngineBuilder::new(&workspace(), &root, &overrides, false)
            .build(&[PackageName::new("web")], &[TaskName::from("build".to_string())])
            .unwrap_err();
        assert!(matches!(err, EngineError::SelfDependency(_)));
    }

    #[test]
    fn persistent_task_cannot_be_depended_on() {
        let root = turbo_json(
            r#"{"dev": {"persistent": true}, "build": {"dependsOn": ["dev"]}}"#,
        );
        let overrides = HashMap::new();
        let err = EngineBuilder::new(&workspace(), &root, &overrides, false)
            .build(&[PackageName::new("web")], &[TaskName::from("build".to_string())])
            .unwrap_err();
        assert!(matches!(err, EngineError::PersistentViolation { .. }));
    }

    #[test]
    fn parallel_flag_strips_dependency_edges() {
        let root = turbo_json(r#"{"build": {"dependsOn": ["lint"]}, "lint": {}}"#);
        let overrides = HashMap::new();
        let graph = EngineBuilder::new(&workspace(), &root, &overrides, false)
            .with_parallel(true)
            .build(&[PackageName::new("web")], &[TaskName::from("build".to_string())])
            .unwrap();
        let deps = graph.dependencies(&TaskId::new("web", "build"));
        assert_eq!(deps.len(), 0);
        assert_eq!(graph.len(), 1);
    }

    #[test]
    fn only_flag_drops_unrequested_dependency_nodes() {
        let root = turbo_json(r#"{"build": {"dependsOn": ["lint"]}, "lint": {}}"#);
        let overrides = HashMap::new();
        let graph = EngineBuilder::new(&workspace(), &root, &overrides, false)
            .with_only(true)
            .build(&[PackageName::new("web")], &[TaskName::from("build".to_string())])
            .unwrap();
        assert_eq!(graph.len(), 1);
        assert!(graph.definition(&TaskId::new("web", "lint")).is_none());
    }
}
