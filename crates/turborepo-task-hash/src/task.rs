//! Per-task fingerprinting: each task's hash folds in the global hash, its
//! own input file contents, its declared env vars, its resolved definition,
//! forwarded CLI args, and the hashes of whatever it depends on, so two runs
//! only ever produce the same task hash when nothing that could affect that
//! task's output has changed.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Mutex,
};

use turbopath::{AbsoluteSystemPath, AnchoredSystemPath, RelativeUnixPathBuf};
use turborepo_engine::TaskGraph;
use turborepo_scm::Scm;
use turborepo_task_id::TaskId;
use turborepo_turbo_json::TaskDefinition;

use crate::{
    canon::Canon,
    env::{expand_env_wildcards, hash_env_value, pass_through_names, resolve_env_mode, EnvMode},
    error::TaskHashError,
};

/// Per-package file-hash results, memoized so a package shared by several
/// tasks is only walked once per run.
#[derive(Default)]
pub struct PackageInputsHashes {
    cache: Mutex<HashMap<String, BTreeMap<RelativeUnixPathBuf, String>>>,
}

impl PackageInputsHashes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the `{path: fileHash}` map for `package_path`'s files
    /// matching `inputs`, computing and caching it on first request.
    pub fn get_or_compute(
        &self,
        scm: &dyn Scm,
        repo_root: &AbsoluteSystemPath,
        package_path: &AnchoredSystemPath,
        inputs: &[String],
    ) -> Result<BTreeMap<RelativeUnixPathBuf, String>, TaskHashError> {
        let key = format!("{package_path}\0{}", inputs.join("\0"));
        if let Some(hit) = self.cache.lock().unwrap().get(&key) {
            return Ok(hit.clone());
        }
        let hashes = scm.tracked_files_hash(repo_root, package_path, inputs)?;
        self.cache.lock().unwrap().insert(key, hashes.clone());
        Ok(hashes)
    }
}

/// Everything a single task's hash is computed from.
pub struct TaskHashInputs<'a> {
    pub global_hash: &'a str,
    pub package: &'a str,
    pub task: &'a str,
    pub input_file_hashes: &'a BTreeMap<RelativeUnixPathBuf, String>,
    pub env_vars: &'a BTreeMap<String, String>,
    pub pass_through_env_names: &'a [String],
    pub resolved_definition: &'a TaskDefinition,
    pub cli_arguments: &'a [String],
    pub dependency_hashes: &'a [String],
}

impl<'a> TaskHashInputs<'a> {
    pub fn hash(&self) -> String {
        let mut c = Canon::new();
        c.str("globalHash").str(self.global_hash);
        c.str("package").str(self.package);
        c.str("task").str(self.task);

        c.str("inputs");
        c.map(
            self.input_file_hashes
                .iter()
                .map(|(path, hash)| (path.as_str(), hash.as_str())),
        );

        let hashed_env: BTreeMap<&str, String> = self
            .env_vars
            .iter()
            .map(|(name, value)| (name.as_str(), hash_env_value(value)))
            .collect();
        c.str("envVars");
        c.map(hashed_env.iter().map(|(k, v)| (*k, v.as_str())));

        c.str("passThroughEnvNames");
        c.strs(self.pass_through_env_names.iter().map(String::as_str));

        normalize_definition(&mut c, self.resolved_definition);

        c.str("cliArguments");
        c.strs(self.cli_arguments.iter().map(String::as_str));

        c.str("depHashes");
        c.strs(self.dependency_hashes.iter().map(String::as_str));

        c.finish()
    }
}

/// Encodes a resolved task definition field by field, in a fixed order, so
/// the hash is stable regardless of how the definition was constructed.
fn normalize_definition(c: &mut Canon, def: &TaskDefinition) {
    c.str("cache").bool(def.cache);

    let mut task_deps: Vec<&str> = def.task_dependencies.iter().map(|t| t.as_str()).collect();
    task_deps.sort_unstable();
    c.str("taskDependencies").strs(task_deps);

    let mut topo_deps: Vec<&str> = def
        .topological_dependencies
        .iter()
        .map(|t| t.as_str())
        .collect();
    topo_deps.sort_unstable();
    c.str("topologicalDependencies").strs(topo_deps);

    let mut pkg_deps: Vec<String> = def.package_dependencies.iter().map(|t| t.to_string()).collect();
    pkg_deps.sort_unstable();
    c.str("packageDependencies")
        .strs(pkg_deps.iter().map(String::as_str));

    let mut env = def.env.clone();
    env.sort_unstable();
    c.str("env").strs(env.iter().map(String::as_str));

    let mut inputs = def.inputs.clone();
    inputs.sort_unstable();
    c.str("inputPatterns").strs(inputs.iter().map(String::as_str));

    match &def.pass_through_env {
        None => {
            c.str("passThroughEnv").tag("unset");
        }
        Some(names) => {
            let mut sorted = names.clone();
            sorted.sort_unstable();
            c.str("passThroughEnv").tag("set").strs(sorted.iter().map(String::as_str));
        }
    }

    c.str("persistent").bool(def.persistent);
    c.str("interruptible").bool(def.interruptible);

    let mut outputs = def.outputs.clone();
    outputs.sort_unstable();
    c.str("outputs").strs(outputs.iter().map(String::as_str));

    c.str("outputLogs").tag(match def.output_logs {
        turborepo_turbo_json::OutputLogsMode::Full => "full",
        turborepo_turbo_json::OutputLogsMode::HashOnly => "hash-only",
        turborepo_turbo_json::OutputLogsMode::NewOnly => "new-only",
        turborepo_turbo_json::OutputLogsMode::ErrorsOnly => "errors-only",
        turborepo_turbo_json::OutputLogsMode::None => "none",
    });

    c.str("interactive").bool(def.interactive);

    let mut dot_env = def.dot_env.clone();
    dot_env.sort_unstable();
    c.str("dotEnv").strs(dot_env.iter().map(String::as_str));
}

#[derive(Debug, Clone, Default)]
pub struct TaskHashRecord {
    pub hash: String,
    pub input_file_hashes: BTreeMap<RelativeUnixPathBuf, String>,
    pub env_vars: BTreeMap<String, String>,
    pub framework: Option<String>,
    pub expanded_outputs: Vec<RelativeUnixPathBuf>,
}

/// Accumulates per-task hash results as they're computed, so a later summary
/// render can report each task's fingerprint and the env vars that fed it
/// without recomputing anything.
#[derive(Default)]
pub struct TaskHashTracker {
    records: Mutex<HashMap<TaskId<'static>, TaskHashRecord>>,
}

impl TaskHashTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, task_id: TaskId<'static>, record: TaskHashRecord) {
        self.records.lock().unwrap().insert(task_id, record);
    }

    pub fn get(&self, task_id: &TaskId<'_>) -> Option<TaskHashRecord> {
        self.records
            .lock()
            .unwrap()
            .get(&owned(task_id))
            .cloned()
    }

    pub fn hash(&self, task_id: &TaskId<'_>) -> Option<String> {
        self.get(task_id).map(|r| r.hash)
    }
}

fn owned(task_id: &TaskId<'_>) -> TaskId<'static> {
    TaskId::new(task_id.package().to_owned(), task_id.task().to_owned())
}

/// Computes every task's hash in dependency-first order so a task's hash
/// input can reference its dependencies' hashes by value.
pub struct TaskHasher<'a> {
    scm: &'a dyn Scm,
    repo_root: &'a AbsoluteSystemPath,
    package_paths: &'a HashMap<String, turbopath::AnchoredSystemPathBuf>,
    package_dependency_names: &'a HashMap<String, Vec<String>>,
    package_inputs: PackageInputsHashes,
    global_hash: String,
    base_env_mode: EnvMode,
    pass_through_declared_anywhere: bool,
    framework_inference: bool,
    env_snapshot: BTreeMap<String, String>,
    tracker: TaskHashTracker,
}

impl<'a> TaskHasher<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        scm: &'a dyn Scm,
        repo_root: &'a AbsoluteSystemPath,
        package_paths: &'a HashMap<String, turbopath::AnchoredSystemPathBuf>,
        package_dependency_names: &'a HashMap<String, Vec<String>>,
        global_hash: String,
        base_env_mode: EnvMode,
        pass_through_declared_anywhere: bool,
        framework_inference: bool,
        env_snapshot: BTreeMap<String, String>,
    ) -> Self {
        Self {
            scm,
            repo_root,
            package_paths,
            package_dependency_names,
            package_inputs: PackageInputsHashes::new(),
            global_hash,
            base_env_mode,
            pass_through_declared_anywhere,
            framework_inference,
            env_snapshot,
            tracker: TaskHashTracker::new(),
        }
    }

    pub fn tracker(&self) -> &TaskHashTracker {
        &self.tracker
    }

    /// Hashes every task in `graph`, walking dependencies before dependents,
    /// and returns each task's hash keyed by id.
    pub fn hash_all(
        &self,
        graph: &TaskGraph,
        cli_arguments: &HashMap<TaskId<'static>, Vec<String>>,
    ) -> Result<HashMap<TaskId<'static>, String>, TaskHashError> {
        let mut hashes = HashMap::new();

        for task_id in graph.task_order() {
            let definition = graph
                .definition(&task_id)
                .ok_or_else(|| TaskHashError::MissingTaskDefinition(task_id.to_string()))?;

            let package_path = self
                .package_paths
                .get(task_id.package())
                .map(|p| p.as_path());

            let input_file_hashes = match package_path {
                Some(path) => {
                    self.package_inputs
                        .get_or_compute(self.scm, self.repo_root, path, &definition.inputs)?
                }
                None => BTreeMap::new(),
            };

            let env_mode = resolve_env_mode(self.base_env_mode, self.pass_through_declared_anywhere);
            let pass_through_names =
                pass_through_names(env_mode, definition.pass_through_env.as_deref());

            let framework = if self.framework_inference {
                self.package_dependency_names
                    .get(task_id.package())
                    .and_then(|deps| turborepo_frameworks::infer_framework(deps))
            } else {
                None
            };

            let mut declared_env: Vec<String> = definition.env.clone();
            declared_env.extend(definition.env_var_dependencies.iter().cloned());
            if let Some(framework) = framework {
                declared_env.extend(expand_env_wildcards(framework.env_wildcards(), &self.env_snapshot));
            }
            declared_env.sort_unstable();
            declared_env.dedup();

            let env_vars: BTreeMap<String, String> = declared_env
                .iter()
                .filter_map(|name| {
                    self.env_snapshot
                        .get(name)
                        .map(|value| (name.clone(), value.clone()))
                })
                .collect();

            let mut dependency_hashes: Vec<String> = graph
                .dependencies(&task_id)
                .into_iter()
                .filter_map(|dep| hashes.get(&dep).cloned())
                .collect();
            dependency_hashes.sort_unstable();

            let cli_arguments = cli_arguments.get(&task_id).map(Vec::as_slice).unwrap_or(&[]);

            let inputs = TaskHashInputs {
                global_hash: &self.global_hash,
                package: task_id.package(),
                task: task_id.task(),
                input_file_hashes: &input_file_hashes,
                env_vars: &env_vars,
                pass_through_env_names: &pass_through_names,
                resolved_definition: definition,
                cli_arguments,
                dependency_hashes: &dependency_hashes,
            };
            let hash = inputs.hash();
            tracing::debug!(task = %task_id, hash = %hash, "computed task hash");

            self.tracker.insert(
                task_id.clone(),
                TaskHashRecord {
                    hash: hash.clone(),
                    input_file_hashes,
                    env_vars: env_vars.clone(),
                    framework: framework.map(|f| f.slug().to_string()),
                    expanded_outputs: Vec::new(),
                },
            );
            hashes.insert(task_id, hash);
        }

        Ok(hashes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition() -> TaskDefinition {
        TaskDefinition::default()
    }

    #[test]
    fn identical_inputs_hash_identically() {
        let empty = BTreeMap::new();
        let def = definition();
        let a = TaskHashInputs {
            global_hash: "abc",
            package: "web",
            task: "build",
            input_file_hashes: &empty,
            env_vars: &empty,
            pass_through_env_names: &[],
            resolved_definition: &def,
            cli_arguments: &[],
            dependency_hashes: &[],
        };
        let b = TaskHashInputs {
            global_hash: "abc",
            package: "web",
            task: "build",
            input_file_hashes: &empty,
            env_vars: &empty,
            pass_through_env_names: &[],
            resolved_definition: &def,
            cli_arguments: &[],
            dependency_hashes: &[],
        };
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn different_global_hash_changes_task_hash() {
        let empty = BTreeMap::new();
        let def = definition();
        let mut a = TaskHashInputs {
            global_hash: "abc",
            package: "web",
            task: "build",
            input_file_hashes: &empty,
            env_vars: &empty,
            pass_through_env_names: &[],
            resolved_definition: &def,
            cli_arguments: &[],
            dependency_hashes: &[],
        };
        let first = a.hash();
        a.global_hash = "def";
        assert_ne!(first, a.hash());
    }

    #[test]
    fn dependency_hash_change_propagates() {
        let empty = BTreeMap::new();
        let def = definition();
        let mut inputs = TaskHashInputs {
            global_hash: "abc",
            package: "web",
            task: "build",
            input_file_hashes: &empty,
            env_vars: &empty,
            pass_through_env_names: &[],
            resolved_definition: &def,
            cli_arguments: &[],
            dependency_hashes: &[],
        };
        let before = inputs.hash();
        let deps = vec!["newhash".to_string()];
        inputs.dependency_hashes = &deps;
        assert_ne!(before, inputs.hash());
    }

    #[test]
    fn env_var_value_change_propagates() {
        let empty_defs = definition();
        let empty = BTreeMap::new();
        let mut env_a = BTreeMap::new();
        env_a.insert("NODE_ENV".to_string(), "development".to_string());
        let mut env_b = BTreeMap::new();
        env_b.insert("NODE_ENV".to_string(), "production".to_string());

        let a = TaskHashInputs {
            global_hash: "abc",
            package: "web",
            task: "build",
            input_file_hashes: &empty,
            env_vars: &env_a,
            pass_through_env_names: &[],
            resolved_definition: &empty_defs,
            cli_arguments: &[],
            dependency_hashes: &[],
        };
        let b = TaskHashInputs {
            env_vars: &env_b,
            ..a
        };
        assert_ne!(a.hash(), b.hash());
    }

    #[test]
    fn detected_framework_env_wildcards_are_folded_into_the_hash() {
        use turbopath::AbsoluteSystemPathBuf;
        use turborepo_engine::EngineBuilder;
        use turborepo_graph::WorkspaceGraph;
        use turborepo_task_id::{PackageName, TaskName};
        use turborepo_turbo_json::TurboJson;

        let repo_root = AbsoluteSystemPathBuf::new(if cfg!(windows) { "C:\\repo" } else { "/repo" }).unwrap();
        let workspace_graph =
            WorkspaceGraph::build(vec![(PackageName::new("web"), Vec::new())]).unwrap();
        let root_turbo_json = TurboJson::parse("turbo.json", r#"{"tasks":{"build":{}}}"#).unwrap();
        let package_turbo_jsons = HashMap::new();
        let graph = EngineBuilder::new(&workspace_graph, &root_turbo_json, &package_turbo_jsons, false)
            .build(&[PackageName::new("web")], &[TaskName::new("build")])
            .unwrap();

        let mut package_paths = HashMap::new();
        package_paths.insert("web".to_string(), turbopath::AnchoredSystemPathBuf::from_raw(""));

        let mut env = BTreeMap::new();
        env.insert("NEXT_PUBLIC_API".to_string(), "x".to_string());

        let scm = turborepo_scm::Manual;

        let mut package_dependency_names = HashMap::new();
        package_dependency_names.insert("web".to_string(), vec!["next".to_string()]);
        let with_framework = TaskHasher::new(
            &scm,
            repo_root.as_path(),
            &package_paths,
            &package_dependency_names,
            "globalhash".to_string(),
            EnvMode::Loose,
            false,
            true,
            env.clone(),
        );
        with_framework.hash_all(&graph, &HashMap::new()).unwrap();
        let with_record = with_framework
            .tracker()
            .get(&TaskId::new("web", "build"))
            .unwrap();
        assert_eq!(with_record.framework, Some("nextjs".to_string()));
        assert!(with_record.env_vars.contains_key("NEXT_PUBLIC_API"));

        let without_package_dependency_names = HashMap::new();
        let without_framework = TaskHasher::new(
            &scm,
            repo_root.as_path(),
            &package_paths,
            &without_package_dependency_names,
            "globalhash".to_string(),
            EnvMode::Loose,
            false,
            true,
            env,
        );
        without_framework.hash_all(&graph, &HashMap::new()).unwrap();
        let without_record = without_framework
            .tracker()
            .get(&TaskId::new("web", "build"))
            .unwrap();
        assert_eq!(without_record.framework, None);
        assert_ne!(with_record.hash, without_record.hash);
    }
}
