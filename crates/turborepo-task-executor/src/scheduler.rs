//! Walks the task graph with bounded concurrency, releasing each task the
//! moment every task it depends on has finished, and stopping early (without
//! starting anything new) the moment a failure trips continue-on-error off.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};

use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::Semaphore;
use turbopath::AbsoluteSystemPathBuf;
use turborepo_cache::TaskCache;
use turborepo_engine::TaskGraph;
use turborepo_process::ProcessManager;
use turborepo_task_hash::{
    pass_through_names, resolve_env_mode, EnvMode, TaskHashTracker, STRICT_MODE_ALLOWLIST,
};
use turborepo_task_id::TaskId;
use turborepo_turbo_json::TaskDefinition;

use crate::{
    exec::TaskRun,
    package::PackageInfo,
    result::{TaskOutcome, TaskResult},
};

/// The handful of CLI-level knobs that shape how a run is scheduled, as
/// opposed to what each task itself does.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Max tasks running at once. `0` means unbounded.
    pub concurrency: usize,
    pub continue_on_error: bool,
    pub env_mode: EnvMode,
    pub pass_through_declared_anywhere: bool,
    pub cli_arguments: HashMap<TaskId<'static>, Vec<String>>,
    /// `--force` / `TURBO_FORCE`: skip the cache-read check entirely, every
    /// task executes regardless of a prior hit.
    pub force: bool,
    /// `--no-cache`: run tasks normally but never write results back.
    pub no_cache: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency: 10,
            continue_on_error: false,
            env_mode: EnvMode::Infer,
            pass_through_declared_anywhere: false,
            cli_arguments: HashMap::new(),
            force: false,
            no_cache: false,
        }
    }
}

pub struct Scheduler<'a> {
    graph: &'a TaskGraph,
    hashes: &'a HashMap<TaskId<'static>, String>,
    hash_tracker: &'a TaskHashTracker,
    packages: &'a HashMap<String, PackageInfo>,
    repo_root: AbsoluteSystemPathBuf,
    cache: Arc<TaskCache>,
    process_manager: ProcessManager,
    env_snapshot: BTreeMap<String, String>,
    options: RunOptions,
}

impl<'a> Scheduler<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        graph: &'a TaskGraph,
        hashes: &'a HashMap<TaskId<'static>, String>,
        hash_tracker: &'a TaskHashTracker,
        packages: &'a HashMap<String, PackageInfo>,
        repo_root: AbsoluteSystemPathBuf,
        cache: Arc<TaskCache>,
        process_manager: ProcessManager,
        env_snapshot: BTreeMap<String, String>,
        options: RunOptions,
    ) -> Self {
        Self {
            graph,
            hashes,
            hash_tracker,
            packages,
            repo_root,
            cache,
            process_manager,
            env_snapshot,
            options,
        }
    }

    /// Runs every task in the graph to completion (or to however far it gets
    /// before continue-on-error trips), returning one result per task that
    /// was at least attempted or explicitly skipped.
    pub async fn run(self) -> Vec<TaskResult> {
        let order = self.graph.task_order();
        let position: HashMap<TaskId<'static>, usize> = order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i))
            .collect();

        let mut remaining_deps: HashMap<TaskId<'static>, usize> = HashMap::new();
        let mut dependents: HashMap<TaskId<'static>, Vec<TaskId<'static>>> = HashMap::new();
        for id in &order {
            remaining_deps.insert(id.clone(), self.graph.dependencies(id).len());
            for dep in self.graph.dependencies(id) {
                dependents.entry(dep).or_default().push(id.clone());
            }
        }

        let mut ready: BTreeSet<(usize, TaskId<'static>)> = order
            .iter()
            .filter(|id| remaining_deps[*id] == 0)
            .map(|id| (position[id], id.clone()))
            .collect();

        let permits = if self.options.concurrency == 0 {
            Semaphore::MAX_PERMITS
        } else {
            self.options.concurrency
        };
        let semaphore = Arc::new(Semaphore::new(permits));
        let stopped = Arc::new(AtomicBool::new(false));

        let mut in_flight = FuturesUnordered::new();
        let mut results = Vec::new();

        loop {
            while !stopped.load(Ordering::Acquire) {
                let Some(next) = ready.iter().next().cloned() else {
                    break;
                };
                let permit = match semaphore.clone().try_acquire_owned() {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                ready.remove(&next);
                let (_, task_id) = next;

                let run = self.build_run(&task_id);
                in_flight.push(tokio::spawn(async move {
                    let _permit = permit;
                    let result = match run {
                        Some(run) => run.run().await,
                        None => TaskResult {
                            task_id: task_id.clone(),
                            hash: String::new(),
                            outcome: TaskOutcome::Skipped,
                            duration: Duration::ZERO,
                        },
                    };
                    (task_id, result)
                }));
            }

            if stopped.load(Ordering::Acquire) && in_flight.is_empty() {
                for (_, task_id) in ready {
                    results.push(TaskResult {
                        hash: self.hashes.get(&task_id).cloned().unwrap_or_default(),
                        task_id,
                        outcome: TaskOutcome::Skipped,
                        duration: Duration::ZERO,
                    });
                }
                break;
            }

            match in_flight.next().await {
                Some(Ok((task_id, result))) => {
                    let failed = result.outcome.is_failure();
                    results.push(result);

                    if failed && !self.options.continue_on_error {
                        stopped.store(true, Ordering::Release);
                        self.process_manager.stop().await;
                    }

                    if !stopped.load(Ordering::Acquire) {
                        if let Some(dependents) = dependents.get(&task_id) {
                            for dependent in dependents {
                                if let Some(counter) = remaining_deps.get_mut(dependent) {
                                    *counter -= 1;
                                    if *counter == 0 {
                                        ready.insert((position[dependent], dependent.clone()));
                                    }
                                }
                            }
                        }
                    }
                }
                Some(Err(join_err)) => {
                    tracing::error!("task executor panicked: {join_err}");
                }
                None => {
                    if ready.is_empty() {
                        break;
                    }
                }
            }
        }

        results
    }

    fn build_run(&self, task_id: &TaskId<'static>) -> Option<TaskRun> {
        let definition = self.graph.definition(task_id)?.clone();
        let package = self.packages.get(task_id.package())?;
        let command = package.script(task_id.task())?.to_string();
        let hash = self.hashes.get(task_id)?.clone();

        let env_mode = resolve_env_mode(
            self.options.env_mode,
            self.options.pass_through_declared_anywhere,
        );
        let declared = self
            .hash_tracker
            .get(task_id)
            .map(|record| record.env_vars)
            .unwrap_or_default();
        let (env_clear, env) = resolve_execution_env(env_mode, &definition, &declared, &self.env_snapshot);

        let prefix = if task_id.is_root_task() {
            format!("{}: ", task_id.task())
        } else {
            format!("{}:{}: ", task_id.package(), task_id.task())
        };

        Some(TaskRun {
            task_id: task_id.clone(),
            hash,
            definition,
            repo_root: self.repo_root.clone(),
            package_dir: package.dir.clone(),
            command,
            env_clear,
            env,
            cache: self.cache.clone(),
            process_manager: self.process_manager.clone(),
            prefix,
            force: self.options.force,
            no_cache: self.options.no_cache,
        })
    }
}

/// Decides what a task's child process actually sees. `strict` starts from
/// a cleared environment and adds back only the declared/pass-through names;
/// `loose`/`infer` (already resolved to one or the other by the time this
/// runs) inherit the parent process's environment untouched.
fn resolve_execution_env(
    mode: EnvMode,
    definition: &TaskDefinition,
    declared: &BTreeMap<String, String>,
    snapshot: &BTreeMap<String, String>,
) -> (bool, BTreeMap<String, String>) {
    if mode != EnvMode::Strict {
        return (false, BTreeMap::new());
    }

    let mut env = declared.clone();
    let pass_through = pass_through_names(mode, definition.pass_through_env.as_deref());
    let mut allowed: Vec<&str> = STRICT_MODE_ALLOWLIST.to_vec();
    allowed.extend(pass_through.iter().map(String::as_str));
    for name in allowed {
        if let Some(value) = snapshot.get(name) {
            env.insert(name.to_string(), value.clone());
        }
    }
    (true, env)
}
