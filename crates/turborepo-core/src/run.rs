//! Wires every other crate together into one run: build the task graph,
//! hash every task, spin up the cache, then either walk it for real or
//! project what a real walk would do.

use std::collections::{BTreeMap, HashMap};

use turbopath::AbsoluteSystemPathBuf;
use turborepo_cache::{CacheOpts, TaskCache};
use turborepo_engine::{EngineBuilder, TaskGraph};
use turborepo_process::ProcessManager;
use turborepo_run_summary::{
    ExecutionSummary, GlobalHashSummary, RunSummary, RunSummaryError, ScmState, TaskSummaries,
    TaskSummaryFactory,
};
use turborepo_scm::Scm;
use turborepo_task_executor::{
    DryRunWalker, PackageInfo, RunOptions as SchedulerOptions, Scheduler, TaskOutcome, TaskResult,
};
use turborepo_task_hash::{hash_env_value, EnvMode, TaskHashTracker, TaskHasher};
use turborepo_task_id::{PackageName, TaskId, TaskName};
use turborepo_turbo_json::TurboJson;

use crate::{
    error::RunError,
    global_hash::resolve_global_hash_inputs,
    options::{DryRunMode, RunOptions},
    workspace::{Package, Workspace},
};

const CORE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Everything one invocation produced, whether it actually ran tasks or
/// only projected what running them would do.
pub struct RunOutcome {
    pub exit_code: i32,
    pub summary: RunSummary,
    pub execution: ExecutionSummary,
}

impl RunOutcome {
    pub fn render_text(&self) -> String {
        self.summary.render_text(&self.execution)
    }

    pub fn render_json(&self) -> Result<String, RunError> {
        serde_json::to_string_pretty(&self.summary)
            .map_err(RunSummaryError::from)
            .map_err(RunError::from)
    }
}

/// A fully built, hashed run, ready to either execute or dry-run.
pub struct Run {
    repo_root: AbsoluteSystemPathBuf,
    graph: TaskGraph,
    hashes: HashMap<TaskId<'static>, String>,
    hash_tracker: TaskHashTracker,
    packages: HashMap<String, PackageInfo>,
    scm: Box<dyn Scm>,
    cache: std::sync::Arc<TaskCache>,
    env_snapshot: BTreeMap<String, String>,
    global_summary: GlobalHashSummary,
    hash_of_external_dependencies: String,
    env_mode: EnvMode,
    pass_through_declared_anywhere: bool,
    options: RunOptions,
}

impl Run {
    /// Builds and hashes the task graph for one invocation. Nothing is
    /// executed yet: a caller decides afterward whether to [`Run::execute`]
    /// or [`Run::dry_run`].
    pub fn build(
        repo_root: AbsoluteSystemPathBuf,
        root_turbo_json: &TurboJson,
        packages: Vec<Package>,
        env_snapshot: BTreeMap<String, String>,
        options: RunOptions,
    ) -> Result<Self, RunError> {
        let workspace = Workspace::build(repo_root.as_path(), &packages)?;

        let entry_packages = resolve_entry_packages(&workspace, &options)?;
        let tasks: Vec<TaskName<'static>> = options
            .tasks
            .iter()
            .map(|name| TaskName::from(name.clone()))
            .collect();

        let graph = EngineBuilder::new(
            &workspace.graph,
            root_turbo_json,
            &workspace.package_turbo_jsons,
            options.single_package,
        )
        .with_parallel(options.parallel)
        .with_only(options.only)
        .build(&entry_packages, &tasks)?;

        let scm = turborepo_scm::detect(repo_root.as_path());

        let pass_through_declared_anywhere = graph
            .task_ids()
            .filter_map(|id| graph.definition(id))
            .any(|def| def.pass_through_env.is_some());

        let root_external_deps_hash = combine_external_deps_hashes(&packages);

        let raw_global_inputs = root_turbo_json.global_hash_inputs();
        let global_inputs = resolve_global_hash_inputs(
            scm.as_ref(),
            repo_root.as_path(),
            &raw_global_inputs,
            root_external_deps_hash.clone(),
            &env_snapshot,
            options.env_mode,
            pass_through_declared_anywhere,
            options.framework_inference,
        )?;
        let global_hash = global_inputs.hash();
        let env_mode = global_inputs.env_mode;
        let global_summary = GlobalHashSummary::new(&global_inputs);

        let hasher = TaskHasher::new(
            scm.as_ref(),
            repo_root.as_path(),
            &workspace.package_paths,
            &workspace.package_dependency_names,
            global_hash,
            env_mode,
            pass_through_declared_anywhere,
            options.framework_inference,
            env_snapshot.clone(),
        );
        let hashes = hasher.hash_all(&graph, &options.cli_arguments)?;

        let hash_tracker = TaskHashTracker::new();
        for task_id in graph.task_order() {
            if let Some(record) = hasher.tracker().get(&task_id) {
                hash_tracker.insert(task_id, record);
            }
        }

        let mut cache_opts = CacheOpts::default();
        if let Some(dir) = &options.cache_dir {
            cache_opts.cache_dir = dir.clone();
        }
        cache_opts.skip_remote = true;
        cache_opts.skip_filesystem = options.remote_only;
        let cache = std::sync::Arc::new(TaskCache::new(
            cache_opts,
            repo_root.as_path(),
            None,
            reqwest::Client::new(),
        )?);

        Ok(Self {
            repo_root,
            graph,
            hashes,
            hash_tracker,
            packages: workspace.packages,
            scm,
            cache,
            env_snapshot,
            global_summary,
            hash_of_external_dependencies: root_external_deps_hash,
            env_mode,
            pass_through_declared_anywhere,
            options,
        })
    }

    /// Runs every task to completion with bounded concurrency, logging a
    /// stable status line per task as results come back.
    pub async fn execute(self) -> Result<RunOutcome, RunError> {
        let scheduler_options = SchedulerOptions {
            concurrency: self.options.concurrency,
            continue_on_error: self.options.continue_on_error,
            env_mode: self.env_mode,
            pass_through_declared_anywhere: self.pass_through_declared_anywhere,
            cli_arguments: self.options.cli_arguments.clone(),
            force: self.options.force,
            no_cache: self.options.no_cache,
        };

        let scheduler = Scheduler::new(
            &self.graph,
            &self.hashes,
            &self.hash_tracker,
            &self.packages,
            self.repo_root.clone(),
            self.cache.clone(),
            ProcessManager::new(),
            self.env_snapshot.clone(),
            scheduler_options,
        );
        let results = scheduler.run().await;

        for result in &results {
            log_task_line(result, self.options.force);
        }

        let execution = ExecutionSummary::tally(&results);
        let exit_code = aggregate_exit_code(&results);
        let summary = self.build_summary(&results);

        if self.options.summarize {
            summary.save(self.repo_root.as_path())?;
        }

        Ok(RunOutcome {
            exit_code,
            summary,
            execution,
        })
    }

    /// Projects what a real run would do without spawning anything: asks
    /// the cache whether each task's hash already exists.
    pub fn dry_run(&self) -> Result<RunOutcome, RunError> {
        let results = DryRunWalker::new(&self.graph, &self.hashes, &self.cache).walk();
        let execution = ExecutionSummary::tally(&results);
        let summary = self.build_summary(&results);
        Ok(RunOutcome {
            exit_code: 0,
            summary,
            execution,
        })
    }

    pub fn dry_run_mode(&self) -> Option<DryRunMode> {
        self.options.dry_run
    }

    fn build_summary(&self, results: &[TaskResult]) -> RunSummary {
        let outcomes: HashMap<TaskId<'static>, &TaskOutcome> = results
            .iter()
            .map(|r| (r.task_id.clone(), &r.outcome))
            .collect();

        let factory = TaskSummaryFactory {
            graph: &self.graph,
            tracker: &self.hash_tracker,
            packages: &self.packages,
            repo_root: self.repo_root.as_path(),
            hash_of_external_dependencies: &self.hash_of_external_dependencies,
            env_mode: self.env_mode,
        };

        let mut task_summaries = Vec::new();
        for task_id in self.graph.task_order() {
            let cli_arguments = self
                .options
                .cli_arguments
                .get(&task_id)
                .map(Vec::as_slice)
                .unwrap_or(&[]);
            if let Some(summary) =
                factory.task_summary(&task_id, cli_arguments, outcomes.get(&task_id).copied())
            {
                task_summaries.push(summary);
            }
        }

        let tasks = if self.options.single_package {
            TaskSummaries::SinglePackage(
                task_summaries.into_iter().map(Into::into).collect(),
            )
        } else {
            TaskSummaries::Monorepo(task_summaries)
        };

        let scm_state = ScmState::get(self.scm.as_ref(), self.repo_root.as_path());
        let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());

        RunSummary::new(
            RunSummary::new_id(),
            CORE_VERSION.to_string(),
            self.global_summary.clone(),
            self.env_mode,
            self.options.framework_inference,
            tasks,
            user,
            scm_state,
        )
    }
}

fn resolve_entry_packages(workspace: &Workspace, options: &RunOptions) -> Result<Vec<PackageName>, RunError> {
    if options.filter.is_empty() {
        return Ok(workspace
            .packages
            .keys()
            .map(|name| PackageName::new(name.as_str()))
            .collect());
    }

    options
        .filter
        .iter()
        .map(|name| {
            let package = PackageName::new(name.as_str());
            if workspace.graph.contains(&package) {
                Ok(package)
            } else {
                Err(RunError::UnknownFilterPackage(name.clone()))
            }
        })
        .collect()
}

/// Folds every package's external-dependency hash into one value so a
/// change anywhere in the workspace's external dependency graph invalidates
/// every task's global hash, the same way a change to `global.dependencies`
/// does.
fn combine_external_deps_hashes(packages: &[Package]) -> String {
    let mut hashes: Vec<&str> = packages
        .iter()
        .map(|p| p.external_deps_hash.as_str())
        .collect();
    hashes.sort_unstable();
    hash_env_value(&hashes.join("\0"))
}

/// The aggregate exit code for a run: zero if nothing failed, otherwise the
/// largest exit code any failed task reported (or `1` if a failure didn't
/// carry one, e.g. a process that couldn't be spawned at all).
fn aggregate_exit_code(results: &[TaskResult]) -> i32 {
    results
        .iter()
        .filter_map(|r| match &r.outcome {
            TaskOutcome::Failure { exit_code, .. } => Some(exit_code.unwrap_or(1)),
            _ => None,
        })
        .max()
        .unwrap_or(0)
}

fn log_task_line(result: &TaskResult, force: bool) {
    let package = result.task_id.package();
    let task = result.task_id.task();
    match &result.outcome {
        TaskOutcome::CacheHit { .. } => {
            tracing::info!("{package}:{task}: cache hit, replaying output {}", result.hash);
        }
        TaskOutcome::Success if force => {
            tracing::info!("{package}:{task}: cache bypass, force executing {}", result.hash);
        }
        TaskOutcome::Success => {
            tracing::info!("{package}:{task}: cache miss, executing {}", result.hash);
        }
        TaskOutcome::Failure { message, .. } => {
            tracing::error!("{package}:{task}: {message}");
        }
        TaskOutcome::Skipped => {
            tracing::warn!("{package}:{task}: skipped");
        }
        TaskOutcome::WouldRun => {
            tracing::info!("{package}:{task}: cache miss, would run {}", result.hash);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use turbopath::AbsoluteSystemPathBuf;
    use turborepo_turbo_json::TurboJson;

    use super::*;

    fn repo_root() -> (tempfile::TempDir, AbsoluteSystemPathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let root = AbsoluteSystemPathBuf::new(dir.path().to_str().unwrap().to_string()).unwrap();
        (dir, root)
    }

    fn options_for(tasks: &[&str]) -> RunOptions {
        RunOptions {
            tasks: tasks.iter().map(|t| t.to_string()).collect(),
            single_package: true,
            ..RunOptions::default()
        }
    }

    #[tokio::test]
    async fn a_single_package_build_executes_and_reports_success() {
        let (_tmp, root) = repo_root();
        root.as_path().create_dir_all().unwrap();

        let mut scripts = HashMap::new();
        scripts.insert("build".to_string(), "echo hi > out.txt".to_string());
        let packages = vec![Package::new(PackageName::root(), root.clone()).with_scripts(scripts)];

        let root_turbo_json =
            TurboJson::parse("turbo.json", r#"{"tasks":{"build":{"outputs":["out.txt"]}}}"#).unwrap();

        let run = Run::build(
            root.clone(),
            &root_turbo_json,
            packages,
            BTreeMap::new(),
            options_for(&["build"]),
        )
        .unwrap();

        let outcome = run.execute().await.unwrap();
        assert_eq!(outcome.exit_code, 0);
        assert_eq!(outcome.execution.success, 1);
    }

    #[test]
    fn dry_run_never_spawns_anything() {
        let (_tmp, root) = repo_root();
        root.as_path().create_dir_all().unwrap();

        let mut scripts = HashMap::new();
        scripts.insert("build".to_string(), "echo hi > out.txt".to_string());
        let packages = vec![Package::new(PackageName::root(), root.clone()).with_scripts(scripts)];

        let root_turbo_json =
            TurboJson::parse("turbo.json", r#"{"tasks":{"build":{"outputs":["out.txt"]}}}"#).unwrap();

        let run = Run::build(
            root.clone(),
            &root_turbo_json,
            packages,
            BTreeMap::new(),
            options_for(&["build"]),
        )
        .unwrap();

        let outcome = run.dry_run().unwrap();
        assert_eq!(outcome.exit_code, 0);
        assert!(!root.join_component("out.txt").as_path().exists());
    }

    #[test]
    fn unknown_filter_package_is_rejected() {
        let (_tmp, root) = repo_root();
        root.as_path().create_dir_all().unwrap();
        let packages = vec![Package::new(PackageName::new("web"), root.clone())];
        let root_turbo_json = TurboJson::parse("turbo.json", r#"{"tasks":{"build":{}}}"#).unwrap();

        let mut options = options_for(&["build"]);
        options.single_package = false;
        options.filter = vec!["missing".to_string()];

        let err = Run::build(root, &root_turbo_json, packages, BTreeMap::new(), options).unwrap_err();
        assert!(matches!(err, RunError::UnknownFilterPackage(_)));
    }
}
