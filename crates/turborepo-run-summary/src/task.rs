//! Per-task entries in a run summary: what ran, what it hashed to, whether
//! the cache answered for it, and where it sits in the dependency graph.
//! `TaskSummary` carries a fully-qualified `TaskId` for monorepo runs;
//! `SinglePackageTaskSummary` drops the package-qualification fields a
//! single-package repo has no use for.

use std::collections::{BTreeMap, HashMap};

use itertools::Itertools;
use serde::Serialize;
use turbopath::{AbsoluteSystemPath, AnchoredSystemPathBuf, RelativeUnixPathBuf};
use turborepo_engine::TaskGraph;
use turborepo_globwalk::split_negated;
use turborepo_task_executor::{PackageInfo, TaskOutcome};
use turborepo_task_hash::{EnvMode, TaskHashRecord, TaskHashTracker};
use turborepo_task_id::TaskId;
use turborepo_turbo_json::TaskDefinition;

#[derive(Debug, Serialize, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheStatus {
    Hit,
    Miss,
}

#[derive(Debug, Serialize, Copy, Clone, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum CacheSource {
    Local,
    Remote,
}

impl From<turborepo_cache::CacheSource> for CacheSource {
    fn from(value: turborepo_cache::CacheSource) -> Self {
        match value {
            turborepo_cache::CacheSource::Local => Self::Local,
            turborepo_cache::CacheSource::Remote => Self::Remote,
        }
    }
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TaskCacheSummary {
    pub status: CacheStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<CacheSource>,
    pub time_saved: u64,
}

impl TaskCacheSummary {
    pub fn miss() -> Self {
        Self {
            status: CacheStatus::Miss,
            source: None,
            time_saved: 0,
        }
    }

    pub fn from_outcome(outcome: &TaskOutcome) -> Self {
        match outcome {
            TaskOutcome::CacheHit { source, time_saved_ms } => Self {
                status: CacheStatus::Hit,
                source: Some(CacheSource::from(*source)),
                time_saved: *time_saved_ms,
            },
            _ => Self::miss(),
        }
    }
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TaskEnvConfiguration {
    pub env: Vec<String>,
    pub pass_through_env: Vec<String>,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TaskEnvVarSummary {
    pub specified: TaskEnvConfiguration,
    pub configured: Vec<String>,
    pub pass_through: Vec<String>,
}

impl TaskEnvVarSummary {
    fn new(definition: &TaskDefinition, record: &TaskHashRecord, env_mode: EnvMode) -> Self {
        let pass_through_env = definition.pass_through_env.clone().unwrap_or_default();
        Self {
            specified: TaskEnvConfiguration {
                env: definition.env.clone(),
                pass_through_env: pass_through_env.clone(),
            },
            configured: record.env_vars.keys().cloned().collect(),
            pass_through: turborepo_task_hash::pass_through_names(env_mode, Some(&pass_through_env)),
        }
    }
}

/// Fields shared between the monorepo and single-package summary shapes,
/// generic over how a dependency edge is spelled: a fully-qualified
/// [`TaskId`] in a monorepo, a bare task name in a single-package repo.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SharedTaskSummary<T> {
    pub hash: String,
    pub inputs: BTreeMap<RelativeUnixPathBuf, String>,
    pub hash_of_external_dependencies: String,
    pub cache: TaskCacheSummary,
    pub command: String,
    pub cli_arguments: Vec<String>,
    pub outputs: Vec<String>,
    pub excluded_outputs: Vec<String>,
    pub log_file: RelativeUnixPathBuf,
    pub expanded_outputs: Vec<RelativeUnixPathBuf>,
    pub dependencies: Vec<T>,
    pub dependents: Vec<T>,
    pub resolved_task_definition: TaskDefinition,
    pub framework: Option<String>,
    pub env_mode: EnvMode,
    pub environment_variables: TaskEnvVarSummary,
    pub dot_env: Vec<String>,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TaskSummary {
    pub task_id: TaskId<'static>,
    pub task: String,
    pub package: String,
    pub directory: AnchoredSystemPathBuf,
    #[serde(flatten)]
    pub shared: SharedTaskSummary<TaskId<'static>>,
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SinglePackageTaskSummary {
    pub task_id: String,
    pub task: String,
    #[serde(flatten)]
    pub shared: SharedTaskSummary<String>,
}

impl From<TaskSummary> for SinglePackageTaskSummary {
    fn from(value: TaskSummary) -> Self {
        Self {
            task_id: value.task.clone(),
            task: value.task,
            shared: value.shared.into(),
        }
    }
}

impl From<SharedTaskSummary<TaskId<'static>>> for SharedTaskSummary<String> {
    fn from(value: SharedTaskSummary<TaskId<'static>>) -> Self {
        let SharedTaskSummary {
            hash,
            inputs,
            hash_of_external_dependencies,
            cache,
            command,
            cli_arguments,
            outputs,
            excluded_outputs,
            log_file,
            expanded_outputs,
            dependencies,
            dependents,
            resolved_task_definition,
            framework,
            env_mode,
            environment_variables,
            dot_env,
        } = value;
        SharedTaskSummary {
            hash,
            inputs,
            hash_of_external_dependencies,
            cache,
            command,
            cli_arguments,
            outputs,
            excluded_outputs,
            log_file,
            expanded_outputs,
            dependencies: dependencies.into_iter().map(|id| id.task().to_string()).sorted().collect(),
            dependents: dependents.into_iter().map(|id| id.task().to_string()).sorted().collect(),
            resolved_task_definition,
            framework,
            env_mode,
            environment_variables,
            dot_env,
        }
    }
}

/// Assembles a [`TaskSummary`] from everything already computed for a task
/// elsewhere in a run: its place in the graph, its hash record, and (once
/// the scheduler has run it) its outcome.
pub struct TaskSummaryFactory<'a> {
    pub graph: &'a TaskGraph,
    pub tracker: &'a TaskHashTracker,
    pub packages: &'a HashMap<String, PackageInfo>,
    pub repo_root: &'a AbsoluteSystemPath,
    pub hash_of_external_dependencies: &'a str,
    pub env_mode: EnvMode,
}

impl<'a> TaskSummaryFactory<'a> {
    pub fn task_summary(
        &self,
        task_id: &TaskId<'static>,
        cli_arguments: &[String],
        outcome: Option<&TaskOutcome>,
    ) -> Option<TaskSummary> {
        let definition = self.graph.definition(task_id)?;
        let record = self.tracker.get(task_id)?;
        let package = self.packages.get(task_id.package())?;
        let command = package.script(task_id.task()).unwrap_or_default().to_string();
        let (included, excluded) = split_negated(&definition.outputs);

        let cache = outcome.map(TaskCacheSummary::from_outcome).unwrap_or_else(TaskCacheSummary::miss);
        let environment_variables = TaskEnvVarSummary::new(definition, &record, self.env_mode);
        let directory = self
            .repo_root
            .anchor(package.dir.as_path())
            .unwrap_or_default();

        Some(TaskSummary {
            task_id: task_id.clone(),
            task: task_id.task().to_string(),
            package: task_id.package().to_string(),
            directory,
            shared: SharedTaskSummary {
                hash: record.hash,
                inputs: record.input_file_hashes,
                hash_of_external_dependencies: self.hash_of_external_dependencies.to_string(),
                cache,
                command,
                cli_arguments: cli_arguments.to_vec(),
                outputs: included,
                excluded_outputs: excluded,
                log_file: RelativeUnixPathBuf::new_unchecked(format!(
                    "{}/.turbo/turbo-{}.log",
                    task_id.package(),
                    task_id.task()
                )),
                expanded_outputs: record.expanded_outputs,
                dependencies: self.graph.dependencies(task_id),
                dependents: self.graph.dependents(task_id),
                resolved_task_definition: definition.clone(),
                framework: record.framework,
                env_mode: self.env_mode,
                environment_variables,
                dot_env: definition.dot_env.clone(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_miss_has_no_source_and_zero_time_saved() {
        let miss = TaskCacheSummary::miss();
        assert_eq!(miss.status, CacheStatus::Miss);
        assert!(miss.source.is_none());
        assert_eq!(miss.time_saved, 0);
    }

    #[test]
    fn cache_hit_outcome_carries_source_through() {
        let outcome = TaskOutcome::CacheHit {
            source: turborepo_cache::CacheSource::Remote,
            time_saved_ms: 42,
        };
        let summary = TaskCacheSummary::from_outcome(&outcome);
        assert_eq!(summary.status, CacheStatus::Hit);
        assert_eq!(summary.source, Some(CacheSource::Remote));
        assert_eq!(summary.time_saved, 42);
    }
}
