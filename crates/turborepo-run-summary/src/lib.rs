//! The run summary: everything captured about one invocation, assembled
//! once a run (or a `--dry-run` walk) finishes, and rendered either as the
//! two-table human-readable report or as the JSON shape persisted under
//! `.turbo/runs/<id>.json` when `--summarize` is passed.

mod execution;
mod global_hash;
mod scm;
mod task;

use std::fmt::Write as _;

pub use execution::ExecutionSummary;
pub use global_hash::GlobalHashSummary;
pub use scm::{ScmKind, ScmState};
use serde::Serialize;
use svix_ksuid::{Ksuid, KsuidLike};
use thiserror::Error;
use turbopath::AbsoluteSystemPath;
use turborepo_task_hash::EnvMode;
pub use task::{
    CacheSource, CacheStatus, SharedTaskSummary, SinglePackageTaskSummary, TaskCacheSummary,
    TaskEnvConfiguration, TaskEnvVarSummary, TaskSummary, TaskSummaryFactory,
};

/// The schema version embedded in a persisted run summary. Bumped whenever
/// the JSON shape changes in a way a consumer would need to branch on.
pub const SCHEMA_VERSION: &str = "0";

#[derive(Debug, Error)]
pub enum RunSummaryError {
    #[error("failed to write run summary: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize run summary: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to write run summary: {0}")]
    Path(#[from] turbopath::PathError),
}

/// How a run's tasks are reported: a monorepo keeps each entry
/// package-qualified, a single-package repo drops the qualification since
/// there is only ever one package to report.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum TaskSummaries {
    Monorepo(Vec<TaskSummary>),
    SinglePackage(Vec<SinglePackageTaskSummary>),
}

impl TaskSummaries {
    pub fn len(&self) -> usize {
        match self {
            Self::Monorepo(tasks) => tasks.len(),
            Self::SinglePackage(tasks) => tasks.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub id: String,
    pub version: &'static str,
    pub turbo_version: String,
    pub global_cache_inputs: GlobalHashSummary,
    pub env_mode: EnvMode,
    pub framework_inference: bool,
    pub tasks: TaskSummaries,
    pub user: String,
    pub scm: ScmState,
}

impl RunSummary {
    /// A fresh [`Ksuid`]-derived id: lexically sortable by creation time, so
    /// `.turbo/runs/` listings come back in run order for free.
    pub fn new_id() -> String {
        Ksuid::new(None, None).to_string()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: String,
        turbo_version: String,
        global_cache_inputs: GlobalHashSummary,
        env_mode: EnvMode,
        framework_inference: bool,
        tasks: TaskSummaries,
        user: String,
        scm: ScmState,
    ) -> Self {
        Self {
            id,
            version: SCHEMA_VERSION,
            turbo_version,
            global_cache_inputs,
            env_mode,
            framework_inference,
            tasks,
            user,
            scm,
        }
    }

    /// Where this summary is persisted for a given repo root, per
    /// `--summarize`'s documented location.
    pub fn path(repo_root: &AbsoluteSystemPath, id: &str) -> turbopath::AbsoluteSystemPathBuf {
        repo_root
            .join_component(".turbo")
            .join_component("runs")
            .join_component(&format!("{id}.json"))
    }

    /// Serializes and writes this summary to its `.turbo/runs/<id>.json`
    /// path, creating the `runs` directory if it doesn't exist yet.
    pub fn save(&self, repo_root: &AbsoluteSystemPath) -> Result<(), RunSummaryError> {
        let path = Self::path(repo_root, &self.id);
        if let Some(parent) = path.as_path().parent() {
            parent.to_owned().create_dir_all()?;
        }
        let json = serde_json::to_vec_pretty(self)?;
        path.as_path().create_with_contents(&json)?;
        Ok(())
    }

    /// Renders the two-table plain-text report: a global hash inputs block
    /// followed by one row per task. No color or terminal UI dependency,
    /// since nothing downstream of this consumes an interactive rendering.
    pub fn render_text(&self, execution: &ExecutionSummary) -> String {
        let mut out = String::new();

        writeln!(out, "Global Hash Inputs").ok();
        writeln!(out, "  Global Cache Key    = {}", self.global_cache_inputs.root_key).ok();
        writeln!(
            out,
            "  External Dependencies Hash = {}",
            self.global_cache_inputs.hash_of_external_dependencies
        )
        .ok();
        writeln!(
            out,
            "  Global Env Vars     = {}",
            self.global_cache_inputs.environment_variables.configured.join(", ")
        )
        .ok();
        writeln!(out).ok();

        writeln!(out, "Tasks to Run").ok();
        match &self.tasks {
            TaskSummaries::Monorepo(tasks) => {
                for task in tasks {
                    write_task_row(&mut out, &task.task_id.to_string(), &task.shared);
                }
            }
            TaskSummaries::SinglePackage(tasks) => {
                for task in tasks {
                    write_task_row(&mut out, &task.task, &task.shared);
                }
            }
        }
        writeln!(out).ok();

        writeln!(
            out,
            "Tasks:    {} successful, {} total",
            execution.success, execution.attempted
        )
        .ok();
        writeln!(out, "Cached:    {} cached, {} total", execution.cached, execution.attempted).ok();
        writeln!(out, "Time:    {}ms{}", execution.duration.as_millis(), if execution.full_turbo() {
            " >>> FULL TURBO"
        } else {
            ""
        })
        .ok();

        out
    }
}

fn write_task_row<T>(out: &mut String, label: &str, shared: &SharedTaskSummary<T>) {
    let status = match shared.cache.status {
        task::CacheStatus::Hit => "cache hit",
        task::CacheStatus::Miss => "cache miss",
    };
    writeln!(
        out,
        "  {label}\n    hash = {}, {status}, command = {}",
        shared.hash, shared.command
    )
    .ok();
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, time::Duration};

    use turborepo_task_hash::GlobalHashInputs;

    use super::*;

    fn global() -> GlobalHashSummary {
        GlobalHashSummary::new(&GlobalHashInputs {
            global_cache_key: "task-runner-core@1",
            global_file_hashes: BTreeMap::new(),
            root_external_deps_hash: "deadbeef".to_string(),
            env_vars: BTreeMap::new(),
            pass_through_env: None,
            env_mode: EnvMode::Loose,
            framework_inference: false,
        })
    }

    #[test]
    fn new_id_is_unique_each_call() {
        assert_ne!(RunSummary::new_id(), RunSummary::new_id());
    }

    #[test]
    fn path_lands_under_turbo_runs() {
        let root = AbsoluteSystemPath::new(if cfg!(windows) { "C:\\repo" } else { "/repo" });
        let path = RunSummary::path(root, "abc123");
        assert!(path.to_string().ends_with(".turbo/runs/abc123.json") || path.to_string().ends_with(".turbo\\runs\\abc123.json"));
    }

    #[test]
    fn render_text_reports_full_turbo_when_everything_cached() {
        let summary = RunSummary::new(
            "abc123".to_string(),
            "1.0.0".to_string(),
            global(),
            EnvMode::Loose,
            false,
            TaskSummaries::SinglePackage(Vec::new()),
            "tester".to_string(),
            ScmState {
                kind: ScmKind::Git,
                sha: None,
                branch: None,
            },
        );
        let execution = ExecutionSummary {
            attempted: 1,
            cached: 1,
            failed: 0,
            success: 1,
            duration: Duration::from_millis(5),
        };
        let text = summary.render_text(&execution);
        assert!(text.contains("FULL TURBO"));
    }
}
