//! The CLI-facing knobs a run is configured with. Flag parsing itself lives
//! upstream of this crate; a caller hands in an already-parsed [`RunOptions`]
//! built from whatever argument parser it uses.

use std::collections::HashMap;

use turborepo_task_hash::EnvMode;
use turborepo_task_id::TaskId;

/// `--dry[=text|=json]`. Bare `--dry` (no value) means [`DryRunMode::Text`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DryRunMode {
    Text,
    Json,
}

/// `--log-prefix`. `Auto` prefixes lines with `pkg:task: ` for every
/// multi-package run and omits it for a single package; `Task` always
/// prefixes; `None` never does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogPrefix {
    #[default]
    Auto,
    None,
    Task,
}

/// One invocation's worth of flags, per the `run` subcommand surface. Plain
/// fields only: nothing here parses `std::env::args` or a `clap::Parser`.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// The requested task names, e.g. `["build", "test"]`.
    pub tasks: Vec<String>,
    /// `--filter`: package names to use as task-graph entry points. Empty
    /// means every package in the workspace.
    pub filter: Vec<String>,
    /// `--concurrency`. `0` means unbounded.
    pub concurrency: usize,
    /// `--parallel`: run every selected task independent of its declared
    /// dependencies.
    pub parallel: bool,
    /// `--continue`.
    pub continue_on_error: bool,
    /// `--only`: restrict the graph to exactly the requested tasks, dropping
    /// dependency-only nodes that weren't themselves requested.
    pub only: bool,
    /// `--cache-dir`.
    pub cache_dir: Option<String>,
    /// `--output-logs` is carried per task by `TaskDefinition::output_logs`;
    /// this is the run-wide override applied when a task doesn't set one.
    pub output_logs: turborepo_turbo_json::OutputLogsMode,
    /// `--log-prefix`.
    pub log_prefix: LogPrefix,
    /// `--force`: `TURBO_FORCE=true`, bypass cache reads.
    pub force: bool,
    /// `--no-cache`: don't write to the cache either.
    pub no_cache: bool,
    /// `--remote-only`: `TURBO_REMOTE_ONLY=true`, skip the local filesystem
    /// cache entirely.
    pub remote_only: bool,
    /// `--dry[=text|=json]`.
    pub dry_run: Option<DryRunMode>,
    /// `--graph[=file]`: `Some(None)` means print to stdout, `Some(Some(p))`
    /// writes the dot graph to `p`.
    pub graph: Option<Option<String>>,
    /// `--env-mode`.
    pub env_mode: EnvMode,
    /// `--framework-inference`.
    pub framework_inference: bool,
    /// `--profile`: a chrome trace file path, unused by the core itself but
    /// threaded through so a caller can wire up tracing spans to it.
    pub profile: Option<String>,
    /// `--summarize`: write `.turbo/runs/<id>.json` when the run finishes.
    pub summarize: bool,
    /// Arguments forwarded after `--`, keyed per task.
    pub cli_arguments: HashMap<TaskId<'static>, Vec<String>>,
    /// `--single-package`: the repo under the root is the only package.
    pub single_package: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            tasks: Vec::new(),
            filter: Vec::new(),
            concurrency: 10,
            parallel: false,
            continue_on_error: false,
            only: false,
            cache_dir: None,
            output_logs: turborepo_turbo_json::OutputLogsMode::Full,
            log_prefix: LogPrefix::default(),
            force: false,
            no_cache: false,
            remote_only: false,
            dry_run: None,
            graph: None,
            env_mode: EnvMode::Infer,
            framework_inference: true,
            profile: None,
            summarize: false,
            cli_arguments: HashMap::new(),
            single_package: false,
        }
    }
}

impl RunOptions {
    /// `TURBO_FORCE=true` and `TURBO_REMOTE_ONLY=true` affect cache behavior
    /// the same way their corresponding flags do; a caller that reads them
    /// from the process environment folds them in here rather than this
    /// crate reading
    /// `std::env` itself.
    pub fn apply_env_overrides(mut self, force: bool, remote_only: bool) -> Self {
        self.force |= force;
        self.remote_only |= remote_only;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_concurrency() {
        assert_eq!(RunOptions::default().concurrency, 10);
    }

    #[test]
    fn env_overrides_are_additive() {
        let opts = RunOptions::default().apply_env_overrides(true, false);
        assert!(opts.force);
        assert!(!opts.remote_only);
    }
}
