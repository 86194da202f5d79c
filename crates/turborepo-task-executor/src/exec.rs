//! Runs a single task to completion: check the cache, and on a miss spawn
//! the package's script, capture its combined output, and write whatever it
//! produced back to the cache under the task's hash.

use std::{
    collections::BTreeMap,
    io::Write,
    sync::Arc,
    time::{Duration, Instant},
};

use turbopath::AbsoluteSystemPathBuf;
use turborepo_cache::TaskCache;
use turborepo_globwalk::{globwalk, split_negated, WalkType};
use turborepo_process::{ChildExit, Command, PrefixedWriter, ProcessManager};
use turborepo_task_id::TaskId;
use turborepo_turbo_json::{OutputLogsMode, TaskDefinition};

use crate::result::{TaskOutcome, TaskResult};

const STOP_TIMEOUT: Duration = Duration::from_millis(500);

/// Everything needed to run one task, already resolved: no further lookups
/// into the graph, the hash tracker, or workspace discovery happen once this
/// is built.
pub struct TaskRun {
    pub task_id: TaskId<'static>,
    pub hash: String,
    pub definition: TaskDefinition,
    pub repo_root: AbsoluteSystemPathBuf,
    pub package_dir: AbsoluteSystemPathBuf,
    pub command: String,
    pub env_clear: bool,
    pub env: BTreeMap<String, String>,
    pub cache: Arc<TaskCache>,
    pub process_manager: ProcessManager,
    pub prefix: String,
    pub force: bool,
    pub no_cache: bool,
}

impl TaskRun {
    pub async fn run(self) -> TaskResult {
        let started = Instant::now();

        if self.definition.cache && !self.force {
            if let Some(meta) = self.cache.exists(&self.hash) {
                if let Ok(Some(_)) = self.cache.fetch(&self.hash).await {
                    self.replay_log();
                    return self.finish(
                        TaskOutcome::CacheHit {
                            source: meta.source,
                            time_saved_ms: meta.time_saved,
                        },
                        started.elapsed(),
                    );
                }
            }
        }

        let outcome = match self.execute().await {
            Ok(()) => TaskOutcome::Success,
            Err((exit_code, message)) => TaskOutcome::Failure { exit_code, message },
        };
        self.finish(outcome, started.elapsed())
    }

    fn finish(&self, outcome: TaskOutcome, duration: Duration) -> TaskResult {
        TaskResult {
            task_id: self.task_id.clone(),
            hash: self.hash.clone(),
            outcome,
            duration,
        }
    }

    fn log_path(&self) -> AbsoluteSystemPathBuf {
        self.package_dir
            .join_component(".turbo")
            .join_component(&format!("turbo-{}.log", self.task_id.task()))
    }

    fn replay_log(&self) {
        if matches!(
            self.definition.output_logs,
            OutputLogsMode::None | OutputLogsMode::HashOnly
        ) {
            return;
        }
        let log_path = self.log_path();
        if let Ok(Some(contents)) = log_path.as_path().read_existing_to_string() {
            let mut writer = PrefixedWriter::new(std::io::stdout(), self.prefix.clone());
            let _ = writer.write_all(contents.as_bytes());
        }
    }

    async fn execute(&self) -> Result<(), (Option<i32>, String)> {
        let run_started = Instant::now();
        let mut cmd = Command::new("sh");
        cmd.args(["-c", self.command.as_str()]);
        cmd.current_dir(self.package_dir.clone());
        if self.env_clear {
            cmd.env_clear();
        }
        cmd.envs(self.env.iter());
        cmd.envs([("TURBO_HASH", self.hash.as_str())]);

        let mut process = match self.process_manager.spawn(cmd, STOP_TIMEOUT) {
            Some(Ok(child)) => child,
            Some(Err(e)) => return Err((None, format!("unable to spawn child process: {e}"))),
            None => return Err((None, "turbo is shutting down".to_string())),
        };

        let mut buf = Vec::new();
        let exit = process
            .pipe_output(&mut buf)
            .await
            .map_err(|e| (None, format!("io error capturing output: {e}")))?;

        {
            let mut writer = PrefixedWriter::new(std::io::stdout(), self.prefix.clone());
            let _ = writer.write_all(&buf);
        }

        match exit {
            Some(ChildExit::Finished(Some(0))) => {
                let log_path = self.log_path();
                if let Some(parent) = log_path.as_path().parent() {
                    let _ = parent.to_owned().create_dir_all();
                }
                let _ = log_path.as_path().create_with_contents(&buf);
                let duration_ms = run_started.elapsed().as_millis() as u64;
                self.save_to_cache(duration_ms).await;
                Ok(())
            }
            Some(ChildExit::Finished(code)) => Err((
                code,
                format!("command {} exited ({})", self.command, code.unwrap_or(-1)),
            )),
            Some(other) => Err((None, format!("{other:?}"))),
            None => Err((None, "process exited without reporting a status".to_string())),
        }
    }

    async fn save_to_cache(&self, duration_ms: u64) {
        if !self.definition.cache || self.no_cache {
            return;
        }

        let (include, exclude) = split_negated(&self.definition.outputs);
        let outputs = match globwalk(self.package_dir.as_path(), &include, &exclude, WalkType::Files) {
            Ok(set) => set,
            Err(_) => return,
        };

        let mut files = Vec::with_capacity(outputs.len() + 1);
        for path in outputs {
            if let Ok(anchored) = self.repo_root.as_path().anchor(&path) {
                files.push(anchored);
            }
        }
        let log_path = self.log_path();
        if let Ok(anchored) = self.repo_root.as_path().anchor(log_path.as_path()) {
            files.push(anchored);
        }

        let _ = self.cache.put(&self.hash, files, duration_ms).await;
    }
}
