use std::time::Duration;

use turborepo_cache::CacheSource;
use turborepo_task_id::TaskId;

#[derive(Debug, Clone)]
pub struct TaskResult {
    pub task_id: TaskId<'static>,
    pub hash: String,
    pub outcome: TaskOutcome,
    pub duration: Duration,
}

#[derive(Debug, Clone)]
pub enum TaskOutcome {
    /// Outputs and logs were restored from the cache; nothing was run.
    CacheHit {
        source: CacheSource,
        time_saved_ms: u64,
    },
    /// The script ran and exited zero.
    Success,
    /// The script ran and exited non-zero, or couldn't be spawned at all.
    Failure {
        exit_code: Option<i32>,
        message: String,
    },
    /// Never attempted: an upstream dependency failed and continue-on-error
    /// is off.
    Skipped,
    /// Dry-run only: not a cache hit, but the walker never actually spawns
    /// anything to find out whether it would succeed.
    WouldRun,
}

impl TaskOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, TaskOutcome::Failure { .. })
    }
}
