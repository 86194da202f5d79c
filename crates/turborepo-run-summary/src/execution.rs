//! Aggregate execution stats for a run, folded up from the per-task results
//! a scheduler walk already produced. Unlike the live progress tracker this
//! is derived from in the upstream project, there's no interactive UI here
//! to stream events to, so this is a pure post-hoc tally rather than a
//! channel-backed accumulator.

use std::time::Duration;

use serde::Serialize;
use turborepo_task_executor::{TaskOutcome, TaskResult};

fn serialize_duration_ms<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionSummary {
    pub attempted: usize,
    pub cached: usize,
    pub failed: usize,
    pub success: usize,
    #[serde(serialize_with = "serialize_duration_ms")]
    pub duration: Duration,
}

impl ExecutionSummary {
    /// Folds a completed walk's results into the run-wide tally. Skipped
    /// tasks (upstream failure with continue-on-error off) and dry-run
    /// projections never count as attempted.
    pub fn tally(results: &[TaskResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            match &result.outcome {
                TaskOutcome::Skipped | TaskOutcome::WouldRun => continue,
                TaskOutcome::CacheHit { .. } => {
                    summary.attempted += 1;
                    summary.cached += 1;
                    summary.success += 1;
                }
                TaskOutcome::Success => {
                    summary.attempted += 1;
                    summary.success += 1;
                }
                TaskOutcome::Failure { .. } => {
                    summary.attempted += 1;
                    summary.failed += 1;
                }
            }
            summary.duration += result.duration;
        }
        summary
    }

    /// True when every attempted task was a cache hit: the run did no real
    /// work.
    pub fn full_turbo(&self) -> bool {
        self.attempted > 0 && self.cached == self.attempted
    }
}

#[cfg(test)]
mod tests {
    use turborepo_cache::CacheSource;
    use turborepo_task_id::TaskId;

    use super::*;

    fn result(task: &str, outcome: TaskOutcome) -> TaskResult {
        TaskResult {
            task_id: TaskId::new("web", task.to_string()),
            hash: "abc".to_string(),
            outcome,
            duration: Duration::from_millis(10),
        }
    }

    #[test]
    fn tallies_each_outcome_kind() {
        let results = vec![
            result(
                "build",
                TaskOutcome::CacheHit {
                    source: CacheSource::Local,
                    time_saved_ms: 500,
                },
            ),
            result("lint", TaskOutcome::Success),
            result(
                "test",
                TaskOutcome::Failure {
                    exit_code: Some(1),
                    message: "boom".to_string(),
                },
            ),
            result("format", TaskOutcome::Skipped),
        ];
        let summary = ExecutionSummary::tally(&results);
        assert_eq!(summary.attempted, 3);
        assert_eq!(summary.cached, 1);
        assert_eq!(summary.success, 2);
        assert_eq!(summary.failed, 1);
    }

    #[test]
    fn full_turbo_requires_every_attempt_to_be_cached() {
        let results = vec![result(
            "build",
            TaskOutcome::CacheHit {
                source: CacheSource::Local,
                time_saved_ms: 500,
            },
        )];
        assert!(ExecutionSummary::tally(&results).full_turbo());

        let results = vec![result("build", TaskOutcome::Success)];
        assert!(!ExecutionSummary::tally(&results).full_turbo());
    }
}
