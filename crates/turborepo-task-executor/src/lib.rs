//! Drives the task graph to completion: for each task, check the cache, and
//! on a miss spawn its script, capture output, and write the result back,
//! all with as much concurrency as the run allows and topological order
//! respected. `DryRunWalker` answers the same cache-hit question without
//! spawning anything, for `--dry-run`.

mod dry_run;
mod exec;
mod package;
mod result;
mod scheduler;

pub use dry_run::DryRunWalker;
pub use package::PackageInfo;
pub use result::{TaskOutcome, TaskResult};
pub use scheduler::{RunOptions, Scheduler};
