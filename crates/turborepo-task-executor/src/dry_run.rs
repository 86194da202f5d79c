//! Projects what a real run would do without spawning anything: reuses the
//! hashes a `TaskHasher` already computed and only asks the cache whether
//! each one exists.

use std::{collections::HashMap, time::Duration};

use turborepo_cache::TaskCache;
use turborepo_engine::TaskGraph;
use turborepo_task_id::TaskId;

use crate::result::{TaskOutcome, TaskResult};

pub struct DryRunWalker<'a> {
    graph: &'a TaskGraph,
    hashes: &'a HashMap<TaskId<'static>, String>,
    cache: &'a TaskCache,
}

impl<'a> DryRunWalker<'a> {
    pub fn new(
        graph: &'a TaskGraph,
        hashes: &'a HashMap<TaskId<'static>, String>,
        cache: &'a TaskCache,
    ) -> Self {
        Self {
            graph,
            hashes,
            cache,
        }
    }

    /// Walks every task in dependency order, recording a cache-hit or
    /// would-run verdict for each. Concurrency here is inherently 1: there's
    /// no work to parallelize once nothing is actually spawned.
    pub fn walk(&self) -> Vec<TaskResult> {
        self.graph
            .task_order()
            .into_iter()
            .map(|task_id| {
                let hash = self.hashes.get(&task_id).cloned().unwrap_or_default();
                let outcome = match self.cache.exists(&hash) {
                    Some(meta) => TaskOutcome::CacheHit {
                        source: meta.source,
                        time_saved_ms: meta.time_saved,
                    },
                    None => TaskOutcome::WouldRun,
                };
                TaskResult {
                    task_id,
                    hash,
                    outcome,
                    duration: Duration::ZERO,
                }
            })
            .collect()
    }
}
