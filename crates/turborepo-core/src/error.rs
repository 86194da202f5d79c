//! Top-level run errors. The two variants a caller should pattern-match on
//! for exit-code purposes are [`RunError::Engine`] and [`RunError::Hash`]:
//! everything else before a task runs is also fatal, but those two carry the
//! stable message shape integration tests match against.

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("error preparing engine: {0}")]
    Engine(#[from] turborepo_engine::EngineError),
    #[error("error preparing engine: {0}")]
    Graph(#[from] turborepo_graph::GraphError),
    #[error("hashing error: {0}")]
    Hash(#[from] turborepo_task_hash::TaskHashError),
    #[error("error preparing engine: {0}")]
    TurboJson(#[from] turborepo_turbo_json::TurboJsonError),
    #[error(transparent)]
    Cache(#[from] turborepo_cache::CacheError),
    #[error(transparent)]
    RunSummary(#[from] turborepo_run_summary::RunSummaryError),
    #[error("no turbo.json found at {0}")]
    MissingPipeline(String),
    #[error("unknown package {0} named in --filter")]
    UnknownFilterPackage(String),
}

impl RunError {
    /// The exit code a caller should report for a run that never got past
    /// building its engine or hashing its tasks. Both classes are fatal
    /// before any task starts, and both exit `1`.
    pub fn exit_code(&self) -> i32 {
        1
    }
}
