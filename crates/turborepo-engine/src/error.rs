#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("could not find task {0} in project")]
    UnknownTask(String),
    #[error("{0}")]
    InvalidTaskName(String),
    #[error("could not find workspace {package} from task {task}")]
    UnknownPackage { task: String, package: String },
    #[error("\"{0}\" depends on itself")]
    SelfDependency(String),
    #[error(
        "\"{dependency}\" is a persistent task, \"{dependent}\" cannot depend on it"
    )]
    PersistentViolation { dependency: String, dependent: String },
    #[error("dependency cycle detected involving task \"{0}\"")]
    Cycle(String),
    #[error(transparent)]
    TurboJson(#[from] turborepo_turbo_json::TurboJsonError),
    #[error(transparent)]
    Graph(#[from] turborepo_graph::GraphError),
}
