#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    #[error("dependency cycle detected involving package `{0}`")]
    Cycle(String),
    #[error("unknown package `{0}`")]
    UnknownPackage(String),
}
