#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TaskIdError {
    #[error("task id `{0}` is not package-qualified (expected `pkg#task`)")]
    Unqualified(String),
    #[error("task id `{0}` has an empty package or task half")]
    Malformed(String),
}
