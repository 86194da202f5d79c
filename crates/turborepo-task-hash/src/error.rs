#[derive(Debug, thiserror::Error)]
pub enum TaskHashError {
    #[error(transparent)]
    Scm(#[from] turborepo_scm::ScmError),
    #[error(transparent)]
    Walk(#[from] turborepo_globwalk::WalkError),
    #[error(transparent)]
    Path(#[from] turbopath::PathError),
    #[error("missing package-file hash for {0}")]
    MissingPackageFileHash(String),
    #[error("missing hash for dependency task {0}")]
    MissingDependencyTaskHash(String),
    #[error("missing task definition for {0}")]
    MissingTaskDefinition(String),
}
