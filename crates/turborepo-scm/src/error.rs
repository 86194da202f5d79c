#[derive(Debug, thiserror::Error)]
pub enum ScmError {
    #[error("git error: {0}")]
    Git(#[from] git2::Error),
    #[error(transparent)]
    Path(#[from] turbopath::PathError),
    #[error(transparent)]
    Glob(#[from] globset::Error),
    #[error("bad pattern `{0}`: {1}")]
    BadPattern(String, globset::Error),
    #[error("io error reading {0}: {1}")]
    Io(String, std::io::Error),
}
