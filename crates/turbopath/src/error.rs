#[derive(Debug, thiserror::Error)]
pub enum PathError {
    #[error("path is not absolute: {0}")]
    NotAbsolute(String),
    #[error("path is not relative: {0}")]
    NotRelative(String),
    #[error("path {0} escapes anchor {1}")]
    NotParent(String, String),
    #[error("invalid UTF-8 path: {0}")]
    InvalidUnicode(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
