#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error(transparent)]
    Path(#[from] turbopath::PathError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot untar file to {0}")]
    InvalidFilePath(String),
    #[error("links in the cache are cyclic")]
    CycleDetected,
    #[error("invalid file path, link target does not exist: {0}")]
    LinkTargetDoesNotExist(String),
    #[error("attempted to restore unsupported file type: {0:?}")]
    RestoreUnsupportedFileType(tar::EntryType),
    #[error("attempted to create unsupported file type")]
    CreateUnsupportedFileType,
    #[error("tar attempts to write outside of directory: {0}")]
    LinkOutsideOfDirectory(String),
    #[error("invalid cache metadata file: {0}")]
    InvalidMetadata(serde_json::Error),
    #[error("remote cache request failed: {0}")]
    Remote(#[from] reqwest::Error),
    #[error("remote cache rejected signature")]
    InvalidSignature,
    #[error("remote cache request unauthorized: {0}")]
    RemoteUnauthorized(String),
    #[error(transparent)]
    Signature(#[from] crate::signature::SignatureError),
    #[error("cache is shutting down, cannot accept new writes")]
    ShuttingDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    Local,
    Remote,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheHitMetadata {
    pub source: CacheSource,
    pub time_saved: u64,
}
