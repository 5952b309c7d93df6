use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("access denied: {0}")]
    AccessDenied(PathBuf),

    #[error("path not found: {0}")]
    NotFound(PathBuf),

    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("buffer pool exhausted")]
    MemoryLimit,

    #[error("operation queue is full")]
    QueueFull,

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("processor already started")]
    AlreadyStarted,

    #[error("processor is stopped")]
    Stopped,

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, SearchError>;

impl SearchError {
    /// Maps an `io::Error` for `path` onto the access-denied / not-found
    /// kinds, falling back to plain `Io`.
    pub fn from_io(error: std::io::Error, path: &std::path::Path) -> Self {
        match error.kind() {
            std::io::ErrorKind::PermissionDenied => Self::AccessDenied(path.to_path_buf()),
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            _ => Self::Io(error),
        }
    }
}
