use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, CacheError>;

/// Errors produced while keying, restoring, or saving the dependency cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("no files matched the dependency path {pattern:?}")]
    NoDependencyFilesMatched { pattern: String },

    #[error("cache folder path is retrieved but doesn't exist on disk: {}", path.display())]
    CacheDirMissingAtSaveTime { path: PathBuf },

    #[error("state {name} was not recorded by the setup step")]
    MissingState { name: &'static str },

    #[error("invalid dependency glob {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("invalid cache key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("walkdir error: {0}")]
    WalkDir(#[from] walkdir::Error),
}
