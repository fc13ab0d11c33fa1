use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, ToolchainError>;

/// Errors produced while resolving, acquiring, and wiring a toolchain.
///
/// Every variant is fatal to the current run; nothing here is retried.
#[derive(Debug, thiserror::Error)]
pub enum ToolchainError {
    #[error("platform {os} is not supported")]
    UnsupportedPlatform { os: String },

    #[error("architecture {arch} is not supported on {os}")]
    UnsupportedArch { arch: String, os: String },

    #[error("unknown archive extension: {ext}")]
    UnknownArchiveExtension { ext: String },

    #[error("tool directory not found: {path}")]
    ToolRootNotFound { path: PathBuf },

    #[error("expected a single tool directory in {path}, found {entries:?}")]
    AmbiguousToolRoot { path: PathBuf, entries: Vec<String> },

    #[error("{name} install at {root} is incomplete: {reason}")]
    InvalidToolLayout {
        name: String,
        root: PathBuf,
        reason: String,
    },

    #[error("invalid haxe version: {input:?}")]
    InvalidVersion { input: String },

    #[error("download of {url} failed: {message}")]
    Download { url: String, message: String },

    #[error("failed to extract {archive}: {message}")]
    Extract { archive: PathBuf, message: String },

    #[error("failed to run {program}: {source}")]
    Process {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {code:?}: {stderr}")]
    ProcessFailed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
