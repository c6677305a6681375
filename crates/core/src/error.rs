use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, VersionError>;

#[derive(Error, Debug)]
pub enum VersionError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Failed to read counter file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write counter file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to list directory {path}: {source}")]
    ListDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to delete {path}: {source}")]
    Delete {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

impl VersionError {
    /// Short machine-readable tag used in outcome reports.
    pub fn kind(&self) -> &'static str {
        match self {
            VersionError::Config(_) => "config",
            VersionError::Read { .. } => "read_failure",
            VersionError::Write { .. } => "write_failure",
            VersionError::ListDir { .. } => "list_failure",
            VersionError::Delete { .. } => "delete_failure",
            VersionError::Parse { .. } => "parse_failure",
        }
    }
}
