//! Error type shared by every packdex crate

use std::path::PathBuf;

/// Unified error type for packdex.
#[derive(Debug, thiserror::Error)]
pub enum PackdexError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Invalid glob pattern `{pattern}`: {source}")]
    Glob {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("Malformed document {path}: {message}")]
    Document { path: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Plugin `{plugin}` failed: {message}")]
    Plugin { plugin: String, message: String },

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PackdexError {
    /// Map an io error onto the typed variants callers branch on.
    pub fn from_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        match source.kind() {
            std::io::ErrorKind::NotFound => PackdexError::NotFound(path.display().to_string()),
            std::io::ErrorKind::PermissionDenied => {
                PackdexError::PermissionDenied(path.display().to_string())
            }
            _ => PackdexError::Io { path, source },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PackdexError::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, PackdexError>;
