//! Error taxonomy for the watch engine.
//!
//! User-initiated operations (`watch`, `unwatch`, `configure`) fail fast with
//! one of these kinds. Producer-thread faults are never raised asynchronously
//! on the consumer: they surface as a terminal batch sentinel followed by
//! end-of-stream (see [`crate::engine`]).

use std::path::PathBuf;

use thiserror::Error;

/// Errors returned by [`crate::engine::WatchEngine`] operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("permission denied watching {0}")]
    PermissionDenied(PathBuf),

    #[error("backend cannot observe {path}: {reason}")]
    Unsupported { path: PathBuf, reason: String },

    #[error("backend error: {0}")]
    BackendError(String),

    #[error("operation not permitted in state {state:?}")]
    InvalidState { state: crate::engine::EngineState },
}

impl EngineError {
    pub(crate) fn from_notify(path: &std::path::Path, err: notify::Error) -> Self {
        use notify::ErrorKind;

        match &err.kind {
            ErrorKind::PathNotFound => EngineError::PathNotFound(path.to_path_buf()),
            ErrorKind::Io(io_err) if io_err.kind() == std::io::ErrorKind::NotFound => {
                EngineError::PathNotFound(path.to_path_buf())
            }
            ErrorKind::Io(io_err) if io_err.kind() == std::io::ErrorKind::PermissionDenied => {
                EngineError::PermissionDenied(path.to_path_buf())
            }
            ErrorKind::Generic(msg) if msg.to_lowercase().contains("not supported") => {
                EngineError::Unsupported {
                    path: path.to_path_buf(),
                    reason: msg.clone(),
                }
            }
            _ => EngineError::BackendError(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
