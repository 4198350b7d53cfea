use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("no packaged backend archive was found next to the application")]
    ArchiveNotBundled,

    #[error("backend archive not found at {path}")]
    ArchiveMissing { path: PathBuf },

    #[error("failed to read backend archive {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("I/O error while {operation} at {path}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("joined in-flight extraction failed: {message}")]
    InFlightFailed { message: String },
}

impl ExtractError {
    #[must_use]
    pub fn io(operation: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("backend interpreter not found at {path}")]
    BackendUnavailable { path: PathBuf },

    #[error("backend process exited unexpectedly (code: {code:?}, signal: {signal:?})")]
    BackendCrashed {
        code: Option<i32>,
        signal: Option<i32>,
    },

    #[error("failed to spawn backend process {command}: {source}")]
    Spawn {
        command: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Extract(#[from] ExtractError),
}
