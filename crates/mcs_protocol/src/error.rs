use thiserror::Error;

/// Error kinds shared across the supervisor, indexer, and admin API (spec.md §7).
#[derive(Debug, Error)]
pub enum McsError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("unknown project: {0}")]
    NotFound(String),

    #[error("no free port found in range {start}-{end}")]
    Capacity { start: u16, end: u16 },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type McsResult<T> = Result<T, McsError>;

impl McsError {
    /// Best-effort mapping onto an HTTP status code, used by the admin API.
    pub fn status_code(&self) -> u16 {
        match self {
            McsError::Validation(_) => 400,
            McsError::NotFound(_) => 404,
            McsError::Capacity { .. } => 400,
            McsError::Io(_) | McsError::Json(_) => 500,
        }
    }
}
