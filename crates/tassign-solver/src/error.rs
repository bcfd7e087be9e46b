use thiserror::Error;

use crate::session::SessionState;

#[derive(Error, Debug)]
pub enum SolverError {
    // Source data errors
    #[error("Unable to load input data: {0}")]
    Source(String),

    #[error("Inconsistent input data: {message}")]
    InconsistentData { message: String },

    // JSON/parsing errors
    #[error("Failed to parse document: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Config errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Backup / restore errors
    #[error("Persistence failed: {0}")]
    Persistence(String),

    // Lifecycle errors
    #[error("Operation {operation} is not allowed in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    #[error("Another background task is still running")]
    Busy,

    #[error("Session has been disposed")]
    Disposed,

    #[error("Operation was interrupted")]
    Interrupted,
}

impl SolverError {
    /// Whether a compilation that failed with this error must abort the load.
    ///
    /// An interruption is a cooperative stop, everything else means the
    /// source data could not be turned into a model.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SolverError::Interrupted)
    }
}

pub type Result<T> = std::result::Result<T, SolverError>;
