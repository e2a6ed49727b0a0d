use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// The config file exists but could not be parsed.
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed submission or report. Surfaced immediately, never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A task for the same target (or with the same id) is already in flight.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// No report arrived before the wait deadline.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// The remote executor failed the command. Carries its message verbatim.
    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The dispatcher was torn down while the caller was still waiting.
    #[error("Shutdown: {0}")]
    Shutdown(String),

    /// Reading or writing the tab snapshot failed. Carries the file path.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Stable short name used in API error payloads and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Validation(_) => "validation",
            Error::Conflict(_) => "conflict",
            Error::Timeout(_) => "timeout",
            Error::Execution(_) => "execution",
            Error::NotFound(_) => "not_found",
            Error::Shutdown(_) => "shutdown",
            Error::Storage(_) => "storage",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
