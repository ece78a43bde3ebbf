use thiserror::Error;
use tokio::task::JoinError;

#[derive(Error, Debug, Clone)]
pub enum AppError {
    #[error("HTTP request failed: {0}")]
    Reqwest(String),
    #[error("Filesystem I/O error: {0}")]
    Io(String),
    #[error("JSON serialization error: {0}")]
    SerdeSerialize(String),
    #[error("JSON parsing error: {0}")]
    SerdeParse(String),
    #[error("Endpoint returned HTTP {status}: {message}")]
    HttpStatus { status: u16, message: String },
    #[error("Timeout during operation: {0}")]
    Timeout(String),
    #[error("Persisted progress is corrupt ({path}): {message}")]
    CorruptState { path: String, message: String },
    #[error("Invalid argument provided: {0}")]
    Argument(String),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Credential error: {0}")]
    Credentials(String),
    #[error("Tokio task join error: {0}")]
    JoinError(String),
    #[error("Semaphore acquisition error: {0}")]
    SemaphoreAcquire(String),
    #[error("Unexpected internal error: {0}")]
    Unexpected(String),
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AppError::Timeout(e.to_string())
        } else {
            AppError::Reqwest(e.to_string())
        }
    }
}
impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}
impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() || e.is_eof() || e.is_syntax() {
            AppError::SerdeParse(e.to_string())
        } else {
            AppError::SerdeSerialize(e.to_string())
        }
    }
}
impl From<JoinError> for AppError {
    fn from(e: JoinError) -> Self {
        AppError::JoinError(e.to_string())
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn corrupt_state<S: Into<String>>(path: &std::path::Path, message: S) -> AppError {
        AppError::CorruptState {
            path: path.display().to_string(),
            message: message.into(),
        }
    }

    /// Argument and configuration problems exit with the usage status instead of the run
    /// failure status.
    pub fn is_usage_error(&self) -> bool {
        matches!(self, AppError::Argument(_) | AppError::ConfigError(_))
    }
}
