use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Generation error: {0}")]
    Llm(#[from] LlmError),

    #[error("Precondition failed: {message}")]
    Precondition { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Artifact store errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error at {path}: {message}")]
    Io { path: String, message: String },

    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Malformed artifact {key}: {message}")]
    Malformed { key: String, message: String },

    #[error("Invalid artifact key: {key}")]
    InvalidKey { key: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Generation capability errors
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Rate limited: {message}")]
    RateLimited { message: String },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    /// The completion is not JSON at all.
    #[error("Unparseable structured output: {message} (raw: {raw})")]
    Unparseable { message: String, raw: String },

    /// The completion is JSON but does not have the expected shape.
    #[error("Structured output does not match schema: {message} (raw: {raw})")]
    SchemaMismatch { message: String, raw: String },
}

impl LlmError {
    /// Whether the single rate-limit retry applies to this error.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for generation calls
pub type LlmResult<T> = Result<T, LlmError>;
