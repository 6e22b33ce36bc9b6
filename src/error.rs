use thiserror::Error;

/// Main error type for the scoring pipeline.
///
/// Stage-level policy: `TransientFetch` and `DataMissing` are absorbed into
/// risk flags by callers; `Invariant` and `Schema` abort the process with a
/// non-zero exit code and nothing written.
#[derive(Error, Debug)]
pub enum MlbError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    // Database errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Schema error: {0}")]
    Schema(String),

    // Network errors
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Transient fetch failure after retries: {0}")]
    TransientFetch(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    // Data availability errors
    #[error("Missing data: {0}")]
    DataMissing(String),

    // Hard invariant violations (no-lookahead, selection key collisions,
    // contradictory state transitions). Always fatal.
    #[error("Invariant violation: {0}")]
    Invariant(String),

    #[error("Invalid state transition: from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Per-record logic errors (line=0 edge, undefined probability mapping)
    #[error("Logic error: {0}")]
    Logic(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for MlbError
pub type Result<T> = std::result::Result<T, MlbError>;

impl MlbError {
    /// Process exit code for the job runner: 1 for hard errors, 2 for
    /// partial success with risk flags.
    pub fn exit_code(&self) -> i32 {
        match self {
            MlbError::DataMissing(_) | MlbError::TransientFetch(_) => 2,
            _ => 1,
        }
    }

    /// Whether the error halts the whole stage rather than a single record.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MlbError::Invariant(_)
                | MlbError::Schema(_)
                | MlbError::InvalidStateTransition { .. }
                | MlbError::Database(_)
                | MlbError::Config(_)
        )
    }
}
