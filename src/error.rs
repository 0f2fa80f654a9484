use thiserror::Error;

/// Typed error hierarchy for the pipeline.
///
/// Per-record failures (`Transport`, `SchemaViolation`,
/// `UnknownModelPricing`) are contained by the orchestrator and recorded
/// in the record's `error_detail`; only `FatalPrecondition` aborts a
/// batch, and it does so before any record is claimed.
#[derive(Debug, Error)]
pub enum AppError {
    /// A raw history entry that cannot yield a canonical record id.
    /// Resolves to a SKIPPED record, never a dropped entry.
    #[error("malformed entry: {0}")]
    MalformedEntry(String),

    /// Transport-level provider failure (timeout, connect error, HTTP
    /// status). `transient` controls whether the retry ladder applies.
    #[error("provider transport error: {detail}")]
    Transport { detail: String, transient: bool },

    /// Provider output that does not satisfy the verdict schema.
    /// Terminal for the attempt: malformed output is a model/prompt
    /// defect, not a transient failure.
    #[error("schema violation at `{field}`: {reason}")]
    SchemaViolation { field: String, reason: String },

    /// Model identifier missing from the price table.
    #[error("no pricing entry for model `{0}`")]
    UnknownModelPricing(String),

    /// Missing credentials or broken configuration. Aborts the whole
    /// batch with a non-zero exit before anything is claimed.
    #[error("fatal precondition: {0}")]
    FatalPrecondition(String),

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Database(String),

    #[error("{0}")]
    Io(String),

    #[error("{0}")]
    Json(String),
}

impl AppError {
    /// Whether the retry ladder should run another provider attempt.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Transport { transient: true, .. })
    }
}

// ============================================================================
// From impls
// ============================================================================

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(e: rusqlite::Error) -> Self {
        AppError::Database(e.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Json(e.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        AppError::Transport {
            detail: e.to_string(),
            transient: e.is_timeout() || e.is_connect(),
        }
    }
}
