use thiserror::Error;

/// Top-level error taxonomy shared by core decision logic.
///
/// Ordered roughly by how the rest of the agent reacts to each variant —
/// see `§7 Error handling` in the design: configuration errors are refused
/// outright, validation errors become a per-item result row, and transport
/// errors are the caller's retry policy to apply.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;
