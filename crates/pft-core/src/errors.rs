use crate::domain::SessionId;

/// Core error type for the triage engine.
///
/// Adapter crates map their specific errors into this type so the orchestrator
/// can route every failure to the same fallback (a human pharmacist).
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or missing event payload. The session is never mutated.
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    #[error("unknown condition: {0}")]
    UnknownCondition(String),

    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("session already exists: {0}")]
    SessionExists(SessionId),

    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Error::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// True for failures that indicate a caller/integration bug rather than noisy input.
    pub fn is_integration_fault(&self) -> bool {
        matches!(self, Error::Validation { .. } | Error::UnknownCondition(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
