use thiserror::Error;
use vigil_core::EngineError;

/// Errors raised while recording audit events.
///
/// Display strings describe the sink failure only; event context is never
/// echoed back.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit sink unavailable: {0}")]
    SinkUnavailable(String),

    #[error("audit serialization error: {0}")]
    Serialization(String),

    #[error("audit log io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("audit lock poisoned")]
    LockPoisoned,
}

impl From<AuditError> for EngineError {
    fn from(e: AuditError) -> Self {
        match e {
            AuditError::SinkUnavailable(msg) => EngineError::AuditSinkUnavailable(msg),
            other => EngineError::AuditSinkUnavailable(other.to_string()),
        }
    }
}

pub type AuditResult<T> = Result<T, AuditError>;
