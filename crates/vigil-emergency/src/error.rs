use thiserror::Error;
use vigil_audit::AuditError;
use vigil_core::EngineError;

#[derive(Debug, Error)]
pub enum EmergencyError {
    /// A redundant transition: activating while active or deactivating
    /// while inactive. Nothing is emitted.
    #[error("invalid emergency transition: {0}")]
    InvalidTransition(String),

    /// The transition event could not be recorded, so the transition did not
    /// happen.
    #[error("emergency transition not audited: {0}")]
    Audit(#[from] AuditError),

    #[error("emergency coordinator dropped")]
    CoordinatorDropped,

    #[error("emergency state lock poisoned")]
    LockPoisoned,
}

impl From<EmergencyError> for EngineError {
    fn from(e: EmergencyError) -> Self {
        match e {
            EmergencyError::Audit(inner) => inner.into(),
            other => EngineError::Internal(other.to_string()),
        }
    }
}

pub type EmergencyResult<T> = Result<T, EmergencyError>;
