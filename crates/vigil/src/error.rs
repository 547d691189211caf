use thiserror::Error;

/// Error type for the Vigil root crate and binary, aggregating errors from
/// every library crate.
#[derive(Debug, Error)]
pub enum RootError {
    #[error("engine error: {0}")]
    Engine(#[from] vigil_core::EngineError),

    #[error("audit error: {0}")]
    Audit(#[from] vigil_audit::AuditError),

    #[error("emergency error: {0}")]
    Emergency(#[from] vigil_emergency::EmergencyError),

    /// The record-source file is malformed.
    #[error("record source error: {0}")]
    Source(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl RootError {
    /// Text safe to show an operator. Engine errors use their rendering-layer
    /// message where one exists.
    pub fn user_message(&self) -> String {
        match self {
            RootError::Engine(e) => e
                .user_message()
                .map(str::to_string)
                .unwrap_or_else(|| e.to_string()),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for RootError {
    fn from(e: serde_json::Error) -> Self {
        RootError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for RootError {
    fn from(e: toml::de::Error) -> Self {
        RootError::Config(format!("TOML parse error: {}", e))
    }
}

pub type RootResult<T> = Result<T, RootError>;

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::EngineError;

    #[test]
    fn test_root_error_display() {
        let err = RootError::Internal("something broke".into());
        assert_eq!(err.to_string(), "internal error: something broke");
    }

    #[test]
    fn test_root_error_config() {
        let err = RootError::Config("max_records must be > 0".into());
        assert_eq!(
            err.to_string(),
            "configuration error: max_records must be > 0"
        );
    }

    #[test]
    fn test_root_error_from_engine() {
        let root_err: RootError = EngineError::ExportTooLarge {
            requested: 12,
            limit: 10,
        }
        .into();
        assert!(root_err.to_string().contains("exceeds the limit of 10"));
    }

    #[test]
    fn test_root_error_from_audit() {
        let audit_err = vigil_audit::AuditError::SinkUnavailable("disk full".into());
        let root_err: RootError = audit_err.into();
        assert!(root_err.to_string().contains("disk full"));
    }

    #[test]
    fn test_root_error_from_emergency() {
        let err = vigil_emergency::EmergencyError::InvalidTransition("not active".into());
        let root_err: RootError = err.into();
        assert!(matches!(root_err, RootError::Emergency(_)));
    }

    #[test]
    fn test_root_error_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let root_err: RootError = json_err.into();
        assert!(matches!(root_err, RootError::Serialization(_)));
    }

    #[test]
    fn test_root_error_from_toml() {
        let toml_err = toml::from_str::<toml::Value>("= invalid").unwrap_err();
        let root_err: RootError = toml_err.into();
        assert!(matches!(root_err, RootError::Config(_)));
    }

    #[test]
    fn test_user_message_hides_sink_detail() {
        let err: RootError = EngineError::AuditSinkUnavailable("jsonl: permission denied".into()).into();
        assert_eq!(err.user_message(), "cannot display protected data right now");

        let denied: RootError = EngineError::access_denied("diagnosis").into();
        assert!(denied.user_message().contains("diagnosis"));
    }
}
