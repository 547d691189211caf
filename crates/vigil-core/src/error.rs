use std::fmt;
use thiserror::Error;

/// Error taxonomy shared by every component of the table engine.
///
/// Display implementations name columns and limits but never cell values,
/// so an error message can be logged or shown without leaking data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The column is not visible at the caller's effective clearance.
    #[error("access denied to column '{column}'")]
    AccessDenied { column: String },

    #[error("invalid filter state: {0}")]
    InvalidFilterState(String),

    #[error("invalid sort column: {0}")]
    InvalidSortColumn(String),

    /// Column declarations or column-scoped operations used incorrectly.
    #[error("invalid column: {0}")]
    InvalidColumn(String),

    #[error("export of {requested} records exceeds the limit of {limit}")]
    ExportTooLarge { requested: usize, limit: usize },

    #[error("audit sink unavailable: {0}")]
    AuditSinkUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Discriminator for EngineError variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineErrorKind {
    AccessDenied,
    InvalidFilterState,
    InvalidSortColumn,
    InvalidColumn,
    ExportTooLarge,
    AuditSinkUnavailable,
    Internal,
}

impl fmt::Display for EngineErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineErrorKind::AccessDenied => write!(f, "AccessDenied"),
            EngineErrorKind::InvalidFilterState => write!(f, "InvalidFilterState"),
            EngineErrorKind::InvalidSortColumn => write!(f, "InvalidSortColumn"),
            EngineErrorKind::InvalidColumn => write!(f, "InvalidColumn"),
            EngineErrorKind::ExportTooLarge => write!(f, "ExportTooLarge"),
            EngineErrorKind::AuditSinkUnavailable => write!(f, "AuditSinkUnavailable"),
            EngineErrorKind::Internal => write!(f, "Internal"),
        }
    }
}

impl EngineError {
    pub fn access_denied(column: impl Into<String>) -> Self {
        EngineError::AccessDenied {
            column: column.into(),
        }
    }

    pub fn kind(&self) -> EngineErrorKind {
        match self {
            EngineError::AccessDenied { .. } => EngineErrorKind::AccessDenied,
            EngineError::InvalidFilterState(_) => EngineErrorKind::InvalidFilterState,
            EngineError::InvalidSortColumn(_) => EngineErrorKind::InvalidSortColumn,
            EngineError::InvalidColumn(_) => EngineErrorKind::InvalidColumn,
            EngineError::ExportTooLarge { .. } => EngineErrorKind::ExportTooLarge,
            EngineError::AuditSinkUnavailable(_) => EngineErrorKind::AuditSinkUnavailable,
            EngineError::Internal(_) => EngineErrorKind::Internal,
        }
    }

    /// Usage errors are caller bugs: they are rejected before any work is done
    /// and retrying the same request can never succeed.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self.kind(),
            EngineErrorKind::InvalidFilterState
                | EngineErrorKind::InvalidSortColumn
                | EngineErrorKind::InvalidColumn
        )
    }

    /// Text for the rendering layer.
    ///
    /// `AccessDenied` has no user-facing text: the column is dropped from the
    /// table instead of showing an error.
    pub fn user_message(&self) -> Option<&'static str> {
        match self.kind() {
            EngineErrorKind::AccessDenied => None,
            EngineErrorKind::AuditSinkUnavailable => {
                Some("cannot display protected data right now")
            }
            EngineErrorKind::ExportTooLarge => {
                Some("export is too large; narrow the selection or export page by page")
            }
            EngineErrorKind::InvalidFilterState
            | EngineErrorKind::InvalidSortColumn
            | EngineErrorKind::InvalidColumn => Some("the table request was not valid"),
            EngineErrorKind::Internal => Some("something went wrong"),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_denied_display_names_column_only() {
        let err = EngineError::access_denied("medical_id");
        assert_eq!(err.to_string(), "access denied to column 'medical_id'");
        assert_eq!(err.kind(), EngineErrorKind::AccessDenied);
        assert!(err.user_message().is_none());
    }

    #[test]
    fn test_export_too_large_display() {
        let err = EngineError::ExportTooLarge {
            requested: 12,
            limit: 10,
        };
        assert_eq!(
            err.to_string(),
            "export of 12 records exceeds the limit of 10"
        );
    }

    #[test]
    fn test_audit_unavailable_is_blocking_message() {
        let err = EngineError::AuditSinkUnavailable("disk full".into());
        assert_eq!(
            err.user_message(),
            Some("cannot display protected data right now")
        );
        assert!(!err.is_usage_error());
    }

    #[test]
    fn test_usage_errors() {
        assert!(EngineError::InvalidFilterState("x".into()).is_usage_error());
        assert!(EngineError::InvalidSortColumn("x".into()).is_usage_error());
        assert!(EngineError::InvalidColumn("x".into()).is_usage_error());
        assert!(!EngineError::access_denied("x").is_usage_error());
    }

    #[test]
    fn test_error_kind_display_all_variants() {
        let kinds = [
            EngineErrorKind::AccessDenied,
            EngineErrorKind::InvalidFilterState,
            EngineErrorKind::InvalidSortColumn,
            EngineErrorKind::InvalidColumn,
            EngineErrorKind::ExportTooLarge,
            EngineErrorKind::AuditSinkUnavailable,
            EngineErrorKind::Internal,
        ];
        for kind in kinds {
            assert!(!kind.to_string().is_empty());
        }
    }
}
