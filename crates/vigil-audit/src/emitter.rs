use std::fmt;
use std::sync::Arc;

use vigil_core::{AuditAction, AuditEvent, AuditSink};

use crate::error::{AuditError, AuditResult};

// ---------------------------------------------------------------------------
// ActionClass: how an action reacts to sink failure
// ---------------------------------------------------------------------------

/// Failure semantics of an audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionClass {
    /// Releases previously hidden data. Fail-closed: no event, no disclosure.
    Disclosure,
    /// Changes engine-wide state (emergency mode). Fail-closed.
    Administrative,
    /// Sort, paging, search, non-sensitive filters, selection. Fail-open
    /// after a bounded retry.
    Navigational,
}

impl ActionClass {
    pub fn is_fail_closed(self) -> bool {
        matches!(self, ActionClass::Disclosure | ActionClass::Administrative)
    }

    /// Class an action has unless the call site knows better (a filter on a
    /// sensitive column, a view of a row with revealed sensitive cells).
    pub fn default_for(action: AuditAction) -> Self {
        match action {
            AuditAction::Reveal | AuditAction::Export | AuditAction::RecordsViewed => {
                ActionClass::Disclosure
            }
            AuditAction::EmergencyModeChanged => ActionClass::Administrative,
            AuditAction::Hide
            | AuditAction::Search
            | AuditAction::FilterChanged
            | AuditAction::SortChanged
            | AuditAction::PageChanged
            | AuditAction::SelectionChanged
            | AuditAction::RowViewed => ActionClass::Navigational,
        }
    }
}

impl fmt::Display for ActionClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionClass::Disclosure => write!(f, "disclosure"),
            ActionClass::Administrative => write!(f, "administrative"),
            ActionClass::Navigational => write!(f, "navigational"),
        }
    }
}

/// What happened to an emitted event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    Recorded,
    /// A fail-open event the sink refused after every attempt.
    Dropped { attempts: u32 },
}

/// Retry budget for fail-open actions. Fail-closed actions never retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub fail_open_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            fail_open_retries: 1,
        }
    }
}

// ---------------------------------------------------------------------------
// AuditEmitter
// ---------------------------------------------------------------------------

/// Synchronous hook in front of the audit sink.
///
/// Cheap to clone; clones share the sink.
#[derive(Clone)]
pub struct AuditEmitter {
    sink: Arc<dyn AuditSink>,
    retry: RetryPolicy,
}

impl AuditEmitter {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self::with_retry_policy(sink, RetryPolicy::default())
    }

    pub fn with_retry_policy(sink: Arc<dyn AuditSink>, retry: RetryPolicy) -> Self {
        Self { sink, retry }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    /// Emit `event` with the failure semantics of `class`.
    ///
    /// Fail-closed classes make a single attempt and return
    /// `SinkUnavailable` on failure; the caller must abort its action.
    /// Navigational events are retried up to the policy's budget and then
    /// reported as `Dropped`.
    pub fn emit(&self, event: &AuditEvent, class: ActionClass) -> AuditResult<EmitOutcome> {
        if class.is_fail_closed() {
            return match self.sink.append(event) {
                Ok(()) => {
                    tracing::debug!(action = %event.action, class = %class, "audit event recorded");
                    Ok(EmitOutcome::Recorded)
                }
                Err(e) => {
                    tracing::warn!(
                        action = %event.action,
                        class = %class,
                        error = %e,
                        "audit sink refused fail-closed event; aborting action"
                    );
                    Err(AuditError::SinkUnavailable(e))
                }
            };
        }

        let attempts = self.retry.fail_open_retries + 1;
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match self.sink.append(event) {
                Ok(()) => {
                    tracing::debug!(action = %event.action, attempt, "audit event recorded");
                    return Ok(EmitOutcome::Recorded);
                }
                Err(e) => last_error = e,
            }
        }
        tracing::warn!(
            action = %event.action,
            attempts,
            error = %last_error,
            "dropping navigational audit event after retries"
        );
        Ok(EmitOutcome::Dropped { attempts })
    }

    /// Emit with the action's default class.
    pub fn emit_default(&self, event: &AuditEvent) -> AuditResult<EmitOutcome> {
        self.emit(event, ActionClass::default_for(event.action))
    }
}

impl fmt::Debug for AuditEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditEmitter")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
