//! Audit sink with injectable failures, for exercising fail-open and
//! fail-closed paths.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use vigil_core::{AuditEvent, AuditSink};

use crate::chain::AuditChain;

/// Wraps an [`AuditChain`] and refuses appends on demand.
#[derive(Default)]
pub struct FlakySink {
    inner: AuditChain,
    unavailable: AtomicBool,
    failures_pending: AtomicU32,
    attempts: AtomicU32,
}

impl FlakySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse the next `n` appends.
    pub fn fail_next(&self, n: u32) {
        self.failures_pending.store(n, Ordering::SeqCst);
    }

    /// Refuse every append until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of append calls, successful or not.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.inner.events()
    }

    pub fn chain(&self) -> &AuditChain {
        &self.inner
    }
}

impl AuditSink for FlakySink {
    fn append(&self, event: &AuditEvent) -> Result<(), String> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err("sink offline".to_string());
        }
        let pending = self.failures_pending.load(Ordering::SeqCst);
        if pending > 0 {
            self.failures_pending.store(pending - 1, Ordering::SeqCst);
            return Err("transient sink failure".to_string());
        }
        self.inner.append(event)
    }
}
