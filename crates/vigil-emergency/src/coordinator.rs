//! Emergency mode state machine.
//!
//! Two states: inactive and active. Every transition is recorded as an
//! `emergency_mode_changed` audit event before the new state is published,
//! and publication goes through a watch channel so every table session sees
//! the latest state on its next read.

use std::sync::Mutex;
use tokio::sync::watch;
use vigil_audit::{ActionClass, AuditEmitter};
use vigil_core::{AuditAction, AuditEvent, ClearanceTier, EmergencyState, Principal, Timestamp};

use crate::error::{EmergencyError, EmergencyResult};

pub struct EmergencyCoordinator {
    state: watch::Sender<EmergencyState>,
    emitter: AuditEmitter,
    transition: Mutex<()>,
}

impl EmergencyCoordinator {
    pub fn new(emitter: AuditEmitter) -> Self {
        let (state, _) = watch::channel(EmergencyState::inactive());
        Self {
            state,
            emitter,
            transition: Mutex::new(()),
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.borrow().active
    }

    pub fn state(&self) -> EmergencyState {
        self.state.borrow().clone()
    }

    /// A receiver that always yields the latest published state.
    pub fn subscribe(&self) -> EmergencyWatch {
        EmergencyWatch {
            rx: self.state.subscribe(),
        }
    }

    /// Declare an emergency. Elevates every principal's effective clearance.
    pub fn activate(&self, principal: &Principal) -> EmergencyResult<EmergencyState> {
        let _guard = self
            .transition
            .lock()
            .map_err(|_| EmergencyError::LockPoisoned)?;
        if self.is_active() {
            return Err(EmergencyError::InvalidTransition(
                "emergency mode is already active".to_string(),
            ));
        }

        let next = EmergencyState::activated(principal.id.clone(), Timestamp::now());
        self.record_transition(principal, &next)?;
        self.state.send_replace(next.clone());

        tracing::warn!(principal = %principal.id, "emergency mode activated");
        Ok(next)
    }

    /// End the emergency. Effective clearance falls back to each grant.
    pub fn deactivate(&self, principal: &Principal) -> EmergencyResult<EmergencyState> {
        let _guard = self
            .transition
            .lock()
            .map_err(|_| EmergencyError::LockPoisoned)?;
        if !self.is_active() {
            return Err(EmergencyError::InvalidTransition(
                "emergency mode is not active".to_string(),
            ));
        }

        let next = EmergencyState::inactive();
        self.record_transition(principal, &next)?;
        let previous = self.state.send_replace(next.clone());

        tracing::info!(
            principal = %principal.id,
            activated_by = ?previous.activated_by.as_ref().map(|p| p.as_str()),
            "emergency mode deactivated"
        );
        Ok(next)
    }

    fn record_transition(&self, principal: &Principal, next: &EmergencyState) -> EmergencyResult<()> {
        let previous = self.state();
        let mut event = AuditEvent::new(AuditAction::EmergencyModeChanged, principal.id.clone())
            .with_tier(ClearanceTier::Emergency)
            .with_context("active", next.active)
            .with_context("grantedClearance", principal.granted_clearance.as_str());
        if let Some(at) = previous.activated_at {
            event = event.with_context("previousActivatedAt", at.to_rfc3339());
        }
        if let Some(by) = previous.activated_by {
            event = event.with_context("previousActivatedBy", by.as_str());
        }
        self.emitter.emit(&event, ActionClass::Administrative)?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// EmergencyWatch: a session's view of the emergency flag
// ---------------------------------------------------------------------------

/// Receiver side of the emergency broadcast, held by each table session.
#[derive(Debug, Clone)]
pub struct EmergencyWatch {
    rx: watch::Receiver<EmergencyState>,
}

impl EmergencyWatch {
    /// Latest published state, without marking it seen.
    pub fn current(&self) -> EmergencyState {
        self.rx.borrow().clone()
    }

    /// Whether a state was published since the last `observe`.
    pub fn has_changed(&self) -> bool {
        self.rx.has_changed().unwrap_or(false)
    }

    /// Latest published state, marking it seen.
    pub fn observe(&mut self) -> EmergencyState {
        self.rx.borrow_and_update().clone()
    }

    /// Wait for the next transition.
    pub async fn changed(&mut self) -> EmergencyResult<EmergencyState> {
        self.rx
            .changed()
            .await
            .map_err(|_| EmergencyError::CoordinatorDropped)?;
        Ok(self.rx.borrow_and_update().clone())
    }
}
