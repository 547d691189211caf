//! Per-session masking state.
//!
//! Sensitive columns start hidden. A reveal is column-scoped (every row at
//! once) and only takes effect after the audit sink accepted the disclosure
//! event. With an idle timeout configured, each reveal owns a cancellable
//! tokio task that hides the column again once it has gone untouched for
//! the whole timeout.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use vigil_audit::{ActionClass, AuditEmitter};
use vigil_core::{
    AuditAction, AuditEvent, ColumnKey, EmergencyState, EngineError, EngineResult, Principal,
    PrincipalId,
};
use vigil_policy::{can_see, relies_on_emergency, Column};

/// Proof of a successful reveal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealGrant {
    pub column_key: ColumnKey,
    pub emergency_override: bool,
}

/// Why a column went back to hidden. Carried in the hide event's context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HideReason {
    Manual,
    IdleTimeout,
    EmergencyEnded,
}

impl HideReason {
    pub fn as_str(self) -> &'static str {
        match self {
            HideReason::Manual => "manual",
            HideReason::IdleTimeout => "idle_timeout",
            HideReason::EmergencyEnded => "emergency_ended",
        }
    }
}

struct RevealEntry {
    emergency_override: bool,
    generation: u64,
    principal_id: PrincipalId,
    emitter: AuditEmitter,
    timer: Option<JoinHandle<()>>,
}

impl RevealEntry {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

#[derive(Default)]
struct MaskingInner {
    revealed: HashMap<ColumnKey, RevealEntry>,
    next_generation: u64,
}

impl MaskingInner {
    fn bump(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    /// Remove the entry only if no interaction happened since the timer
    /// armed with `generation` was scheduled.
    fn expire(&mut self, key: &ColumnKey, generation: u64) -> Option<RevealEntry> {
        match self.revealed.get(key) {
            Some(entry) if entry.generation == generation => self.revealed.remove(key),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// MaskingSnapshot: what the pipeline reads
// ---------------------------------------------------------------------------

/// Point-in-time copy of which sensitive columns are revealed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaskingSnapshot {
    revealed: HashSet<ColumnKey>,
}

impl MaskingSnapshot {
    /// Everything hidden.
    pub fn hidden() -> Self {
        Self::default()
    }

    pub fn with_revealed(keys: impl IntoIterator<Item = ColumnKey>) -> Self {
        Self {
            revealed: keys.into_iter().collect(),
        }
    }

    pub fn is_revealed(&self, key: &ColumnKey) -> bool {
        self.revealed.contains(key)
    }

    /// A cell of `column` renders as its placeholder.
    pub fn is_masked(&self, column: &Column) -> bool {
        column.contains_sensitive_data() && !self.revealed.contains(&column.key)
    }
}

// ---------------------------------------------------------------------------
// MaskingStore
// ---------------------------------------------------------------------------

pub struct MaskingStore {
    inner: Arc<Mutex<MaskingInner>>,
    idle_timeout: Option<Duration>,
}

impl MaskingStore {
    pub fn new(idle_timeout: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MaskingInner::default())),
            idle_timeout,
        }
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    fn lock(&self) -> EngineResult<std::sync::MutexGuard<'_, MaskingInner>> {
        self.inner
            .lock()
            .map_err(|_| EngineError::Internal("masking state lock poisoned".to_string()))
    }

    pub fn is_revealed(&self, key: &ColumnKey) -> bool {
        self.inner
            .lock()
            .map(|inner| inner.revealed.contains_key(key))
            .unwrap_or(false)
    }

    pub fn snapshot(&self) -> MaskingSnapshot {
        self.inner
            .lock()
            .map(|inner| MaskingSnapshot::with_revealed(inner.revealed.keys().cloned()))
            .unwrap_or_default()
    }

    /// Reveal every cell of a sensitive column.
    ///
    /// The disclosure event is emitted first; if the sink refuses it the
    /// column stays hidden and `AuditSinkUnavailable` is returned.
    pub fn reveal(
        &self,
        column: &Column,
        principal: &Principal,
        emergency: &EmergencyState,
        emitter: &AuditEmitter,
    ) -> EngineResult<RevealGrant> {
        if !can_see(column, principal, emergency) {
            tracing::warn!(principal = %principal.id, column = %column.key, "reveal denied");
            return Err(EngineError::access_denied(column.key.as_str()));
        }
        if !column.contains_sensitive_data() {
            return Err(EngineError::InvalidColumn(format!(
                "column '{}' holds no sensitive data to reveal",
                column.key
            )));
        }

        let emergency_override = relies_on_emergency(column, principal, emergency);
        let event = AuditEvent::new(AuditAction::Reveal, principal.id.clone())
            .with_tier(column.required_clearance)
            .with_emergency_override(emergency_override)
            .with_context("column", column.key.as_str());
        emitter.emit(&event, ActionClass::Disclosure)?;

        let mut inner = self.lock()?;
        let generation = inner.bump();
        let timer = self.schedule(&column.key, generation, emitter, &principal.id);
        let previous = inner.revealed.insert(
            column.key.clone(),
            RevealEntry {
                emergency_override,
                generation,
                principal_id: principal.id.clone(),
                emitter: emitter.clone(),
                timer,
            },
        );
        if let Some(mut previous) = previous {
            previous.cancel_timer();
        }

        tracing::info!(
            principal = %principal.id,
            column = %column.key,
            emergency_override,
            "column revealed"
        );
        Ok(RevealGrant {
            column_key: column.key.clone(),
            emergency_override,
        })
    }

    /// Mask a revealed column again. Returns false when it was not revealed,
    /// in which case nothing is emitted.
    pub fn hide(
        &self,
        key: &ColumnKey,
        principal: &Principal,
        emitter: &AuditEmitter,
    ) -> EngineResult<bool> {
        let removed = self.lock()?.revealed.remove(key);
        match removed {
            Some(mut entry) => {
                entry.cancel_timer();
                emit_hide(emitter, &principal.id, key, HideReason::Manual);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Record an interaction with a revealed column, restarting its idle
    /// timer. No-op for hidden columns or without an idle timeout.
    pub fn touch(&self, key: &ColumnKey) -> EngineResult<()> {
        if self.idle_timeout.is_none() {
            return Ok(());
        }
        let mut inner = self.lock()?;
        let generation = inner.bump();
        if let Some(entry) = inner.revealed.get_mut(key) {
            entry.cancel_timer();
            entry.generation = generation;
            entry.timer = self.schedule(key, generation, &entry.emitter, &entry.principal_id);
        }
        Ok(())
    }

    /// Hide every column that was revealed only through the emergency
    /// elevation. Returns the keys that were hidden.
    pub fn hide_emergency_reveals(
        &self,
        principal: &Principal,
        emitter: &AuditEmitter,
    ) -> EngineResult<Vec<ColumnKey>> {
        let mut hidden = Vec::new();
        {
            let mut inner = self.lock()?;
            let keys: Vec<ColumnKey> = inner
                .revealed
                .iter()
                .filter(|(_, entry)| entry.emergency_override)
                .map(|(key, _)| key.clone())
                .collect();
            for key in keys {
                if let Some(mut entry) = inner.revealed.remove(&key) {
                    entry.cancel_timer();
                    hidden.push(key);
                }
            }
        }
        hidden.sort();
        for key in &hidden {
            emit_hide(emitter, &principal.id, key, HideReason::EmergencyEnded);
        }
        if !hidden.is_empty() {
            tracing::info!(
                principal = %principal.id,
                count = hidden.len(),
                "hid reveals granted under emergency override"
            );
        }
        Ok(hidden)
    }

    fn schedule(
        &self,
        key: &ColumnKey,
        generation: u64,
        emitter: &AuditEmitter,
        principal_id: &PrincipalId,
    ) -> Option<JoinHandle<()>> {
        let timeout = self.idle_timeout?;
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                tracing::warn!(column = %key, "no tokio runtime; auto-hide not scheduled");
                return None;
            }
        };

        let inner = Arc::clone(&self.inner);
        let key = key.clone();
        let emitter = emitter.clone();
        let principal_id = principal_id.clone();
        Some(runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            let expired = match inner.lock() {
                Ok(mut guard) => guard.expire(&key, generation).is_some(),
                Err(_) => false,
            };
            if expired {
                tracing::info!(column = %key, "column hidden after idle timeout");
                emit_hide(&emitter, &principal_id, &key, HideReason::IdleTimeout);
            }
        }))
    }
}

impl Drop for MaskingStore {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.lock() {
            for entry in inner.revealed.values_mut() {
                entry.cancel_timer();
            }
        }
    }
}

impl std::fmt::Debug for MaskingStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaskingStore")
            .field("idle_timeout", &self.idle_timeout)
            .field("revealed", &self.snapshot())
            .finish()
    }
}

/// Hide events are fail-open.
fn emit_hide(emitter: &AuditEmitter, principal_id: &PrincipalId, key: &ColumnKey, reason: HideReason) {
    let event = AuditEvent::new(AuditAction::Hide, principal_id.clone())
        .with_context("column", key.as_str())
        .with_context("reason", reason.as_str());
    if let Err(e) = emitter.emit(&event, ActionClass::Navigational) {
        tracing::warn!(column = %key, error = %e, "hide event not recorded");
    }
}
