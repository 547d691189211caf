use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::{AuditAction, ClearanceTier, PrincipalId, Timestamp};

// ---------------------------------------------------------------------------
// AuditSink: the persistence collaborator behind the audit emitter
//
// Implementations must have durably accepted the event when `append`
// returns Ok. The engine decides per action whether a failure aborts.
// ---------------------------------------------------------------------------

pub trait AuditSink: Send + Sync {
    fn append(&self, event: &AuditEvent) -> Result<(), String>;
}

/// An append-only audit record. Emitted, never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub event_id: String,
    pub action: AuditAction,
    pub principal_id: PrincipalId,
    pub timestamp: Timestamp,
    pub compliance_tier: Option<ClearanceTier>,
    pub emergency_override: bool,
    #[serde(default)]
    pub context: BTreeMap<String, serde_json::Value>,
}

impl AuditEvent {
    pub fn new(action: AuditAction, principal_id: PrincipalId) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            action,
            principal_id,
            timestamp: Timestamp::now(),
            compliance_tier: None,
            emergency_override: false,
            context: BTreeMap::new(),
        }
    }

    pub fn with_tier(mut self, tier: ClearanceTier) -> Self {
        self.compliance_tier = Some(tier);
        self
    }

    pub fn with_emergency_override(mut self, emergency_override: bool) -> Self {
        self.emergency_override = emergency_override;
        self
    }

    pub fn with_context(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    pub fn context_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.context.get(key)
    }
}
