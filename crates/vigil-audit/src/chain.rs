use sha2::{Digest, Sha256};
use std::sync::Mutex;
use vigil_core::{AuditEvent, AuditSink};

use crate::error::{AuditError, AuditResult};

/// Hash-chained, append-only in-memory audit sink.
///
/// Each entry's hash covers the previous entry's hash and the event's JSON,
/// so editing or dropping an entry breaks `verify_chain`.
pub struct AuditChain {
    entries: Mutex<Vec<ChainEntry>>,
}

#[derive(Debug, Clone)]
pub struct ChainEntry {
    pub event: AuditEvent,
    pub hash: [u8; 32],
}

impl ChainEntry {
    pub fn hash_hex(&self) -> String {
        hex::encode(self.hash)
    }
}

impl AuditChain {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }

    fn compute_hash(event: &AuditEvent, previous: Option<&[u8; 32]>) -> AuditResult<[u8; 32]> {
        let event_json = serde_json::to_vec(event)
            .map_err(|e| AuditError::Serialization(format!("failed to serialize event: {}", e)))?;

        let mut hasher = Sha256::new();
        if let Some(prev) = previous {
            hasher.update(prev);
        }
        hasher.update(&event_json);
        let digest = hasher.finalize();
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&digest);
        Ok(hash)
    }

    /// Append an event and return the hex-encoded entry hash.
    pub fn record(&self, event: &AuditEvent) -> AuditResult<String> {
        let mut entries = self.entries.lock().map_err(|_| AuditError::LockPoisoned)?;
        let hash = Self::compute_hash(event, entries.last().map(|e| &e.hash))?;
        entries.push(ChainEntry {
            event: event.clone(),
            hash,
        });
        Ok(hex::encode(hash))
    }

    /// Recompute every hash from the genesis entry.
    pub fn verify_chain(&self) -> AuditResult<bool> {
        let entries = self.entries.lock().map_err(|_| AuditError::LockPoisoned)?;
        let mut previous: Option<[u8; 32]> = None;
        for entry in entries.iter() {
            let expected = Self::compute_hash(&entry.event, previous.as_ref())?;
            if expected != entry.hash {
                return Ok(false);
            }
            previous = Some(entry.hash);
        }
        Ok(true)
    }

    pub fn head(&self) -> Option<String> {
        self.entries
            .lock()
            .ok()
            .and_then(|e| e.last().map(ChainEntry::hash_hex))
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.entries
            .lock()
            .map(|e| e.iter().map(|entry| entry.event.clone()).collect())
            .unwrap_or_default()
    }

    pub fn entries(&self) -> AuditResult<Vec<ChainEntry>> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .map_err(|_| AuditError::LockPoisoned)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn tamper(&self, index: usize, f: impl FnOnce(&mut AuditEvent)) {
        let mut entries = self.entries.lock().unwrap();
        f(&mut entries[index].event);
    }
}

impl Default for AuditChain {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for AuditChain {
    fn append(&self, event: &AuditEvent) -> Result<(), String> {
        self.record(event).map(|_| ()).map_err(|e| e.to_string())
    }
}
