use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use vigil_core::{AuditEvent, AuditSink};

use crate::error::{AuditError, AuditResult};

/// Append-only JSON-lines audit log on disk. One event per line, flushed
/// before `append` returns.
pub struct JsonlAuditSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlAuditSink {
    pub fn open(path: impl AsRef<Path>) -> AuditResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        tracing::info!(path = %path.display(), "opened audit log");
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_event(&self, event: &AuditEvent) -> AuditResult<()> {
        let mut line = serde_json::to_vec(event)
            .map_err(|e| AuditError::Serialization(format!("failed to serialize event: {}", e)))?;
        line.push(b'\n');

        let mut file = self.file.lock().map_err(|_| AuditError::LockPoisoned)?;
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }
}

impl AuditSink for JsonlAuditSink {
    fn append(&self, event: &AuditEvent) -> Result<(), String> {
        self.write_event(event).map_err(|e| e.to_string())
    }
}

/// Read every event of a JSON-lines audit log. Blank lines are skipped.
pub fn read_events(path: impl AsRef<Path>) -> AuditResult<Vec<AuditEvent>> {
    let file = File::open(path.as_ref())?;
    let mut events = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: AuditEvent = serde_json::from_str(&line).map_err(|e| {
            AuditError::Serialization(format!("line {}: {}", index + 1, e))
        })?;
        events.push(event);
    }
    Ok(events)
}
