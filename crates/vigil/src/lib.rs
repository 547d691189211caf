//! Vigil Root Library
//!
//! Wires the engine together: configuration, the audit sink and emitter,
//! the process-wide emergency coordinator, and table sessions.
//!
//! # Architecture
//!
//! The root is a thin orchestrator. [`Engine`] owns the pieces shared by
//! every table view (the emitter and the emergency coordinator) and hands
//! out [`TableSession`]s, each holding its own masking and selection state
//! plus a receiver on the emergency broadcast.

pub mod config;
pub mod error;
pub mod source;

pub use config::{
    AuditConfig, AuditSinkConfig, ExportConfig, MaskingConfig, QueryConfig, RootConfig,
};
pub use error::{RootError, RootResult};
pub use source::TableSource;

use std::sync::Arc;
use tracing::info;

use vigil_audit::{AuditChain, AuditEmitter, JsonlAuditSink};
use vigil_core::{AuditSink, EmergencyState, Principal};
use vigil_emergency::EmergencyCoordinator;
use vigil_grid::{PageRequest, QueryRequest, TableSession};
use vigil_policy::Column;

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine {
    config: RootConfig,
    sink: Arc<dyn AuditSink>,
    emitter: AuditEmitter,
    emergency: EmergencyCoordinator,
}

impl Engine {
    /// Build an engine with the sink named in `config`.
    pub fn new(config: RootConfig) -> RootResult<Self> {
        let sink = open_sink(&config)?;
        Self::with_sink(config, sink)
    }

    /// Build an engine around a caller-supplied sink.
    pub fn with_sink(config: RootConfig, sink: Arc<dyn AuditSink>) -> RootResult<Self> {
        config.validate()?;
        let emitter = AuditEmitter::with_retry_policy(sink.clone(), config.retry_policy());
        let emergency = EmergencyCoordinator::new(emitter.clone());

        info!(
            sink = ?config.audit.sink,
            fail_open_retries = config.audit.fail_open_retries,
            idle_timeout_secs = ?config.masking.idle_timeout_secs,
            "vigil engine initialized"
        );
        Ok(Self {
            config,
            sink,
            emitter,
            emergency,
        })
    }

    pub fn config(&self) -> &RootConfig {
        &self.config
    }

    pub fn sink(&self) -> &Arc<dyn AuditSink> {
        &self.sink
    }

    pub fn emitter(&self) -> &AuditEmitter {
        &self.emitter
    }

    pub fn emergency(&self) -> &EmergencyCoordinator {
        &self.emergency
    }

    pub fn activate_emergency(&self, principal: &Principal) -> RootResult<EmergencyState> {
        Ok(self.emergency.activate(principal)?)
    }

    pub fn deactivate_emergency(&self, principal: &Principal) -> RootResult<EmergencyState> {
        Ok(self.emergency.deactivate(principal)?)
    }

    /// Open a table view for `principal`. Columns are validated here.
    pub fn open_session(
        &self,
        columns: Vec<Column>,
        principal: Principal,
    ) -> RootResult<TableSession> {
        let session = TableSession::open(
            columns,
            principal,
            self.emitter.clone(),
            self.emergency.subscribe(),
            self.config.session_options(),
        )?;
        Ok(session)
    }

    /// First page at the configured default size, no search, filter or sort.
    pub fn default_request(&self) -> QueryRequest {
        QueryRequest::new(PageRequest::first(self.config.query.default_page_size))
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("emergency", &self.emergency.state())
            .finish_non_exhaustive()
    }
}

fn open_sink(config: &RootConfig) -> RootResult<Arc<dyn AuditSink>> {
    let sink: Arc<dyn AuditSink> = match &config.audit.sink {
        AuditSinkConfig::Memory => Arc::new(AuditChain::new()),
        AuditSinkConfig::Jsonl { path } => Arc::new(JsonlAuditSink::open(path)?),
    };
    Ok(sink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vigil_core::{AuditAction, ClearanceTier, ColumnKey};

    fn make_columns() -> Vec<Column> {
        vec![
            Column::text("name", "Name").filterable(),
            Column::text("mrn", "MRN").sensitive(),
        ]
    }

    #[test]
    fn test_engine_defaults_to_memory_sink() {
        let engine = Engine::new(RootConfig::default()).unwrap();
        assert_eq!(engine.default_request().page.size, 25);
        assert!(!engine.emergency().is_active());
    }

    #[test]
    fn test_engine_rejects_invalid_config() {
        let mut config = RootConfig::default();
        config.export.max_records = 0;
        assert!(matches!(Engine::new(config), Err(RootError::Config(_))));
    }

    #[test]
    fn test_engine_writes_jsonl_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let mut config = RootConfig::default();
        config.audit.sink = AuditSinkConfig::Jsonl { path: path.clone() };

        let engine = Engine::new(config).unwrap();
        let mut session = engine
            .open_session(
                make_columns(),
                Principal::new("dr-okafor", ClearanceTier::Confidential),
            )
            .unwrap();
        session.reveal(&ColumnKey::new("mrn")).unwrap();

        let events = vigil_audit::read_events(&path).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, AuditAction::Reveal);
    }

    #[test]
    fn test_open_session_validates_columns() {
        let engine = Engine::new(RootConfig::default()).unwrap();
        let columns = vec![Column::text("name", "Name"), Column::text("name", "Name again")];
        let result = engine.open_session(columns, Principal::new("a", ClearanceTier::Public));
        assert!(matches!(result, Err(RootError::Engine(_))));
    }

    #[test]
    fn test_redundant_emergency_transition() {
        let engine = Engine::new(RootConfig::default()).unwrap();
        let p = Principal::new("charge-nurse", ClearanceTier::Restricted);
        assert!(engine.deactivate_emergency(&p).is_err());
        assert!(engine.activate_emergency(&p).unwrap().active);
    }
}
