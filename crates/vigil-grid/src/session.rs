//! One table view.
//!
//! The session owns what a list screen holds between interactions: the
//! validated column set, the principal, masking and selection state, and
//! the last query request. Each call first syncs with the emergency
//! broadcast, then does its work, then audits what changed.

use std::collections::BTreeSet;
use std::time::Duration;

use vigil_audit::{ActionClass, AuditEmitter, EmitOutcome};
use vigil_core::{
    AuditAction, AuditEvent, ColumnKey, EmergencyState, EngineError, EngineResult, Principal,
    Record, RecordId, SessionId, Timestamp,
};
use vigil_emergency::EmergencyWatch;
use vigil_policy::{
    compliance_tier, find_column, relies_on_emergency, validate_columns, Column, ColumnView,
};

use crate::export::{export_job, ExportFormat, ExportJob, ExportPayload, DEFAULT_MAX_EXPORT_RECORDS};
use crate::filter::{FilterState, PageRequest, QueryRequest};
use crate::masking::{MaskingSnapshot, MaskingStore, RevealGrant};
use crate::pipeline::{self, render_row, Page, Row};
use crate::selection::Selection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    /// Re-mask a revealed column after this long without interaction.
    pub idle_timeout: Option<Duration>,
    pub max_export_records: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            idle_timeout: None,
            max_export_records: DEFAULT_MAX_EXPORT_RECORDS,
        }
    }
}

pub struct TableSession {
    id: SessionId,
    columns: Vec<Column>,
    principal: Principal,
    masking: MaskingStore,
    selection: Selection,
    last_request: Option<QueryRequest>,
    emitter: AuditEmitter,
    emergency: EmergencyWatch,
    seen_activation: Option<Timestamp>,
    options: SessionOptions,
}

impl TableSession {
    /// Open a session. Rejects empty or duplicate column keys.
    pub fn open(
        columns: Vec<Column>,
        principal: Principal,
        emitter: AuditEmitter,
        mut emergency: EmergencyWatch,
        options: SessionOptions,
    ) -> EngineResult<Self> {
        validate_columns(&columns)?;
        let state = emergency.observe();
        let id = SessionId::new(uuid::Uuid::new_v4().to_string());
        tracing::debug!(
            session = %id,
            principal = %principal.id,
            columns = columns.len(),
            "table session opened"
        );
        Ok(Self {
            id,
            columns,
            principal,
            masking: MaskingStore::new(options.idle_timeout),
            selection: Selection::default(),
            last_request: None,
            emitter,
            emergency,
            seen_activation: state.activated_at,
            options,
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    pub fn last_request(&self) -> Option<&QueryRequest> {
        self.last_request.as_ref()
    }

    pub fn is_revealed(&self, key: &ColumnKey) -> bool {
        self.masking.is_revealed(key)
    }

    /// Latest emergency state. Reveals granted under an emergency that has
    /// since ended are hidden before this returns.
    pub fn emergency_state(&mut self) -> EngineResult<EmergencyState> {
        let state = self.emergency.observe();
        if self.seen_activation != state.activated_at {
            if self.seen_activation.is_some() {
                self.masking
                    .hide_emergency_reveals(&self.principal, &self.emitter)?;
            }
            self.seen_activation = state.activated_at;
        }
        Ok(state)
    }

    /// Columns the principal can currently see.
    pub fn visible_columns(&mut self) -> EngineResult<Vec<&Column>> {
        let state = self.emergency_state()?;
        Ok(vigil_policy::visible_columns(
            &self.columns,
            &self.principal,
            &state,
        ))
    }

    // -----------------------------------------------------------------------
    // Query
    // -----------------------------------------------------------------------

    /// Run the pipeline and audit what changed since the previous request.
    ///
    /// Nothing is emitted for an invalid request. A filter on a sensitive
    /// column is a disclosure: if its event is refused the page is withheld.
    /// While the view relies on the emergency elevation every query is
    /// audited as a disclosure, even when the request is unchanged.
    pub fn query(&mut self, records: &[Record], request: QueryRequest) -> EngineResult<Page> {
        let state = self.emergency_state()?;
        let masking = self.masking.snapshot();
        let page = pipeline::query(
            records,
            &self.columns,
            &self.principal,
            &state,
            &masking,
            &request.filter,
            request.sort.as_ref(),
            request.page,
        )?;

        let view = ColumnView::new(&self.columns, &self.principal, &state);
        let mut events = self.diff_events(&view, &request, page.total_matched)?;
        if view.emergency_override() {
            events.push((self.elevated_read_event(&view, &state, &page), ActionClass::Disclosure));
        }
        // fail-closed events first, so a refusal leaves nothing half-recorded
        events.sort_by_key(|(_, class)| !class.is_fail_closed());
        for (event, class) in events {
            self.emit(&event, class)?;
        }
        self.touch_request_columns(&request, &view, &masking)?;

        self.last_request = Some(request);
        Ok(page)
    }

    fn diff_events(
        &self,
        view: &ColumnView<'_>,
        request: &QueryRequest,
        total_matched: usize,
    ) -> EngineResult<Vec<(AuditEvent, ActionClass)>> {
        let previous = self.last_request.clone().unwrap_or_else(|| QueryRequest {
            page: PageRequest::first(request.page.size),
            ..QueryRequest::default()
        });
        let mut events = Vec::new();

        if previous.filter.search_query() != request.filter.search_query() {
            let event = self
                .event(AuditAction::Search, view)
                .with_context("query", request.filter.search_text.trim())
                .with_context("totalMatched", total_matched);
            events.push((event, ActionClass::Navigational));
        }

        if previous.filter.column_filters != request.filter.column_filters {
            let filtered: Vec<&Column> = request
                .filter
                .column_filters
                .keys()
                .filter_map(|key| find_column(&self.columns, key))
                .collect();
            let sensitive = filtered.iter().any(|c| c.contains_sensitive_data());
            let filters = serde_json::to_value(&request.filter.column_filters)
                .map_err(|e| EngineError::Internal(format!("failed to encode filters: {}", e)))?;
            let mut event = self
                .event(AuditAction::FilterChanged, view)
                .with_context(
                    "columns",
                    filtered.iter().map(|c| c.key.as_str()).collect::<Vec<_>>(),
                )
                .with_context("filters", filters)
                .with_context("totalMatched", total_matched);
            event.compliance_tier = compliance_tier(filtered.iter().copied());
            let class = if sensitive {
                ActionClass::Disclosure
            } else {
                ActionClass::Navigational
            };
            events.push((event, class));
        }

        if previous.sort != request.sort {
            let mut event = self.event(AuditAction::SortChanged, view);
            event = match &request.sort {
                Some(sort) => event
                    .with_context("column", sort.column_key.as_str())
                    .with_context("direction", sort.direction.to_string()),
                None => event.with_context("column", serde_json::Value::Null),
            };
            events.push((event, ActionClass::Navigational));
        }

        if previous.page != request.page {
            let event = self
                .event(AuditAction::PageChanged, view)
                .with_context("pageIndex", request.page.index)
                .with_context("pageSize", request.page.size)
                .with_context("previousPageIndex", previous.page.index);
            events.push((event, ActionClass::Navigational));
        }

        Ok(events)
    }

    fn elevated_read_event(
        &self,
        view: &ColumnView<'_>,
        state: &EmergencyState,
        page: &Page,
    ) -> AuditEvent {
        let elevated: Vec<&str> = view
            .columns()
            .iter()
            .filter(|c| relies_on_emergency(c, &self.principal, state))
            .map(|c| c.key.as_str())
            .collect();
        let record_ids: Vec<&str> = page.records.iter().map(|r| r.record_id.as_str()).collect();
        self.event(AuditAction::RecordsViewed, view)
            .with_context("elevatedColumns", elevated)
            .with_context("recordIds", record_ids)
            .with_context("pageIndex", page.page_index)
            .with_context("totalMatched", page.total_matched)
    }

    /// Interaction keeps revealed columns alive: filtered and sorted columns,
    /// plus every revealed column a search reads.
    fn touch_request_columns(
        &self,
        request: &QueryRequest,
        view: &ColumnView<'_>,
        masking: &MaskingSnapshot,
    ) -> EngineResult<()> {
        let mut keys: BTreeSet<&ColumnKey> = request.filter.column_filters.keys().collect();
        if let Some(sort) = &request.sort {
            keys.insert(&sort.column_key);
        }
        if request.filter.search_query().is_some() {
            keys.extend(
                view.columns()
                    .iter()
                    .filter(|c| c.is_filterable() && masking.is_revealed(&c.key))
                    .map(|c| &c.key),
            );
        }
        for key in keys {
            self.masking.touch(key)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Masking
    // -----------------------------------------------------------------------

    pub fn reveal(&mut self, key: &ColumnKey) -> EngineResult<RevealGrant> {
        let state = self.emergency_state()?;
        let column = find_column(&self.columns, key)
            .ok_or_else(|| EngineError::InvalidColumn(format!("unknown column '{}'", key)))?;
        self.masking
            .reveal(column, &self.principal, &state, &self.emitter)
    }

    pub fn hide(&mut self, key: &ColumnKey) -> EngineResult<bool> {
        self.emergency_state()?;
        self.masking.hide(key, &self.principal, &self.emitter)
    }

    // -----------------------------------------------------------------------
    // Selection
    // -----------------------------------------------------------------------

    pub fn toggle_selection(&mut self, id: RecordId) -> EngineResult<bool> {
        let state = self.emergency_state()?;
        let selected = self.selection.toggle(id.clone());
        let view = ColumnView::new(&self.columns, &self.principal, &state);
        let event = self
            .event(AuditAction::SelectionChanged, &view)
            .with_context("mode", self.selection.mode())
            .with_context("recordId", id.as_str())
            .with_context("selected", selected);
        self.emit(&event, ActionClass::Navigational)?;
        Ok(selected)
    }

    pub fn select_all(&mut self) -> EngineResult<()> {
        self.selection.select_all();
        self.audit_selection_mode()
    }

    pub fn clear_selection(&mut self) -> EngineResult<()> {
        self.selection.clear();
        self.audit_selection_mode()
    }

    fn audit_selection_mode(&mut self) -> EngineResult<()> {
        let state = self.emergency_state()?;
        let view = ColumnView::new(&self.columns, &self.principal, &state);
        let event = self
            .event(AuditAction::SelectionChanged, &view)
            .with_context("mode", self.selection.mode());
        self.emit(&event, ActionClass::Navigational)?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Export and row view
    // -----------------------------------------------------------------------

    /// Export the current selection under the last query's filter and sort.
    pub fn export(&mut self, records: &[Record], format: ExportFormat) -> EngineResult<ExportPayload> {
        let state = self.emergency_state()?;
        let masking = self.masking.snapshot();
        let default_filter = FilterState::default();
        let (filter, sort) = match &self.last_request {
            Some(request) => (&request.filter, request.sort.as_ref()),
            None => (&default_filter, None),
        };
        let job = ExportJob {
            principal: &self.principal,
            emergency: &state,
            masking: &masking,
            selection: &self.selection,
            filter,
            sort,
            format,
            max_records: self.options.max_export_records,
        };
        export_job(records, &self.columns, &job, &self.emitter)
    }

    /// Render one record for a detail view. `None` when the record is not
    /// in `records`; nothing is emitted then.
    ///
    /// Showing a row with revealed sensitive cells, or with columns only the
    /// emergency elevation makes visible, is a disclosure.
    pub fn view_row(&mut self, records: &[Record], id: &RecordId) -> EngineResult<Option<Row>> {
        let state = self.emergency_state()?;
        let Some(record) = records.iter().find(|r| &r.record_id == id) else {
            return Ok(None);
        };

        let masking = self.masking.snapshot();
        let view = ColumnView::new(&self.columns, &self.principal, &state);
        let revealed: Vec<&Column> = view
            .columns()
            .iter()
            .copied()
            .filter(|c| c.contains_sensitive_data() && masking.is_revealed(&c.key))
            .collect();

        let event = self
            .event(AuditAction::RowViewed, &view)
            .with_context("recordId", id.as_str())
            .with_context(
                "revealedColumns",
                revealed.iter().map(|c| c.key.as_str()).collect::<Vec<_>>(),
            );
        let class = if revealed.is_empty() && !view.emergency_override() {
            ActionClass::Navigational
        } else {
            ActionClass::Disclosure
        };
        self.emit(&event, class)?;

        for column in &revealed {
            self.masking.touch(&column.key)?;
        }
        Ok(Some(render_row(&view, &masking, record)))
    }

    // -----------------------------------------------------------------------
    // Audit helpers
    // -----------------------------------------------------------------------

    fn event(&self, action: AuditAction, view: &ColumnView<'_>) -> AuditEvent {
        let mut event = AuditEvent::new(action, self.principal.id.clone())
            .with_emergency_override(view.emergency_override())
            .with_context("sessionId", self.id.as_str());
        event.compliance_tier = view.compliance_tier();
        event
    }

    fn emit(&self, event: &AuditEvent, class: ActionClass) -> EngineResult<()> {
        match self.emitter.emit(event, class)? {
            EmitOutcome::Recorded => {}
            EmitOutcome::Dropped { attempts } => {
                tracing::debug!(
                    session = %self.id,
                    action = %event.action,
                    attempts,
                    "audit event dropped"
                );
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for TableSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableSession")
            .field("id", &self.id)
            .field("principal", &self.principal.id)
            .field("columns", &self.columns.len())
            .field("selection", &self.selection.mode())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vigil_audit::testing::FlakySink;
    use vigil_core::ClearanceTier;
    use vigil_emergency::EmergencyCoordinator;

    use crate::filter::{FilterValue, SortDescriptor};
    use crate::pipeline::Cell;

    struct Fixture {
        sink: Arc<FlakySink>,
        emitter: AuditEmitter,
        coordinator: EmergencyCoordinator,
    }

    fn make_fixture() -> Fixture {
        let sink = Arc::new(FlakySink::new());
        let emitter = AuditEmitter::new(sink.clone());
        let coordinator = EmergencyCoordinator::new(emitter.clone());
        Fixture {
            sink,
            emitter,
            coordinator,
        }
    }

    fn make_columns() -> Vec<Column> {
        vec![
            Column::text("name", "Name").sortable().filterable(),
            Column::text("mrn", "MRN").filterable().sensitive(),
            Column::text("diagnosis", "Diagnosis")
                .filterable()
                .sensitive()
                .requires(ClearanceTier::Confidential),
        ]
    }

    fn make_records() -> Vec<Record> {
        vec![
            Record::new("1")
                .with("name", "Ada")
                .with("mrn", "MRN-12345")
                .with("diagnosis", "asthma"),
            Record::new("2")
                .with("name", "Bo")
                .with("mrn", "MRN-67890")
                .with("diagnosis", "fracture"),
        ]
    }

    fn open(fixture: &Fixture, clearance: ClearanceTier) -> TableSession {
        open_with(fixture, clearance, SessionOptions::default())
    }

    fn open_with(
        fixture: &Fixture,
        clearance: ClearanceTier,
        options: SessionOptions,
    ) -> TableSession {
        TableSession::open(
            make_columns(),
            Principal::new("user-1", clearance),
            fixture.emitter.clone(),
            fixture.coordinator.subscribe(),
            options,
        )
        .unwrap()
    }

    fn events_of(sink: &FlakySink, action: AuditAction) -> Vec<AuditEvent> {
        sink.events().into_iter().filter(|e| e.action == action).collect()
    }

    async fn settle() {
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }

    fn actions(sink: &FlakySink) -> Vec<AuditAction> {
        sink.events().iter().map(|e| e.action).collect()
    }

    #[test]
    fn test_open_rejects_duplicate_columns() {
        let fixture = make_fixture();
        let columns = vec![Column::text("name", "Name"), Column::text("name", "Again")];
        let result = TableSession::open(
            columns,
            Principal::new("user-1", ClearanceTier::Public),
            fixture.emitter.clone(),
            fixture.coordinator.subscribe(),
            SessionOptions::default(),
        );
        assert!(matches!(result, Err(EngineError::InvalidColumn(_))));
    }

    #[test]
    fn test_query_audits_only_what_changed() {
        let fixture = make_fixture();
        let mut session = open(&fixture, ClearanceTier::Restricted);
        let records = make_records();

        session.query(&records, QueryRequest::default()).unwrap();
        assert!(fixture.sink.events().is_empty());

        let searched = QueryRequest::default().with_filter(FilterState::new().with_search("ada"));
        let page = session.query(&records, searched.clone()).unwrap();
        assert_eq!(page.total_matched, 1);
        session.query(&records, searched.clone()).unwrap();
        assert_eq!(actions(&fixture.sink), vec![AuditAction::Search]);

        let sorted = searched.with_sort(SortDescriptor::desc("name"));
        session.query(&records, sorted.clone()).unwrap();
        let paged = QueryRequest {
            page: PageRequest::new(1, sorted.page.size),
            ..sorted
        };
        session.query(&records, paged).unwrap();
        assert_eq!(
            actions(&fixture.sink),
            vec![
                AuditAction::Search,
                AuditAction::SortChanged,
                AuditAction::PageChanged
            ]
        );
    }

    #[test]
    fn test_invalid_request_emits_nothing_and_keeps_last_request() {
        let fixture = make_fixture();
        let mut session = open(&fixture, ClearanceTier::Restricted);
        let request = QueryRequest::default().with_sort(SortDescriptor::asc("diagnosis"));
        let err = session.query(&make_records(), request).unwrap_err();
        assert_eq!(err, EngineError::access_denied("diagnosis"));
        assert!(fixture.sink.events().is_empty());
        assert!(session.last_request().is_none());
    }

    #[test]
    fn test_sensitive_filter_is_fail_closed() {
        let fixture = make_fixture();
        let mut session = open(&fixture, ClearanceTier::Restricted);
        let records = make_records();
        session.reveal(&ColumnKey::new("mrn")).unwrap();

        fixture.sink.set_unavailable(true);
        let on_name = QueryRequest::default()
            .with_filter(FilterState::new().with_filter("name", FilterValue::Contains("a".into())));
        assert!(session.query(&records, on_name).is_ok());

        let on_mrn = QueryRequest::default().with_filter(
            FilterState::new().with_filter("mrn", FilterValue::Contains("123".into())),
        );
        let err = session.query(&records, on_mrn.clone()).unwrap_err();
        assert!(matches!(err, EngineError::AuditSinkUnavailable(_)));

        fixture.sink.set_unavailable(false);
        let page = session.query(&records, on_mrn).unwrap();
        assert_eq!(page.total_matched, 1);
        let filter_event = fixture.sink.events().pop().unwrap();
        assert_eq!(filter_event.action, AuditAction::FilterChanged);
        assert_eq!(filter_event.compliance_tier, Some(ClearanceTier::Public));
    }

    #[test]
    fn test_view_row_class_depends_on_revealed_cells() {
        let fixture = make_fixture();
        let mut session = open(&fixture, ClearanceTier::Restricted);
        let records = make_records();
        let id = RecordId::new("1");

        let row = session.view_row(&records, &id).unwrap().unwrap();
        assert!(row.get(&ColumnKey::new("mrn")).unwrap().is_masked());
        assert!(session.view_row(&records, &RecordId::new("9")).unwrap().is_none());

        session.reveal(&ColumnKey::new("mrn")).unwrap();
        fixture.sink.set_unavailable(true);
        let err = session.view_row(&records, &id).unwrap_err();
        assert!(matches!(err, EngineError::AuditSinkUnavailable(_)));

        fixture.sink.set_unavailable(false);
        let row = session.view_row(&records, &id).unwrap().unwrap();
        assert_eq!(
            row.get(&ColumnKey::new("mrn")),
            Some(&Cell::Value("MRN-12345".into()))
        );
    }

    #[test]
    fn test_selection_and_export_use_last_filter() {
        let fixture = make_fixture();
        let mut session = open(&fixture, ClearanceTier::Restricted);
        let records = make_records();

        let request = QueryRequest::default()
            .with_filter(FilterState::new().with_filter("name", FilterValue::Equals("bo".into())));
        session.query(&records, request).unwrap();
        session.select_all().unwrap();

        let payload = session.export(&records, ExportFormat::Csv).unwrap();
        assert_eq!(payload.rows.len(), 1);
        assert_eq!(payload.rows[0].record_id, RecordId::new("2"));
        assert!(!payload.metadata.selected_only);

        assert!(!session.toggle_selection(RecordId::new("2")).unwrap());
        let payload = session.export(&records, ExportFormat::Pdf).unwrap();
        assert!(payload.rows.is_empty());
        assert!(payload.metadata.selected_only);

        assert!(actions(&fixture.sink).contains(&AuditAction::SelectionChanged));
    }

    #[test]
    fn test_emergency_override_lifecycle() {
        let fixture = make_fixture();
        let mut session = open(&fixture, ClearanceTier::Restricted);
        let diagnosis = ColumnKey::new("diagnosis");
        let charge = Principal::new("charge-nurse", ClearanceTier::Restricted);

        assert!(!session.visible_columns().unwrap().iter().any(|c| c.key == diagnosis));

        fixture.coordinator.activate(&charge).unwrap();
        assert!(session.visible_columns().unwrap().iter().any(|c| c.key == diagnosis));
        let grant = session.reveal(&diagnosis).unwrap();
        assert!(grant.emergency_override);
        let reveal = fixture.sink.events().pop().unwrap();
        assert!(reveal.emergency_override);

        fixture.coordinator.deactivate(&charge).unwrap();
        assert!(!session.visible_columns().unwrap().iter().any(|c| c.key == diagnosis));
        assert!(!session.is_revealed(&diagnosis));
        let hide = fixture.sink.events().pop().unwrap();
        assert_eq!(hide.action, AuditAction::Hide);
        assert_eq!(hide.context_value("reason"), Some(&"emergency_ended".into()));
    }

    #[test]
    fn test_elevated_query_is_audited_even_when_unchanged() {
        let fixture = make_fixture();
        let mut session = open(&fixture, ClearanceTier::Restricted);
        let records = make_records();
        let charge = Principal::new("charge-nurse", ClearanceTier::Restricted);

        session.query(&records, QueryRequest::default()).unwrap();
        assert!(events_of(&fixture.sink, AuditAction::RecordsViewed).is_empty());

        fixture.coordinator.activate(&charge).unwrap();
        let page = session.query(&records, QueryRequest::default()).unwrap();
        assert!(page.columns.contains(&ColumnKey::new("diagnosis")));
        session.query(&records, QueryRequest::default()).unwrap();

        let reads = events_of(&fixture.sink, AuditAction::RecordsViewed);
        assert_eq!(reads.len(), 2);
        assert!(reads.iter().all(|e| e.emergency_override));
        assert_eq!(reads[0].compliance_tier, Some(ClearanceTier::Confidential));
        assert_eq!(
            reads[0].context_value("elevatedColumns"),
            Some(&serde_json::json!(["diagnosis"]))
        );
        assert_eq!(
            reads[0].context_value("recordIds"),
            Some(&serde_json::json!(["1", "2"]))
        );
        assert!(events_of(&fixture.sink, AuditAction::PageChanged).is_empty());

        fixture.sink.set_unavailable(true);
        let err = session.query(&records, QueryRequest::default()).unwrap_err();
        assert!(matches!(err, EngineError::AuditSinkUnavailable(_)));

        fixture.sink.set_unavailable(false);
        fixture.coordinator.deactivate(&charge).unwrap();
        session.query(&records, QueryRequest::default()).unwrap();
        assert_eq!(events_of(&fixture.sink, AuditAction::RecordsViewed).len(), 2);
    }

    #[test]
    fn test_cleared_principal_reads_without_override() {
        let fixture = make_fixture();
        let mut session = open(&fixture, ClearanceTier::Confidential);
        let charge = Principal::new("charge-nurse", ClearanceTier::Restricted);
        fixture.coordinator.activate(&charge).unwrap();

        session.query(&make_records(), QueryRequest::default()).unwrap();
        assert!(events_of(&fixture.sink, AuditAction::RecordsViewed).is_empty());
    }

    #[test]
    fn test_elevated_row_view_is_fail_closed() {
        let fixture = make_fixture();
        let mut session = open(&fixture, ClearanceTier::Restricted);
        let records = make_records();
        let id = RecordId::new("2");
        fixture
            .coordinator
            .activate(&Principal::new("charge-nurse", ClearanceTier::Restricted))
            .unwrap();

        fixture.sink.set_unavailable(true);
        let err = session.view_row(&records, &id).unwrap_err();
        assert!(matches!(err, EngineError::AuditSinkUnavailable(_)));

        fixture.sink.set_unavailable(false);
        let row = session.view_row(&records, &id).unwrap().unwrap();
        assert!(row.get(&ColumnKey::new("diagnosis")).unwrap().is_masked());
        let viewed = events_of(&fixture.sink, AuditAction::RowViewed);
        assert!(viewed[0].emergency_override);
    }

    #[tokio::test(start_paused = true)]
    async fn test_search_keeps_revealed_columns_alive() {
        let fixture = make_fixture();
        let options = SessionOptions {
            idle_timeout: Some(Duration::from_secs(60)),
            ..SessionOptions::default()
        };
        let mut session = open_with(&fixture, ClearanceTier::Restricted, options);
        let records = make_records();
        let mrn = ColumnKey::new("mrn");
        session.reveal(&mrn).unwrap();

        tokio::time::advance(Duration::from_secs(40)).await;
        let searched = QueryRequest::default().with_filter(FilterState::new().with_search("12345"));
        let page = session.query(&records, searched).unwrap();
        assert_eq!(page.total_matched, 1);

        tokio::time::advance(Duration::from_secs(40)).await;
        settle().await;
        assert!(session.is_revealed(&mrn));

        tokio::time::advance(Duration::from_secs(21)).await;
        settle().await;
        assert!(!session.is_revealed(&mrn));
    }
}
