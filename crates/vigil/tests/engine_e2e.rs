//! End-to-end: one ward's patient list, driven through the root engine.
//!
//! 1. Each clearance tier sees a superset of the tier below it
//! 2. Sorting keeps equal keys in input order
//! 3. Masked values never match a search until revealed
//! 4. Pagination covers every match exactly once
//! 5. Export is scoped to the selection and the visible columns, and its
//!    payload carries full column definitions
//! 6. Emergency mode elevates and is revoked on deactivation; every read
//!    that relies on it is audited
//! 7. The audit sink gates every disclosure
//! 8. Idle reveals are masked again after the configured timeout

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use vigil::{Engine, RootConfig};
use vigil_audit::testing::FlakySink;
use vigil_core::{
    AuditAction, AuditEvent, AuditSink, ClearanceTier, ColumnKey, EngineError, Principal, Record,
    RecordId,
};
use vigil_grid::{ExportFormat, FilterState, PageRequest, QueryRequest, SortDescriptor};
use vigil_policy::Column;

fn ward_columns() -> Vec<Column> {
    vec![
        Column::text("name", "Name").sortable().filterable(),
        Column::custom("acuity", "Acuity").sortable(),
        Column::text("mrn", "MRN").filterable().sensitive(),
        Column::text("room", "Room").requires(ClearanceTier::Restricted),
        Column::text("diagnosis", "Diagnosis")
            .requires(ClearanceTier::Confidential)
            .sensitive(),
        Column::text("next_of_kin", "Next of kin").requires(ClearanceTier::Emergency),
    ]
}

fn make_engine(config: RootConfig) -> (Engine, Arc<FlakySink>) {
    let sink = Arc::new(FlakySink::new());
    let engine = Engine::with_sink(config, sink.clone() as Arc<dyn AuditSink>).unwrap();
    (engine, sink)
}

fn nurse() -> Principal {
    Principal::new("nurse-adeyemi", ClearanceTier::Public)
}

fn request(size: usize) -> QueryRequest {
    QueryRequest::new(PageRequest::first(size))
}

fn events_of(sink: &FlakySink, action: AuditAction) -> Vec<AuditEvent> {
    sink.events()
        .into_iter()
        .filter(|e| e.action == action)
        .collect()
}

fn ids(page: &vigil_grid::Page) -> Vec<&str> {
    page.records.iter().map(|r| r.record_id.as_str()).collect()
}

// ============================================================================
// 1: clearance monotonicity
// ============================================================================

#[test]
fn test_higher_clearance_sees_a_superset() {
    let (engine, _) = make_engine(RootConfig::default());
    let tiers = [
        ClearanceTier::Public,
        ClearanceTier::Restricted,
        ClearanceTier::Confidential,
        ClearanceTier::Emergency,
    ];

    let mut previous: Option<BTreeSet<ColumnKey>> = None;
    for tier in tiers {
        let mut session = engine
            .open_session(ward_columns(), Principal::new("staff", tier))
            .unwrap();
        let visible: BTreeSet<ColumnKey> = session
            .visible_columns()
            .unwrap()
            .into_iter()
            .map(|c| c.key.clone())
            .collect();
        if let Some(lower) = &previous {
            assert!(lower.is_subset(&visible), "{} lost columns", tier);
            assert!(lower.len() < visible.len(), "{} gained nothing", tier);
        }
        previous = Some(visible);
    }
    assert_eq!(previous.unwrap().len(), ward_columns().len());
}

// ============================================================================
// 2: stable sort
// ============================================================================

#[test]
fn test_sort_keeps_ties_in_input_order() {
    let (engine, _) = make_engine(RootConfig::default());
    let records = vec![
        Record::new("A").with("acuity", 5.0),
        Record::new("B").with("acuity", 5.0),
        Record::new("C").with("acuity", 1.0),
    ];
    let mut session = engine.open_session(ward_columns(), nurse()).unwrap();

    let page = session
        .query(&records, request(10).with_sort(SortDescriptor::asc("acuity")))
        .unwrap();
    assert_eq!(ids(&page), vec!["C", "A", "B"]);

    let page = session
        .query(&records, request(10).with_sort(SortDescriptor::desc("acuity")))
        .unwrap();
    assert_eq!(ids(&page), vec!["A", "B", "C"]);
}

// ============================================================================
// 3: masked values are not searchable
// ============================================================================

#[test]
fn test_search_ignores_masked_values_until_revealed() {
    let (engine, sink) = make_engine(RootConfig::default());
    let records = vec![
        Record::new("p-1")
            .with("name", "Ines Duarte")
            .with("mrn", "MRN-12345"),
        Record::new("p-2").with("name", "Tomas Berg").with("mrn", "MRN-67890"),
    ];
    let mut session = engine.open_session(ward_columns(), nurse()).unwrap();
    let search = |text: &str| request(10).with_filter(FilterState::new().with_search(text));

    let page = session.query(&records, search("12345")).unwrap();
    assert_eq!(page.total_matched, 0);

    let grant = session.reveal(&ColumnKey::new("mrn")).unwrap();
    assert!(!grant.emergency_override);

    // same normalized query, so no second search event
    let page = session.query(&records, search(" 12345 ")).unwrap();
    assert_eq!(ids(&page), vec!["p-1"]);

    let events = sink.events();
    let reveal = events
        .iter()
        .find(|e| e.action == AuditAction::Reveal)
        .unwrap();
    assert_eq!(reveal.principal_id.as_str(), "nurse-adeyemi");
    assert_eq!(reveal.context_value("column"), Some(&"mrn".into()));
    assert_eq!(
        events.iter().filter(|e| e.action == AuditAction::Search).count(),
        1
    );
}

// ============================================================================
// 4: pagination
// ============================================================================

#[test]
fn test_pages_cover_every_match_once() {
    let (engine, _) = make_engine(RootConfig::default());
    let records: Vec<Record> = (0..23)
        .map(|i| Record::new(format!("r{:02}", i)).with("name", format!("Patient {}", i)))
        .collect();
    let mut session = engine.open_session(ward_columns(), nurse()).unwrap();

    let mut seen = Vec::new();
    let mut sizes = Vec::new();
    for index in 0..4 {
        let page = session
            .query(&records, QueryRequest::new(PageRequest::new(index, 10)))
            .unwrap();
        assert_eq!(page.total_matched, 23);
        assert_eq!(page.page_count, 3);
        sizes.push(page.records.len());
        seen.extend(page.records.into_iter().map(|r| r.record_id));
    }
    assert_eq!(sizes, vec![10, 10, 3, 0]);

    let expected: Vec<RecordId> = records.iter().map(|r| r.record_id.clone()).collect();
    assert_eq!(seen, expected);
}

// ============================================================================
// 5: export scoping
// ============================================================================

#[test]
fn test_export_is_scoped_to_selection_and_visible_columns() {
    let (engine, sink) = make_engine(RootConfig::default());
    let records: Vec<Record> = (1..=6)
        .map(|i| {
            Record::new(i.to_string())
                .with("name", format!("Patient {}", i))
                .with("mrn", format!("MRN-{}", i))
                .with("diagnosis", "withheld from this principal")
        })
        .collect();
    let mut session = engine.open_session(ward_columns(), nurse()).unwrap();
    session.toggle_selection(RecordId::new("2")).unwrap();
    session.toggle_selection(RecordId::new("5")).unwrap();

    let payload = session.export(&records, ExportFormat::Csv).unwrap();
    let exported: Vec<&str> = payload.rows.iter().map(|r| r.record_id.as_str()).collect();
    assert_eq!(exported, vec!["2", "5"]);
    assert!(payload.metadata.selected_only);
    assert_eq!(payload.metadata.record_count, 2);

    let keys: Vec<&str> = payload.columns.iter().map(|c| c.key.as_str()).collect();
    assert_eq!(keys, vec!["name", "acuity", "mrn"]);
    assert!(payload.rows[0].get(&ColumnKey::new("mrn")).unwrap().is_masked());

    let csv = payload.to_csv();
    assert!(csv.starts_with("Name,Acuity,MRN\r\n"));
    assert!(!csv.contains("withheld"));
    assert!(!csv.contains("MRN-2"));

    let exports: Vec<_> = sink
        .events()
        .into_iter()
        .filter(|e| e.action == AuditAction::Export)
        .collect();
    assert_eq!(exports.len(), 1);
    assert_eq!(exports[0].context_value("recordCount"), Some(&2.into()));
    assert_eq!(exports[0].context_value("selectedOnly"), Some(&true.into()));
}

#[test]
fn test_export_payload_serializes_columns_and_metadata() {
    let (engine, sink) = make_engine(RootConfig::default());
    let records = vec![Record::new("p-1")
        .with("name", "Ines Duarte")
        .with("acuity", 3i64)
        .with("next_of_kin", "Rui Duarte")];
    engine
        .activate_emergency(&Principal::new("charge-nurse", ClearanceTier::Restricted))
        .unwrap();
    let mut session = engine.open_session(ward_columns(), nurse()).unwrap();

    let payload = session.export(&records, ExportFormat::Pdf).unwrap();
    let json = serde_json::to_value(&payload).unwrap();

    let columns = json["columns"].as_array().unwrap();
    assert_eq!(columns.len(), 6);
    let acuity = &columns[1];
    assert_eq!(acuity["key"], "acuity");
    assert_eq!(acuity["renderKind"], "custom");
    assert_eq!(acuity["requiredClearance"], "public");
    assert_eq!(acuity["sortable"], true);
    assert_eq!(acuity["filterable"], false);
    assert_eq!(acuity["containsSensitiveData"], false);
    let next_of_kin = &columns[5];
    assert_eq!(next_of_kin["requiredClearance"], "emergency");
    assert_eq!(columns[2]["containsSensitiveData"], true);

    let metadata = json["metadata"].as_object().unwrap();
    let mut keys: Vec<&str> = metadata.keys().map(|k| k.as_str()).collect();
    keys.sort_unstable();
    assert_eq!(
        keys,
        vec!["complianceTier", "generatedAt", "recordCount", "selectedOnly"]
    );
    assert_eq!(metadata["complianceTier"], "emergency");
    let generated_at = metadata["generatedAt"].as_str().unwrap();
    assert!(chrono::DateTime::parse_from_rfc3339(generated_at).is_ok());

    let export = sink
        .events()
        .into_iter()
        .find(|e| e.action == AuditAction::Export)
        .unwrap();
    assert!(export.emergency_override);
}

#[test]
fn test_export_over_limit_is_refused_before_auditing() {
    let mut config = RootConfig::default();
    config.export.max_records = 3;
    let (engine, sink) = make_engine(config);
    let records: Vec<Record> = (0..5).map(|i| Record::new(i.to_string())).collect();
    let mut session = engine.open_session(ward_columns(), nurse()).unwrap();
    session.select_all().unwrap();

    let before = sink.events().len();
    let result = session.export(&records, ExportFormat::Xlsx);
    assert!(matches!(
        result,
        Err(EngineError::ExportTooLarge {
            requested: 5,
            limit: 3
        })
    ));
    assert_eq!(sink.events().len(), before);
}

// ============================================================================
// 6: emergency override
// ============================================================================

#[test]
fn test_emergency_grants_then_revokes() {
    let (engine, sink) = make_engine(RootConfig::default());
    let diagnosis = ColumnKey::new("diagnosis");
    let charge_nurse = Principal::new("charge-nurse", ClearanceTier::Restricted);
    let mut session = engine.open_session(ward_columns(), nurse()).unwrap();

    let visible = |session: &mut vigil_grid::TableSession| -> Vec<ColumnKey> {
        session
            .visible_columns()
            .unwrap()
            .into_iter()
            .map(|c| c.key.clone())
            .collect()
    };
    assert!(!visible(&mut session).contains(&diagnosis));
    assert!(matches!(
        session.reveal(&diagnosis),
        Err(EngineError::AccessDenied { .. })
    ));

    engine.activate_emergency(&charge_nurse).unwrap();
    assert!(visible(&mut session).contains(&diagnosis));
    let grant = session.reveal(&diagnosis).unwrap();
    assert!(grant.emergency_override);

    let events = sink.events();
    let activation = events
        .iter()
        .find(|e| e.action == AuditAction::EmergencyModeChanged)
        .unwrap();
    assert_eq!(activation.principal_id.as_str(), "charge-nurse");
    let reveal = events.last().unwrap();
    assert_eq!(reveal.action, AuditAction::Reveal);
    assert!(reveal.emergency_override);
    assert_eq!(reveal.compliance_tier, Some(ClearanceTier::Confidential));

    engine.deactivate_emergency(&charge_nurse).unwrap();
    assert!(!visible(&mut session).contains(&diagnosis));
    assert!(!session.is_revealed(&diagnosis));

    let hide = sink
        .events()
        .into_iter()
        .rev()
        .find(|e| e.action == AuditAction::Hide)
        .unwrap();
    assert_eq!(hide.context_value("reason"), Some(&"emergency_ended".into()));
}

#[test]
fn test_emergency_reads_are_audited_on_every_query() {
    let (engine, sink) = make_engine(RootConfig::default());
    let charge_nurse = Principal::new("charge-nurse", ClearanceTier::Restricted);
    let records = vec![
        Record::new("p-1").with("name", "Ines Duarte").with("room", "4B"),
        Record::new("p-2").with("name", "Tomas Berg").with("room", "4C"),
    ];
    let mut session = engine.open_session(ward_columns(), nurse()).unwrap();

    session.query(&records, request(10)).unwrap();
    assert!(events_of(&sink, AuditAction::RecordsViewed).is_empty());

    engine.activate_emergency(&charge_nurse).unwrap();
    for _ in 0..2 {
        let page = session.query(&records, request(10)).unwrap();
        assert!(page.columns.contains(&ColumnKey::new("room")));
    }

    let audited = events_of(&sink, AuditAction::RecordsViewed);
    assert_eq!(audited.len(), 2);
    for event in &audited {
        assert!(event.emergency_override);
        assert_eq!(event.principal_id.as_str(), "nurse-adeyemi");
        assert_eq!(
            event.context_value("elevatedColumns"),
            Some(&serde_json::json!(["room", "diagnosis", "next_of_kin"]))
        );
        assert_eq!(
            event.context_value("recordIds"),
            Some(&serde_json::json!(["p-1", "p-2"]))
        );
    }

    // an elevated read the sink cannot record is not served
    sink.set_unavailable(true);
    assert!(matches!(
        session.query(&records, request(10)),
        Err(EngineError::AuditSinkUnavailable(_))
    ));
    sink.set_unavailable(false);

    engine.deactivate_emergency(&charge_nurse).unwrap();
    let page = session.query(&records, request(10)).unwrap();
    assert!(!page.columns.contains(&ColumnKey::new("room")));
    assert_eq!(events_of(&sink, AuditAction::RecordsViewed).len(), 2);
}

// ============================================================================
// 7: the sink gates disclosure
// ============================================================================

#[test]
fn test_unavailable_sink_blocks_disclosure_not_navigation() {
    let (engine, sink) = make_engine(RootConfig::default());
    let records = vec![Record::new("p-1").with("name", "Ines Duarte")];
    let mut session = engine.open_session(ward_columns(), nurse()).unwrap();

    sink.set_unavailable(true);
    assert!(matches!(
        session.reveal(&ColumnKey::new("mrn")),
        Err(EngineError::AuditSinkUnavailable(_))
    ));
    assert!(!session.is_revealed(&ColumnKey::new("mrn")));

    // navigational events are dropped after retrying, the page still renders
    let page = session
        .query(
            &records,
            request(10).with_filter(FilterState::new().with_search("ines")),
        )
        .unwrap();
    assert_eq!(page.total_matched, 1);

    sink.set_unavailable(false);
    session.reveal(&ColumnKey::new("mrn")).unwrap();
    assert!(session.is_revealed(&ColumnKey::new("mrn")));
}

// ============================================================================
// 8: idle auto-hide
// ============================================================================

async fn settle() {
    for _ in 0..4 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn test_configured_idle_timeout_masks_again() {
    let mut config = RootConfig::default();
    config.masking.idle_timeout_secs = Some(60);
    let (engine, sink) = make_engine(config);
    let mut session = engine.open_session(ward_columns(), nurse()).unwrap();
    let mrn = ColumnKey::new("mrn");

    session.reveal(&mrn).unwrap();
    tokio::time::advance(Duration::from_secs(59)).await;
    settle().await;
    assert!(session.is_revealed(&mrn));

    tokio::time::advance(Duration::from_secs(2)).await;
    settle().await;
    assert!(!session.is_revealed(&mrn));

    let hide = sink.events().pop().unwrap();
    assert_eq!(hide.action, AuditAction::Hide);
    assert_eq!(hide.context_value("reason"), Some(&"idle_timeout".into()));
}
