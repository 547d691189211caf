use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use vigil_audit::{ActionClass, AuditEmitter};
use vigil_core::{
    AuditAction, AuditEvent, ClearanceTier, EmergencyState, EngineError, EngineResult, Principal,
    Record, Timestamp,
};
use vigil_policy::{Column, ColumnView};

use crate::filter::{FilterState, SortDescriptor};
use crate::masking::MaskingSnapshot;
use crate::pipeline::{render_row, select_matching, Cell, Row};
use crate::selection::Selection;

pub const DEFAULT_MAX_EXPORT_RECORDS: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Xlsx,
    Pdf,
}

impl ExportFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Xlsx => "xlsx",
            ExportFormat::Pdf => "pdf",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "xlsx" => Ok(ExportFormat::Xlsx),
            "pdf" => Ok(ExportFormat::Pdf),
            other => Err(format!("unknown export format '{}'", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Payload
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportMetadata {
    pub compliance_tier: Option<ClearanceTier>,
    pub record_count: usize,
    pub selected_only: bool,
    /// RFC 3339, UTC.
    pub generated_at: String,
}

/// What the export collaborator turns into a file. Columns carry their
/// full definition so the collaborator can render and label them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPayload {
    pub format: ExportFormat,
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
    pub metadata: ExportMetadata,
}

impl ExportPayload {
    /// CSV body with a header of column labels. Fields are quoted per
    /// RFC 4180; records end in CRLF. Masked cells carry their placeholder.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        let header: Vec<String> = self.columns.iter().map(|c| csv_field(&c.label)).collect();
        out.push_str(&header.join(","));
        out.push_str("\r\n");

        for row in &self.rows {
            let fields: Vec<String> = self
                .columns
                .iter()
                .map(|column| {
                    let text = match row.get(&column.key) {
                        Some(Cell::Value(value)) => vigil_policy::display(column.render_kind, value),
                        Some(Cell::Masked { placeholder }) => placeholder.clone(),
                        None => String::new(),
                    };
                    csv_field(&text)
                })
                .collect();
            out.push_str(&fields.join(","));
            out.push_str("\r\n");
        }
        out
    }
}

fn csv_field(text: &str) -> String {
    if text.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", text.replace('"', "\"\""))
    } else {
        text.to_string()
    }
}

// ---------------------------------------------------------------------------
// export_job
// ---------------------------------------------------------------------------

/// Everything that scopes one export besides the records and columns.
#[derive(Debug, Clone, Copy)]
pub struct ExportJob<'a> {
    pub principal: &'a Principal,
    pub emergency: &'a EmergencyState,
    pub masking: &'a MaskingSnapshot,
    pub selection: &'a Selection,
    pub filter: &'a FilterState,
    pub sort: Option<&'a SortDescriptor>,
    pub format: ExportFormat,
    pub max_records: usize,
}

/// Build an export of the selected, matching records.
///
/// Applies the same column restriction and masking as a rendered page,
/// ignores pagination, and refuses oversize exports before building
/// anything. One disclosure event is emitted; if the sink refuses it no
/// payload is returned.
pub fn export_job(
    records: &[Record],
    columns: &[Column],
    job: &ExportJob<'_>,
    emitter: &AuditEmitter,
) -> EngineResult<ExportPayload> {
    let matched = select_matching(
        records,
        columns,
        job.principal,
        job.emergency,
        job.masking,
        job.filter,
        job.sort,
    )?;
    let selected = job.selection.apply(matched);

    if selected.len() > job.max_records {
        tracing::warn!(
            principal = %job.principal.id,
            requested = selected.len(),
            limit = job.max_records,
            "export refused: too large"
        );
        return Err(EngineError::ExportTooLarge {
            requested: selected.len(),
            limit: job.max_records,
        });
    }

    let view = ColumnView::new(columns, job.principal, job.emergency);
    let selected_only = job.selection.selected_only();
    let compliance_tier = view.compliance_tier();
    let keys: Vec<&str> = view.columns().iter().map(|c| c.key.as_str()).collect();

    let mut event = AuditEvent::new(AuditAction::Export, job.principal.id.clone())
        .with_emergency_override(view.emergency_override())
        .with_context("recordCount", selected.len())
        .with_context("selectedOnly", selected_only)
        .with_context("format", job.format.as_str())
        .with_context("columns", keys);
    if let Some(tier) = compliance_tier {
        event = event.with_tier(tier);
    }
    emitter.emit(&event, ActionClass::Disclosure)?;

    let rows: Vec<Row> = selected
        .iter()
        .map(|r| render_row(&view, job.masking, r))
        .collect();

    tracing::info!(
        principal = %job.principal.id,
        format = %job.format,
        records = rows.len(),
        selected_only,
        "export built"
    );

    Ok(ExportPayload {
        format: job.format,
        columns: view.columns().iter().map(|c| (*c).clone()).collect(),
        metadata: ExportMetadata {
            compliance_tier,
            record_count: rows.len(),
            selected_only,
            generated_at: Timestamp::now().to_rfc3339(),
        },
        rows,
    })
}
