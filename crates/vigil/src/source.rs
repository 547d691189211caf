//! JSON record source for the CLI.
//!
//! Stands in for the remote data store: a file holding the column
//! declarations and one already-fetched window of records. Raw JSON values
//! are coerced by each column's render kind, so a date column gets real
//! dates and a text column keeps strings as text even if they look like
//! dates.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use vigil_core::{CellValue, Record, RecordId};
use vigil_policy::{handler, validate_columns, Column, RenderKind};

use crate::error::{RootError, RootResult};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSource {
    columns: Vec<Column>,
    #[serde(default)]
    records: Vec<BTreeMap<String, serde_json::Value>>,
    #[serde(default)]
    total_count: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct TableSource {
    pub columns: Vec<Column>,
    pub records: Vec<Record>,
    /// Size of the full result set on the server, when the window is a
    /// single page of it.
    pub total_count: Option<usize>,
}

impl TableSource {
    pub fn load(path: &Path) -> RootResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(RootError::Io)?;
        let source = Self::from_json(&contents)?;
        tracing::info!(
            path = %path.display(),
            columns = source.columns.len(),
            records = source.records.len(),
            "loaded record source"
        );
        Ok(source)
    }

    pub fn from_json(json: &str) -> RootResult<Self> {
        let raw: RawSource = serde_json::from_str(json)?;
        validate_columns(&raw.columns)?;

        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(raw.records.len());
        for (index, object) in raw.records.into_iter().enumerate() {
            let record = coerce_record(index, object, &raw.columns)?;
            if !seen.insert(record.record_id.clone()) {
                return Err(RootError::Source(format!(
                    "duplicate record id '{}'",
                    record.record_id
                )));
            }
            records.push(record);
        }

        Ok(Self {
            columns: raw.columns,
            records,
            total_count: raw.total_count,
        })
    }
}

fn coerce_record(
    index: usize,
    mut object: BTreeMap<String, serde_json::Value>,
    columns: &[Column],
) -> RootResult<Record> {
    let record_id = match object.remove("id") {
        Some(serde_json::Value::String(s)) if !s.is_empty() => RecordId::new(s),
        Some(serde_json::Value::Number(n)) => RecordId::new(n.to_string()),
        _ => {
            return Err(RootError::Source(format!(
                "record #{} has no usable 'id'",
                index
            )))
        }
    };

    let mut record = Record::new(record_id);
    for column in columns {
        let Some(raw) = object.remove(column.key.as_str()) else {
            continue;
        };
        let value = coerce_value(raw, column.render_kind).ok_or_else(|| {
            RootError::Source(format!(
                "record '{}': column '{}' expects a {} value",
                record.record_id, column.key, column.render_kind
            ))
        })?;
        record.cells.insert(column.key.clone(), value);
    }
    if !object.is_empty() {
        tracing::debug!(
            record = %record.record_id,
            ignored = object.len(),
            "record fields without a column were ignored"
        );
    }
    Ok(record)
}

fn coerce_value(raw: serde_json::Value, kind: RenderKind) -> Option<CellValue> {
    use serde_json::Value;

    let value = match (kind, raw) {
        (_, Value::Null) => CellValue::Null,
        (RenderKind::Date, Value::String(s)) => CellValue::Date(parse_date(&s)?),
        (_, Value::String(s)) => CellValue::Text(s),
        (_, Value::Bool(b)) => CellValue::Boolean(b),
        (_, Value::Number(n)) => CellValue::Number(n.as_f64()?),
        (_, Value::Array(_) | Value::Object(_)) => return None,
    };
    handler(kind).accepts(&value).then_some(value)
}

/// RFC 3339 timestamps, or bare `YYYY-MM-DD` dates read as midnight UTC.
fn parse_date(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}
