use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use vigil_core::{
    CellValue, ColumnKey, EmergencyState, EngineError, EngineResult, Principal, Record, RecordId,
};
use vigil_policy::{display, Column, ColumnLookup, ColumnView};

use crate::filter::{FilterState, FilterValue, PageRequest, SortDescriptor, SortDirection};
use crate::masking::MaskingSnapshot;

// ---------------------------------------------------------------------------
// Rendered output
// ---------------------------------------------------------------------------

/// One rendered cell: the value, or the column's placeholder while masked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Cell {
    Value(CellValue),
    Masked { placeholder: String },
}

impl Cell {
    pub fn is_masked(&self) -> bool {
        matches!(self, Cell::Masked { .. })
    }

    pub fn value(&self) -> Option<&CellValue> {
        match self {
            Cell::Value(v) => Some(v),
            Cell::Masked { .. } => None,
        }
    }

    /// Display string under `column`'s render kind; the placeholder when
    /// masked.
    pub fn display(&self, column: &Column) -> String {
        match self {
            Cell::Value(v) => display(column.render_kind, v),
            Cell::Masked { placeholder } => placeholder.clone(),
        }
    }
}

/// A rendered record. Carries visible columns only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    pub record_id: RecordId,
    pub cells: BTreeMap<ColumnKey, Cell>,
}

impl Row {
    pub fn get(&self, key: &ColumnKey) -> Option<&Cell> {
        self.cells.get(key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    /// Visible column keys, in declaration order.
    pub columns: Vec<ColumnKey>,
    pub records: Vec<Row>,
    pub total_matched: usize,
    pub page_index: usize,
    pub page_count: usize,
}

/// Render one record against the visible column set.
pub fn render_row(view: &ColumnView<'_>, masking: &MaskingSnapshot, record: &Record) -> Row {
    let cells = view
        .columns()
        .iter()
        .map(|column| {
            let cell = if masking.is_masked(column) {
                Cell::Masked {
                    placeholder: column.masked_placeholder(),
                }
            } else {
                Cell::Value(record.get(&column.key).clone())
            };
            (column.key.clone(), cell)
        })
        .collect();
    Row {
        record_id: record.record_id.clone(),
        cells,
    }
}

// ---------------------------------------------------------------------------
// Plan: the request, validated against the visible set
// ---------------------------------------------------------------------------

struct Plan<'c, 'f> {
    search: Option<String>,
    searchable: Vec<&'c Column>,
    filters: Vec<(&'c Column, &'f FilterValue)>,
    sort: Option<(&'c Column, SortDirection)>,
}

fn plan<'c, 'f>(
    view: &ColumnView<'c>,
    masking: &MaskingSnapshot,
    filter: &'f FilterState,
    sort: Option<&SortDescriptor>,
) -> EngineResult<Plan<'c, 'f>> {
    let mut filters = Vec::with_capacity(filter.column_filters.len());
    for (key, value) in &filter.column_filters {
        let column = match view.lookup(key) {
            ColumnLookup::Visible(column) => column,
            ColumnLookup::Hidden(_) => return Err(EngineError::access_denied(key.as_str())),
            ColumnLookup::Unknown => {
                return Err(EngineError::InvalidFilterState(format!(
                    "unknown filter column '{}'",
                    key
                )))
            }
        };
        if !column.is_filterable() {
            return Err(EngineError::InvalidFilterState(format!(
                "column '{}' is not filterable",
                key
            )));
        }
        if masking.is_masked(column) {
            return Err(EngineError::InvalidFilterState(format!(
                "column '{}' is masked; reveal it before filtering",
                key
            )));
        }
        value.validate(key)?;
        filters.push((column, value));
    }

    let sort = match sort {
        None => None,
        Some(descriptor) => {
            let key = &descriptor.column_key;
            let column = match view.lookup(key) {
                ColumnLookup::Visible(column) => column,
                ColumnLookup::Hidden(_) => return Err(EngineError::access_denied(key.as_str())),
                ColumnLookup::Unknown => {
                    return Err(EngineError::InvalidSortColumn(format!(
                        "unknown sort column '{}'",
                        key
                    )))
                }
            };
            if !column.is_sortable() {
                return Err(EngineError::InvalidSortColumn(format!(
                    "column '{}' is not sortable",
                    key
                )));
            }
            if masking.is_masked(column) {
                return Err(EngineError::InvalidSortColumn(format!(
                    "column '{}' is masked; reveal it before sorting",
                    key
                )));
            }
            Some((column, descriptor.direction))
        }
    };

    let searchable = view
        .columns()
        .iter()
        .copied()
        .filter(|c| c.is_filterable() && !masking.is_masked(c))
        .collect();

    Ok(Plan {
        search: filter.search_query(),
        searchable,
        filters,
        sort,
    })
}

impl Plan<'_, '_> {
    fn matches(&self, record: &Record) -> bool {
        if let Some(query) = &self.search {
            let hit = self.searchable.iter().any(|column| {
                display(column.render_kind, record.get(&column.key))
                    .to_lowercase()
                    .contains(query.as_str())
            });
            if !hit {
                return false;
            }
        }
        self.filters
            .iter()
            .all(|(column, value)| value.matches(record.get(&column.key), column.render_kind))
    }

    fn order(&self, records: &mut [&Record]) {
        let Some((column, direction)) = self.sort else {
            return;
        };
        // slice::sort_by is stable, so equal keys keep their input order
        records.sort_by(|a, b| {
            let (x, y) = (a.get(&column.key), b.get(&column.key));
            match (x.is_null(), y.is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => Ordering::Greater,
                (false, true) => Ordering::Less,
                (false, false) => match direction {
                    SortDirection::Asc => x.total_cmp(y),
                    SortDirection::Desc => y.total_cmp(x),
                },
            }
        });
    }
}

fn run<'r>(
    records: &'r [Record],
    view: &ColumnView<'_>,
    masking: &MaskingSnapshot,
    filter: &FilterState,
    sort: Option<&SortDescriptor>,
) -> EngineResult<Vec<&'r Record>> {
    let plan = plan(view, masking, filter, sort)?;
    let mut matched: Vec<&Record> = records.iter().filter(|r| plan.matches(r)).collect();
    plan.order(&mut matched);
    Ok(matched)
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Restrict, search, filter, sort and paginate.
///
/// The whole request is validated before any record is looked at, so an
/// invalid request has no partial effect.
#[allow(clippy::too_many_arguments)]
pub fn query(
    records: &[Record],
    columns: &[Column],
    principal: &Principal,
    emergency: &EmergencyState,
    masking: &MaskingSnapshot,
    filter: &FilterState,
    sort: Option<&SortDescriptor>,
    page: PageRequest,
) -> EngineResult<Page> {
    if page.size == 0 {
        return Err(EngineError::InvalidFilterState(
            "page size must be at least 1".to_string(),
        ));
    }

    let view = ColumnView::new(columns, principal, emergency);
    let matched = run(records, &view, masking, filter, sort)?;

    let total_matched = matched.len();
    let page_count = total_matched.div_ceil(page.size);
    let start = page.index.saturating_mul(page.size);
    let rows: Vec<Row> = matched
        .iter()
        .skip(start)
        .take(page.size)
        .map(|r| render_row(&view, masking, r))
        .collect();

    tracing::debug!(
        principal = %principal.id,
        total = records.len(),
        matched = total_matched,
        page = page.index,
        returned = rows.len(),
        "query evaluated"
    );

    Ok(Page {
        columns: view.columns().iter().map(|c| c.key.clone()).collect(),
        records: rows,
        total_matched,
        page_index: page.index,
        page_count,
    })
}

/// Every record the request matches, in sorted order, without pagination.
pub fn select_matching<'r>(
    records: &'r [Record],
    columns: &[Column],
    principal: &Principal,
    emergency: &EmergencyState,
    masking: &MaskingSnapshot,
    filter: &FilterState,
    sort: Option<&SortDescriptor>,
) -> EngineResult<Vec<&'r Record>> {
    let view = ColumnView::new(columns, principal, emergency);
    run(records, &view, masking, filter, sort)
}
