use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::mem;
use std::str::FromStr;
use vigil_core::{CellValue, ColumnKey, EngineError, EngineResult};
use vigil_policy::{display, RenderKind};

// ---------------------------------------------------------------------------
// FilterValue: one column filter
// ---------------------------------------------------------------------------

/// A filter applied to a single column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "camelCase")]
pub enum FilterValue {
    /// Exact match. Text compares case-insensitively.
    Equals(CellValue),
    /// Case-insensitive substring of the display string.
    Contains(String),
    /// Equals any of the listed values.
    OneOf(Vec<CellValue>),
    /// Inclusive range; either bound may be open. Only values of the same
    /// kind as the bounds match.
    Between {
        from: Option<CellValue>,
        to: Option<CellValue>,
    },
}

impl FilterValue {
    /// Reject filters that could never be satisfied as written.
    pub fn validate(&self, key: &ColumnKey) -> EngineResult<()> {
        match self {
            FilterValue::OneOf(values) if values.is_empty() => Err(EngineError::InvalidFilterState(
                format!("filter on '{}' has an empty value set", key),
            )),
            FilterValue::Between { from: None, to: None } => Err(EngineError::InvalidFilterState(
                format!("range filter on '{}' is open on both ends", key),
            )),
            FilterValue::Between { from, to } => {
                let null_bound = [from, to]
                    .into_iter()
                    .flatten()
                    .any(CellValue::is_null);
                if null_bound {
                    return Err(EngineError::InvalidFilterState(format!(
                        "range filter on '{}' has a null bound",
                        key
                    )));
                }
                if let (Some(lo), Some(hi)) = (from, to) {
                    if !same_kind(lo, hi) {
                        return Err(EngineError::InvalidFilterState(format!(
                            "range filter on '{}' mixes value kinds",
                            key
                        )));
                    }
                    if lo.total_cmp(hi).is_gt() {
                        return Err(EngineError::InvalidFilterState(format!(
                            "range filter on '{}' has its lower bound above its upper bound",
                            key
                        )));
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub fn matches(&self, value: &CellValue, kind: RenderKind) -> bool {
        match self {
            FilterValue::Equals(expected) => cells_equal(value, expected),
            FilterValue::Contains(needle) => {
                let needle = needle.trim().to_lowercase();
                display(kind, value).to_lowercase().contains(&needle)
            }
            FilterValue::OneOf(values) => values.iter().any(|v| cells_equal(value, v)),
            FilterValue::Between { from, to } => {
                if value.is_null() {
                    return false;
                }
                let above = from
                    .as_ref()
                    .map_or(true, |lo| same_kind(value, lo) && !value.total_cmp(lo).is_lt());
                let below = to
                    .as_ref()
                    .map_or(true, |hi| same_kind(value, hi) && !value.total_cmp(hi).is_gt());
                above && below
            }
        }
    }
}

fn same_kind(a: &CellValue, b: &CellValue) -> bool {
    mem::discriminant(a) == mem::discriminant(b)
}

fn cells_equal(a: &CellValue, b: &CellValue) -> bool {
    match (a, b) {
        (CellValue::Text(x), CellValue::Text(y)) => x.to_lowercase() == y.to_lowercase(),
        _ => a == b,
    }
}

// ---------------------------------------------------------------------------
// FilterState
// ---------------------------------------------------------------------------

/// Free-text search plus per-column filters, AND-combined.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterState {
    #[serde(default)]
    pub search_text: String,
    #[serde(default)]
    pub column_filters: BTreeMap<ColumnKey, FilterValue>,
}

impl FilterState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search(mut self, text: impl Into<String>) -> Self {
        self.search_text = text.into();
        self
    }

    pub fn with_filter(mut self, key: impl Into<ColumnKey>, value: FilterValue) -> Self {
        self.column_filters.insert(key.into(), value);
        self
    }

    /// Trimmed, lowercased search text, or `None` when the search is blank.
    pub fn search_query(&self) -> Option<String> {
        let trimmed = self.search_text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_lowercase())
        }
    }

    pub fn is_empty(&self) -> bool {
        self.search_query().is_none() && self.column_filters.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Sorting
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "asc"),
            SortDirection::Desc => write!(f, "desc"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortDescriptor {
    pub column_key: ColumnKey,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortDescriptor {
    pub fn asc(key: impl Into<ColumnKey>) -> Self {
        Self {
            column_key: key.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(key: impl Into<ColumnKey>) -> Self {
        Self {
            column_key: key.into(),
            direction: SortDirection::Desc,
        }
    }
}

/// Parses `key`, `key:asc` or `key:desc`.
impl FromStr for SortDescriptor {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (key, direction) = match s.rsplit_once(':') {
            Some((key, "asc")) => (key, SortDirection::Asc),
            Some((key, "desc")) => (key, SortDirection::Desc),
            Some((_, other)) => return Err(format!("unknown sort direction '{}'", other)),
            None => (s, SortDirection::Asc),
        };
        let key = key.trim();
        if key.is_empty() {
            return Err("sort key is empty".to_string());
        }
        Ok(Self {
            column_key: ColumnKey::new(key),
            direction,
        })
    }
}

// ---------------------------------------------------------------------------
// Paging and the full request
// ---------------------------------------------------------------------------

pub const DEFAULT_PAGE_SIZE: usize = 25;

/// Zero-based page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub index: usize,
    pub size: usize,
}

impl PageRequest {
    pub fn new(index: usize, size: usize) -> Self {
        Self { index, size }
    }

    pub fn first(size: usize) -> Self {
        Self::new(0, size)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::first(DEFAULT_PAGE_SIZE)
    }
}

/// Everything a table view asks of the pipeline in one round.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryRequest {
    #[serde(default)]
    pub filter: FilterState,
    #[serde(default)]
    pub sort: Option<SortDescriptor>,
    #[serde(default)]
    pub page: PageRequest,
}

impl QueryRequest {
    pub fn new(page: PageRequest) -> Self {
        Self {
            page,
            ..Self::default()
        }
    }

    pub fn with_filter(mut self, filter: FilterState) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_sort(mut self, sort: SortDescriptor) -> Self {
        self.sort = Some(sort);
        self
    }
}
