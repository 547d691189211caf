use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use vigil_core::{ClearanceTier, ColumnKey, EngineError, EngineResult};

use crate::render::{self, RenderKind};

// ---------------------------------------------------------------------------
// Capability facets
// ---------------------------------------------------------------------------

/// The column may be used as a sort key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sortable;

/// The column takes part in free-text search and accepts column filters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Filterable;

/// The column holds sensitive data and is masked until revealed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sensitive {
    /// Replaces the render kind's placeholder when set.
    pub placeholder: Option<String>,
}

// ---------------------------------------------------------------------------
// Column
// ---------------------------------------------------------------------------

/// A column declaration. Each capability is an optional facet, so a column
/// only carries what it claims.
///
/// Serialized through a flat form (`sortable`, `filterable`,
/// `containsSensitiveData` booleans) for record-source files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ColumnSpec", into = "ColumnSpec")]
pub struct Column {
    pub key: ColumnKey,
    pub label: String,
    pub render_kind: RenderKind,
    pub required_clearance: ClearanceTier,
    sort: Option<Sortable>,
    filter: Option<Filterable>,
    sensitive: Option<Sensitive>,
}

impl Column {
    pub fn new(key: impl Into<ColumnKey>, label: impl Into<String>, render_kind: RenderKind) -> Self {
        Self {
            key: key.into(),
            label: label.into(),
            render_kind,
            required_clearance: ClearanceTier::Public,
            sort: None,
            filter: None,
            sensitive: None,
        }
    }

    pub fn text(key: impl Into<ColumnKey>, label: impl Into<String>) -> Self {
        Self::new(key, label, RenderKind::Text)
    }

    pub fn boolean(key: impl Into<ColumnKey>, label: impl Into<String>) -> Self {
        Self::new(key, label, RenderKind::Boolean)
    }

    pub fn date(key: impl Into<ColumnKey>, label: impl Into<String>) -> Self {
        Self::new(key, label, RenderKind::Date)
    }

    pub fn custom(key: impl Into<ColumnKey>, label: impl Into<String>) -> Self {
        Self::new(key, label, RenderKind::Custom)
    }

    pub fn sortable(mut self) -> Self {
        self.sort = Some(Sortable);
        self
    }

    pub fn filterable(mut self) -> Self {
        self.filter = Some(Filterable);
        self
    }

    pub fn sensitive(mut self) -> Self {
        self.sensitive = Some(Sensitive::default());
        self
    }

    pub fn sensitive_with_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.sensitive = Some(Sensitive {
            placeholder: Some(placeholder.into()),
        });
        self
    }

    pub fn requires(mut self, tier: ClearanceTier) -> Self {
        self.required_clearance = tier;
        self
    }

    pub fn is_sortable(&self) -> bool {
        self.sort.is_some()
    }

    pub fn is_filterable(&self) -> bool {
        self.filter.is_some()
    }

    pub fn contains_sensitive_data(&self) -> bool {
        self.sensitive.is_some()
    }

    pub fn sensitivity(&self) -> Option<&Sensitive> {
        self.sensitive.as_ref()
    }

    /// Text shown in place of a masked cell.
    pub fn masked_placeholder(&self) -> String {
        self.sensitive
            .as_ref()
            .and_then(|s| s.placeholder.clone())
            .unwrap_or_else(|| render::handler(self.render_kind).placeholder.to_string())
    }
}

/// Find a column by key.
pub fn find_column<'a>(columns: &'a [Column], key: &ColumnKey) -> Option<&'a Column> {
    columns.iter().find(|c| &c.key == key)
}

/// Validate a table's column declarations: keys must be non-empty and unique.
pub fn validate_columns(columns: &[Column]) -> EngineResult<()> {
    let mut seen = HashSet::with_capacity(columns.len());
    for column in columns {
        if column.key.as_str().trim().is_empty() {
            return Err(EngineError::InvalidColumn(
                "column key must not be empty".to_string(),
            ));
        }
        if !seen.insert(&column.key) {
            return Err(EngineError::InvalidColumn(format!(
                "duplicate column key '{}'",
                column.key
            )));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// ColumnSpec: flat serialized form
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ColumnSpec {
    key: ColumnKey,
    label: String,
    #[serde(default = "default_render_kind")]
    render_kind: RenderKind,
    #[serde(default = "default_clearance")]
    required_clearance: ClearanceTier,
    #[serde(default)]
    sortable: bool,
    #[serde(default)]
    filterable: bool,
    #[serde(default)]
    contains_sensitive_data: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    placeholder: Option<String>,
}

fn default_render_kind() -> RenderKind {
    RenderKind::Text
}

fn default_clearance() -> ClearanceTier {
    ClearanceTier::Public
}

impl From<ColumnSpec> for Column {
    fn from(spec: ColumnSpec) -> Self {
        Column {
            key: spec.key,
            label: spec.label,
            render_kind: spec.render_kind,
            required_clearance: spec.required_clearance,
            sort: spec.sortable.then_some(Sortable),
            filter: spec.filterable.then_some(Filterable),
            sensitive: spec.contains_sensitive_data.then(|| Sensitive {
                placeholder: spec.placeholder,
            }),
        }
    }
}

impl From<Column> for ColumnSpec {
    fn from(column: Column) -> Self {
        ColumnSpec {
            sortable: column.is_sortable(),
            filterable: column.is_filterable(),
            contains_sensitive_data: column.contains_sensitive_data(),
            placeholder: column.sensitive.and_then(|s| s.placeholder),
            key: column.key,
            label: column.label,
            render_kind: column.render_kind,
            required_clearance: column.required_clearance,
        }
    }
}
