use vigil_core::{
    CellValue, ClearanceTier, ColumnKey, EmergencyState, EngineError, EngineResult, Principal,
    Record,
};

use crate::column::Column;

// ---------------------------------------------------------------------------
// Clearance evaluation: pure functions, no state
// ---------------------------------------------------------------------------

/// The clearance a principal actually holds for this request.
/// An active emergency elevates everyone to `Emergency`.
pub fn effective_clearance(principal: &Principal, emergency: &EmergencyState) -> ClearanceTier {
    if emergency.active {
        ClearanceTier::Emergency
    } else {
        principal.granted_clearance
    }
}

/// Whether `column` is visible to `principal`. Depends only on the column's
/// requirement and the effective clearance, never on record content.
pub fn can_see(column: &Column, principal: &Principal, emergency: &EmergencyState) -> bool {
    effective_clearance(principal, emergency).satisfies(column.required_clearance)
}

/// True when the column is visible only because of the emergency elevation.
pub fn relies_on_emergency(
    column: &Column,
    principal: &Principal,
    emergency: &EmergencyState,
) -> bool {
    emergency.active && !principal.granted_clearance.satisfies(column.required_clearance)
}

/// Columns visible to `principal`, in declaration order.
pub fn visible_columns<'a>(
    columns: &'a [Column],
    principal: &Principal,
    emergency: &EmergencyState,
) -> Vec<&'a Column> {
    let effective = effective_clearance(principal, emergency);
    let visible: Vec<&Column> = columns
        .iter()
        .filter(|c| effective.satisfies(c.required_clearance))
        .collect();
    tracing::debug!(
        principal = %principal.id,
        effective = %effective,
        total = columns.len(),
        visible = visible.len(),
        "computed visible columns"
    );
    visible
}

/// Read one cell. Fails with `AccessDenied` rather than omitting the value
/// when the column is not visible.
pub fn read_cell<'r>(
    record: &'r Record,
    column: &Column,
    principal: &Principal,
    emergency: &EmergencyState,
) -> EngineResult<&'r CellValue> {
    if !can_see(column, principal, emergency) {
        tracing::warn!(
            principal = %principal.id,
            column = %column.key,
            "cell read denied"
        );
        return Err(EngineError::access_denied(column.key.as_str()));
    }
    Ok(record.get(&column.key))
}

/// Highest requirement among the given columns, used as an event's or an
/// export's compliance tier.
pub fn compliance_tier<'a>(columns: impl IntoIterator<Item = &'a Column>) -> Option<ClearanceTier> {
    columns.into_iter().map(|c| c.required_clearance).max()
}

// ---------------------------------------------------------------------------
// ColumnView: the visible set, computed once per request
// ---------------------------------------------------------------------------

/// Result of looking a key up against the visible set.
#[derive(Debug, Clone, Copy)]
pub enum ColumnLookup<'a> {
    Visible(&'a Column),
    Hidden(&'a Column),
    Unknown,
}

/// The visible column set for one principal under one emergency snapshot.
/// Later stages read cells through the view, so a hidden column can never be
/// read by accident.
#[derive(Debug, Clone)]
pub struct ColumnView<'a> {
    all: &'a [Column],
    visible: Vec<&'a Column>,
    effective: ClearanceTier,
    emergency_override: bool,
}

impl<'a> ColumnView<'a> {
    pub fn new(all: &'a [Column], principal: &Principal, emergency: &EmergencyState) -> Self {
        let visible = visible_columns(all, principal, emergency);
        let emergency_override = visible
            .iter()
            .any(|c| relies_on_emergency(c, principal, emergency));
        Self {
            all,
            visible,
            effective: effective_clearance(principal, emergency),
            emergency_override,
        }
    }

    pub fn columns(&self) -> &[&'a Column] {
        &self.visible
    }

    pub fn effective_clearance(&self) -> ClearanceTier {
        self.effective
    }

    /// True when at least one visible column is visible only through the
    /// emergency elevation.
    pub fn emergency_override(&self) -> bool {
        self.emergency_override
    }

    pub fn is_visible(&self, key: &ColumnKey) -> bool {
        self.visible.iter().any(|c| &c.key == key)
    }

    pub fn lookup(&self, key: &ColumnKey) -> ColumnLookup<'a> {
        if let Some(column) = self.visible.iter().copied().find(|c| &c.key == key) {
            return ColumnLookup::Visible(column);
        }
        match self.all.iter().find(|c| &c.key == key) {
            Some(column) => ColumnLookup::Hidden(column),
            None => ColumnLookup::Unknown,
        }
    }

    /// Read a cell of a visible column.
    pub fn read<'r>(&self, record: &'r Record, key: &ColumnKey) -> EngineResult<&'r CellValue> {
        if self.is_visible(key) {
            Ok(record.get(key))
        } else {
            Err(EngineError::access_denied(key.as_str()))
        }
    }

    pub fn compliance_tier(&self) -> Option<ClearanceTier> {
        compliance_tier(self.visible.iter().copied())
    }
}
