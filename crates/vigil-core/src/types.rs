use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// ClearanceTier: four-level ordered clearance
// ---------------------------------------------------------------------------

/// Ordered clearance level, used both as a column's requirement and as a
/// principal's grant.
///
/// Ordering: Public < Restricted < Confidential < Emergency
///
/// Exhaustive so that a new tier forces review of every match site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClearanceTier {
    Public,
    Restricted,
    Confidential,
    Emergency,
}

impl ClearanceTier {
    pub const ALL: [ClearanceTier; 4] = [
        ClearanceTier::Public,
        ClearanceTier::Restricted,
        ClearanceTier::Confidential,
        ClearanceTier::Emergency,
    ];

    /// Numeric rank used for clearance comparisons.
    pub fn rank(self) -> u8 {
        match self {
            ClearanceTier::Public => 0,
            ClearanceTier::Restricted => 1,
            ClearanceTier::Confidential => 2,
            ClearanceTier::Emergency => 3,
        }
    }

    /// True when a holder of `self` satisfies a requirement of `required`.
    pub fn satisfies(self, required: ClearanceTier) -> bool {
        self.rank() >= required.rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ClearanceTier::Public => "public",
            ClearanceTier::Restricted => "restricted",
            ClearanceTier::Confidential => "confidential",
            ClearanceTier::Emergency => "emergency",
        }
    }
}

impl PartialOrd for ClearanceTier {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ClearanceTier {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank().cmp(&other.rank())
    }
}

impl fmt::Display for ClearanceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClearanceTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "public" => Ok(ClearanceTier::Public),
            "restricted" => Ok(ClearanceTier::Restricted),
            "confidential" => Ok(ClearanceTier::Confidential),
            "emergency" => Ok(ClearanceTier::Emergency),
            other => Err(format!("unknown clearance tier '{}'", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Timestamp: canonical time representation (seconds + nanoseconds)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub seconds_since_epoch: u64,
    pub nanoseconds: u32,
}

impl Timestamp {
    pub fn now() -> Self {
        Self::from(Utc::now())
    }

    pub fn from_seconds(seconds: u64) -> Self {
        Self {
            seconds_since_epoch: seconds,
            nanoseconds: 0,
        }
    }

    pub fn to_rfc3339(&self) -> String {
        DateTime::from_timestamp(self.seconds_since_epoch as i64, self.nanoseconds)
            .map(|d| d.to_rfc3339())
            .unwrap_or_else(|| "invalid".to_string())
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self {
            seconds_since_epoch: dt.timestamp().max(0) as u64,
            nanoseconds: dt.timestamp_subsec_nanos(),
        }
    }
}

// ---------------------------------------------------------------------------
// Typed identifiers
// ---------------------------------------------------------------------------

macro_rules! define_id {
    ($name:ident, $doc:expr) => {
        #[doc = $doc]
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

define_id!(PrincipalId, "Identifier of the principal making a request.");
define_id!(RecordId, "Stable identity of a record within a record set.");
define_id!(ColumnKey, "Key of a column, unique within a table.");
define_id!(SessionId, "Identifier of one table session.");

// ---------------------------------------------------------------------------
// Principal
// ---------------------------------------------------------------------------

/// The requesting principal, as supplied by the auth collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: PrincipalId,
    pub granted_clearance: ClearanceTier,
}

impl Principal {
    pub fn new(id: impl Into<PrincipalId>, granted_clearance: ClearanceTier) -> Self {
        Self {
            id: id.into(),
            granted_clearance,
        }
    }
}

// ---------------------------------------------------------------------------
// EmergencyState: process-wide crisis flag
// ---------------------------------------------------------------------------

/// Snapshot of the emergency flag. Published by the emergency coordinator
/// and read by every table session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyState {
    pub active: bool,
    pub activated_at: Option<Timestamp>,
    pub activated_by: Option<PrincipalId>,
}

impl EmergencyState {
    pub fn inactive() -> Self {
        Self::default()
    }

    pub fn activated(by: PrincipalId, at: Timestamp) -> Self {
        Self {
            active: true,
            activated_at: Some(at),
            activated_by: Some(by),
        }
    }
}

// ---------------------------------------------------------------------------
// CellValue: the value of one cell
// ---------------------------------------------------------------------------

/// A cell value.
///
/// Serialized untagged. Variant order matters for deserialization: an RFC 3339
/// string becomes a `Date`, any other string a `Text`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(untagged)]
pub enum CellValue {
    #[default]
    Null,
    Boolean(bool),
    Number(f64),
    Date(DateTime<Utc>),
    Text(String),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        CellValue::Text(value.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }

    fn variant_rank(&self) -> u8 {
        match self {
            CellValue::Null => 0,
            CellValue::Boolean(_) => 1,
            CellValue::Number(_) => 2,
            CellValue::Date(_) => 3,
            CellValue::Text(_) => 4,
        }
    }

    /// Total order over non-null values. Text compares case-insensitively
    /// first, then byte-wise, so the order is deterministic. Values of
    /// different kinds order by kind.
    ///
    /// Null placement is the caller's decision; here Null sorts first.
    pub fn total_cmp(&self, other: &CellValue) -> Ordering {
        match (self, other) {
            (CellValue::Null, CellValue::Null) => Ordering::Equal,
            (CellValue::Boolean(a), CellValue::Boolean(b)) => a.cmp(b),
            (CellValue::Number(a), CellValue::Number(b)) => a.total_cmp(b),
            (CellValue::Date(a), CellValue::Date(b)) => a.cmp(b),
            (CellValue::Text(a), CellValue::Text(b)) => a
                .to_lowercase()
                .cmp(&b.to_lowercase())
                .then_with(|| a.cmp(b)),
            _ => self.variant_rank().cmp(&other.variant_rank()),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<bool> for CellValue {
    fn from(b: bool) -> Self {
        CellValue::Boolean(b)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

impl From<i64> for CellValue {
    fn from(n: i64) -> Self {
        CellValue::Number(n as f64)
    }
}

impl From<DateTime<Utc>> for CellValue {
    fn from(d: DateTime<Utc>) -> Self {
        CellValue::Date(d)
    }
}

static NULL_CELL: CellValue = CellValue::Null;

// ---------------------------------------------------------------------------
// Record: one row of source data
// ---------------------------------------------------------------------------

/// One source record: a stable identity plus an ordered map of cell values.
/// A key that is absent reads as `Null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub record_id: RecordId,
    #[serde(default)]
    pub cells: BTreeMap<ColumnKey, CellValue>,
}

impl Record {
    pub fn new(record_id: impl Into<RecordId>) -> Self {
        Self {
            record_id: record_id.into(),
            cells: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<ColumnKey>, value: impl Into<CellValue>) -> Self {
        self.cells.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &ColumnKey) -> &CellValue {
        self.cells.get(key).unwrap_or(&NULL_CELL)
    }
}

// ---------------------------------------------------------------------------
// Audit actions
// ---------------------------------------------------------------------------

/// Actions that produce an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Reveal,
    Hide,
    Search,
    FilterChanged,
    SortChanged,
    PageChanged,
    SelectionChanged,
    Export,
    RowViewed,
    /// A page read that relied on the emergency elevation.
    RecordsViewed,
    EmergencyModeChanged,
}

impl AuditAction {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditAction::Reveal => "reveal",
            AuditAction::Hide => "hide",
            AuditAction::Search => "search",
            AuditAction::FilterChanged => "filter_changed",
            AuditAction::SortChanged => "sort_changed",
            AuditAction::PageChanged => "page_changed",
            AuditAction::SelectionChanged => "selection_changed",
            AuditAction::Export => "export",
            AuditAction::RowViewed => "row_viewed",
            AuditAction::RecordsViewed => "records_viewed",
            AuditAction::EmergencyModeChanged => "emergency_mode_changed",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_clearance_ordering() {
        assert!(ClearanceTier::Public < ClearanceTier::Restricted);
        assert!(ClearanceTier::Restricted < ClearanceTier::Confidential);
        assert!(ClearanceTier::Confidential < ClearanceTier::Emergency);
    }

    #[test]
    fn test_clearance_satisfies() {
        for granted in ClearanceTier::ALL {
            for required in ClearanceTier::ALL {
                assert_eq!(
                    granted.satisfies(required),
                    granted.rank() >= required.rank(),
                    "satisfies mismatch for {:?} / {:?}",
                    granted,
                    required
                );
            }
        }
    }

    #[test]
    fn test_clearance_from_str() {
        assert_eq!(
            "Confidential".parse::<ClearanceTier>().unwrap(),
            ClearanceTier::Confidential
        );
        assert!("secret".parse::<ClearanceTier>().is_err());
    }

    #[test]
    fn test_clearance_serde_lowercase() {
        let json = serde_json::to_string(&ClearanceTier::Restricted).unwrap();
        assert_eq!(json, "\"restricted\"");
    }

    #[test]
    fn test_record_missing_cell_is_null() {
        let record = Record::new("r1").with("name", "Ada");
        assert_eq!(record.get(&ColumnKey::new("name")), &CellValue::text("Ada"));
        assert!(record.get(&ColumnKey::new("missing")).is_null());
    }

    #[test]
    fn test_cell_total_cmp_text_case_insensitive() {
        let a = CellValue::text("alice");
        let b = CellValue::text("Bob");
        assert_eq!(a.total_cmp(&b), Ordering::Less);
        assert_eq!(
            CellValue::text("a").total_cmp(&CellValue::text("A")),
            Ordering::Greater
        );
    }

    #[test]
    fn test_cell_total_cmp_numbers_and_dates() {
        assert_eq!(
            CellValue::Number(1.0).total_cmp(&CellValue::Number(5.0)),
            Ordering::Less
        );
        let early = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 6, 1, 9, 0, 0).unwrap();
        assert_eq!(
            CellValue::Date(late).total_cmp(&CellValue::Date(early)),
            Ordering::Greater
        );
    }

    #[test]
    fn test_cell_untagged_deserialize() {
        let values: Vec<CellValue> =
            serde_json::from_str(r#"[null, true, 3, "2024-03-01T10:00:00Z", "MRN-1"]"#).unwrap();
        assert!(values[0].is_null());
        assert_eq!(values[1], CellValue::Boolean(true));
        assert_eq!(values[2], CellValue::Number(3.0));
        assert!(matches!(values[3], CellValue::Date(_)));
        assert_eq!(values[4], CellValue::text("MRN-1"));
    }

    #[test]
    fn test_audit_action_names() {
        assert_eq!(
            AuditAction::EmergencyModeChanged.as_str(),
            "emergency_mode_changed"
        );
        let json = serde_json::to_string(&AuditAction::FilterChanged).unwrap();
        assert_eq!(json, "\"filter_changed\"");
    }

    #[test]
    fn test_timestamp_rfc3339() {
        let ts = Timestamp::from_seconds(0);
        assert!(ts.to_rfc3339().starts_with("1970-01-01"));
    }
}
