//! Render-kind dispatch.
//!
//! Each render kind has exactly one handler: how a value is turned into its
//! display string, what a masked cell shows, and which values the kind
//! accepts. Adding a kind means adding a variant and a handler; the match in
//! [`handler`] keeps that exhaustive.

use serde::{Deserialize, Serialize};
use std::fmt;
use vigil_core::CellValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderKind {
    Text,
    Boolean,
    Date,
    Custom,
}

impl fmt::Display for RenderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderKind::Text => write!(f, "text"),
            RenderKind::Boolean => write!(f, "boolean"),
            RenderKind::Date => write!(f, "date"),
            RenderKind::Custom => write!(f, "custom"),
        }
    }
}

pub struct RenderHandler {
    pub kind: RenderKind,
    pub placeholder: &'static str,
    display: fn(&CellValue) -> String,
    accepts: fn(&CellValue) -> bool,
}

impl RenderHandler {
    pub fn display(&self, value: &CellValue) -> String {
        (self.display)(value)
    }

    pub fn accepts(&self, value: &CellValue) -> bool {
        (self.accepts)(value)
    }
}

static TEXT: RenderHandler = RenderHandler {
    kind: RenderKind::Text,
    placeholder: "••••••••",
    display: display_any,
    accepts: accepts_text,
};

static BOOLEAN: RenderHandler = RenderHandler {
    kind: RenderKind::Boolean,
    placeholder: "•••",
    display: display_boolean,
    accepts: accepts_boolean,
};

static DATE: RenderHandler = RenderHandler {
    kind: RenderKind::Date,
    placeholder: "••/••/••••",
    display: display_date,
    accepts: accepts_date,
};

static CUSTOM: RenderHandler = RenderHandler {
    kind: RenderKind::Custom,
    placeholder: "••••",
    display: display_any,
    accepts: accepts_any,
};

pub fn handler(kind: RenderKind) -> &'static RenderHandler {
    match kind {
        RenderKind::Text => &TEXT,
        RenderKind::Boolean => &BOOLEAN,
        RenderKind::Date => &DATE,
        RenderKind::Custom => &CUSTOM,
    }
}

/// Display string of a value under the given render kind.
pub fn display(kind: RenderKind, value: &CellValue) -> String {
    handler(kind).display(value)
}

/// Text and custom columns show whatever the value holds.
fn display_any(value: &CellValue) -> String {
    match value {
        CellValue::Null => String::new(),
        CellValue::Text(s) => s.clone(),
        CellValue::Number(n) => format_number(*n),
        CellValue::Boolean(_) => display_boolean(value),
        CellValue::Date(_) => display_date(value),
    }
}

/// Numeric flags read as booleans: zero is "no", anything else "yes".
fn display_boolean(value: &CellValue) -> String {
    let flag = match value {
        CellValue::Boolean(b) => *b,
        CellValue::Number(n) => *n != 0.0,
        _ => return display_any(value),
    };
    if flag { "yes" } else { "no" }.to_string()
}

/// Values at exactly midnight UTC are treated as calendar dates.
fn display_date(value: &CellValue) -> String {
    match value {
        CellValue::Date(d) if d.timestamp() % 86_400 == 0 && d.timestamp_subsec_nanos() == 0 => {
            d.format("%Y-%m-%d").to_string()
        }
        CellValue::Date(d) => d.format("%Y-%m-%d %H:%M").to_string(),
        _ => display_any(value),
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

fn accepts_text(value: &CellValue) -> bool {
    matches!(value, CellValue::Null | CellValue::Text(_))
}

fn accepts_boolean(value: &CellValue) -> bool {
    matches!(value, CellValue::Null | CellValue::Boolean(_))
}

fn accepts_date(value: &CellValue) -> bool {
    matches!(value, CellValue::Null | CellValue::Date(_))
}

fn accepts_any(_: &CellValue) -> bool {
    true
}
