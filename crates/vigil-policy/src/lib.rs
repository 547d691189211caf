//! Vigil Access Policy
//!
//! Decides which columns a principal may see and how each column renders.
//!
//! - Column declarations built from optional capability facets
//!   (Sortable, Filterable, Sensitive)
//! - Closed render-kind enum with a single handler table
//! - Pure clearance evaluation: visibility depends only on the column's
//!   requirement and the principal's effective clearance
//! - Emergency elevation raises every principal to the top tier and is
//!   reported so audit events can carry `emergency_override`

pub mod column;
pub mod evaluator;
pub mod render;

pub use column::{find_column, validate_columns, Column, Filterable, Sensitive, Sortable};
pub use evaluator::{
    can_see, compliance_tier, effective_clearance, read_cell, relies_on_emergency,
    visible_columns, ColumnLookup, ColumnView,
};
pub use render::{display, handler, RenderHandler, RenderKind};
