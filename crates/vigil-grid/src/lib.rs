//! Vigil Grid
//!
//! Everything one table view needs on top of the access policy:
//!
//! - Masking state per session, with reveal/hide and an optional idle
//!   auto-hide timer
//! - The query pipeline: column restriction, search, column filters,
//!   stable sort and pagination
//! - Row selection and export
//! - [`TableSession`], which ties these together and turns request changes
//!   into audit events

pub mod export;
pub mod filter;
pub mod masking;
pub mod pipeline;
pub mod selection;
pub mod session;

pub use export::{
    export_job, ExportFormat, ExportJob, ExportMetadata, ExportPayload, DEFAULT_MAX_EXPORT_RECORDS,
};
pub use filter::{
    FilterState, FilterValue, PageRequest, QueryRequest, SortDescriptor, SortDirection,
    DEFAULT_PAGE_SIZE,
};
pub use masking::{HideReason, MaskingSnapshot, MaskingStore, RevealGrant};
pub use pipeline::{query, render_row, select_matching, Cell, Page, Row};
pub use selection::Selection;
pub use session::{SessionOptions, TableSession};
