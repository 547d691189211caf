//! Vigil Audit
//!
//! Every disclosure-relevant action goes through the [`AuditEmitter`]
//! before it takes effect.
//!
//! - Disclosure and administrative actions are fail-closed: if the sink
//!   refuses the event the action is aborted
//! - Navigational actions are fail-open with a bounded retry
//! - Reference sinks: hash-chained in-memory [`AuditChain`] and the
//!   on-disk [`JsonlAuditSink`]

pub mod chain;
pub mod emitter;
pub mod error;
pub mod jsonl;
pub mod testing;

pub use chain::{AuditChain, ChainEntry};
pub use emitter::{ActionClass, AuditEmitter, EmitOutcome, RetryPolicy};
pub use error::{AuditError, AuditResult};
pub use jsonl::{read_events, JsonlAuditSink};
