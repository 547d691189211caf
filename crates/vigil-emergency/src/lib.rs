//! Vigil Emergency Mode
//!
//! A single process-wide flag that, while active, elevates every principal
//! to the emergency clearance tier. The coordinator is injected into each
//! table session rather than read from a global; sessions hold an
//! [`EmergencyWatch`] and see transitions as soon as they are published.

pub mod coordinator;
pub mod error;

pub use coordinator::{EmergencyCoordinator, EmergencyWatch};
pub use error::{EmergencyError, EmergencyResult};
