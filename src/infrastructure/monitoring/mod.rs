//! Monitoring infrastructure module
//!
//! Error collection and metrics recording.

pub mod errors;
pub mod metrics;

pub use errors::{CollectedError, ErrorCollector};
