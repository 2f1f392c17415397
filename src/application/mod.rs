//! Application layer module
//!
//! Application lifecycle and component health monitoring.

pub mod app;
pub mod health;

pub use app::{Application, ApplicationState};
pub use health::{ComponentHealth, HealthService, HealthStatus};
