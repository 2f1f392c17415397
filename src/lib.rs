//! Solana Dashboard Library
//!
//! Backend services for a Solana trading dashboard: wallet connections and
//! portfolios, transaction history, trading-bot configuration records, an
//! API key vault and a rolling daily spend limit, all stored in Supabase.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Application: lifecycle, key refresh task, health checks       │
//! └──────────────────────────────────────────────────────────────┘
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Services: wallet · transactions · bots · vault · security     │
//! │           account · backup · market · helius · solana         │
//! └──────────────────────────────────────────────────────────────┘
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Infrastructure: table store (Supabase / memory) · local store │
//! │                 error collector · metrics · vault cipher      │
//! └──────────────────────────────────────────────────────────────┘
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Core: row types · errors · validation                         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use solana_dashboard::{Application, ConfigLoader};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ConfigLoader::new().load().await?;
//!     let app = Application::build(config).await?;
//!     app.run(CancellationToken::new()).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

// Domain types, errors and validation
pub mod core;

// Lifecycle and health monitoring
pub mod application;

// Configuration loading and validation
pub mod config;

// Table store, local store, monitoring and secrets
pub mod infrastructure;

// Dashboard services
pub mod services;

// Telemetry, CLI and time helpers
pub mod utils;

pub use application::Application;
pub use config::{AppConfig, ConfigLoader};
pub use core::{
    error::AppError,
    result::AppResult,
    types::*,
};

/// Library version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Library description
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_info() {
        assert!(!VERSION.is_empty());
        assert_eq!(NAME, "solana-dashboard");
        assert!(!DESCRIPTION.is_empty());
    }
}
