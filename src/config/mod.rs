//! Configuration management module
//!
//! Loading from TOML, environment and CLI, plus validation.

pub mod loader;
pub mod models;
pub mod validation;

pub use loader::ConfigLoader;
pub use models::AppConfig;
pub use validation::{ConfigValidator, ValidationResult};

pub use crate::utils::CliArgs;
