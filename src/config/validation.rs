//! Configuration validation logic
//!
//! Checks a loaded [`AppConfig`] before services are built. Problems that
//! make a subsystem unusable are errors; settings that silently degrade
//! behavior are warnings.

use base64::Engine;
use tracing::{debug, warn};
use url::Url;

use super::models::AppConfig;
use crate::core::error::AppError;
use crate::core::result::AppResult;

/// Configuration validator
pub struct ConfigValidator {
    /// Treat warnings as failures
    strict_mode: bool,
}

/// Validation result with warnings and errors
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// Fatal validation errors
    pub errors: Vec<String>,

    /// Non-fatal warnings
    pub warnings: Vec<String>,

    /// Validation passed
    pub is_valid: bool,
}

impl ValidationResult {
    fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Convert a failed validation into a configuration error
    pub fn into_result(self) -> AppResult<Self> {
        if self.is_valid {
            Ok(self)
        } else {
            Err(AppError::config(format!(
                "Invalid configuration: {}",
                self.errors.join("; ")
            )))
        }
    }
}

impl ConfigValidator {
    /// Create a new validator with default settings
    pub fn new() -> Self {
        Self { strict_mode: false }
    }

    /// Enable strict validation mode
    pub fn with_strict_mode(mut self) -> Self {
        self.strict_mode = true;
        self
    }

    /// Validate the complete application configuration
    pub fn validate(&self, config: &AppConfig) -> ValidationResult {
        debug!("🔍 Starting configuration validation");

        let mut result = ValidationResult::default();

        self.validate_environment(config, &mut result);
        self.validate_supabase(config, &mut result);
        self.validate_endpoints(config, &mut result);
        self.validate_helius(config, &mut result);
        self.validate_security(config, &mut result);
        self.validate_monitoring(config, &mut result);

        result.is_valid = result.errors.is_empty() && (!self.strict_mode || result.warnings.is_empty());

        if result.is_valid {
            debug!("✅ Configuration validation passed");
        } else {
            warn!("❌ Configuration validation failed");
            for error in &result.errors {
                warn!("   Error: {}", error);
            }
        }
        for warning in &result.warnings {
            warn!("   Warning: {}", warning);
        }

        result
    }

    fn validate_environment(&self, config: &AppConfig, result: &mut ValidationResult) {
        let env = &config.environment;
        if !matches!(env.name.as_str(), "development" | "staging" | "production" | "test") {
            result.error(format!("Unknown environment '{}'", env.name));
        }
        if !matches!(env.log_format.as_str(), "json" | "pretty" | "compact") {
            result.error(format!(
                "Invalid log format '{}'. Must be 'json', 'pretty', or 'compact'",
                env.log_format
            ));
        }
    }

    fn validate_supabase(&self, config: &AppConfig, result: &mut ValidationResult) {
        if config.use_in_memory_store() {
            if config.is_production() {
                result.error("Production requires a Supabase URL; the in-memory store is not persistent");
            } else {
                result.warning("Supabase not configured, using the in-memory table store");
            }
            return;
        }

        check_url(&config.supabase.url, "supabase.url", result);
        if config.supabase.anon_key.is_empty() {
            result.error("supabase.anon_key is required when supabase.url is set");
        }
        if config.supabase.request_timeout_ms == 0 {
            result.error("supabase.request_timeout_ms must be greater than zero");
        }
    }

    fn validate_endpoints(&self, config: &AppConfig, result: &mut ValidationResult) {
        check_url(&config.solana.rpc_url, "solana.rpc_url", result);
        check_url(&config.helius.base_url, "helius.base_url", result);
        check_url(&config.market.coingecko_url, "market.coingecko_url", result);
        check_url(&config.market.jupiter_price_url, "market.jupiter_price_url", result);
        check_url(&config.market.jupiter_quote_url, "market.jupiter_quote_url", result);
        check_url(&config.market.solscan_url, "market.solscan_url", result);

        if !matches!(config.solana.commitment.as_str(), "processed" | "confirmed" | "finalized") {
            result.error(format!("Invalid solana.commitment '{}'", config.solana.commitment));
        }
        if config.market.solscan_api_key.is_none() {
            result.warning("market.solscan_api_key not set, Solscan lookups will fail");
        }
    }

    fn validate_helius(&self, config: &AppConfig, result: &mut ValidationResult) {
        let helius = &config.helius;
        if helius.key_refresh_interval_seconds == 0 {
            result.error("helius.key_refresh_interval_seconds must be greater than zero");
        }
        if helius.refresh_attempts == 0 {
            result.error("helius.refresh_attempts must be at least 1");
        }
        if helius.max_concurrent_requests == 0 {
            result.error("helius.max_concurrent_requests must be at least 1");
        }
        if helius.api_key.is_empty() && config.use_in_memory_store() {
            result.warning("No Helius key source: helius.api_key is empty and api_keys_storage is unavailable");
        }
    }

    fn validate_security(&self, config: &AppConfig, result: &mut ValidationResult) {
        let security = &config.security;

        if security.encryption_key.is_empty() {
            result.warning("security.encryption_key not set, vault values are stored unencrypted");
        } else {
            match base64::engine::general_purpose::STANDARD.decode(&security.encryption_key) {
                Ok(bytes) if bytes.len() == 32 => {}
                Ok(bytes) => result.error(format!(
                    "security.encryption_key must decode to 32 bytes, got {}",
                    bytes.len()
                )),
                Err(e) => result.error(format!("security.encryption_key is not valid base64: {}", e)),
            }
        }

        match &security.vault_passphrase_hash {
            Some(hash) if argon2::PasswordHash::new(hash).is_err() => {
                result.error("security.vault_passphrase_hash is not a valid PHC string");
            }
            None => result.warning("security.vault_passphrase_hash not set, any passphrase unlocks the vault"),
            _ => {}
        }

        if security.default_daily_limit_sol <= rust_decimal::Decimal::ZERO {
            result.error("security.default_daily_limit_sol must be positive");
        }
        if security.spend_window_hours == 0 {
            result.error("security.spend_window_hours must be greater than zero");
        }
    }

    fn validate_monitoring(&self, config: &AppConfig, result: &mut ValidationResult) {
        if config.monitoring.error_buffer_size == 0 {
            result.error("monitoring.error_buffer_size must be at least 1");
        }
        if config.monitoring.health_check_interval_seconds == 0 {
            result.error("monitoring.health_check_interval_seconds must be greater than zero");
        }
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

fn check_url(value: &str, field: &str, result: &mut ValidationResult) {
    match Url::parse(value) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => {}
        Ok(url) => result.error(format!("{} must be http(s), got scheme '{}'", field, url.scheme())),
        Err(e) => result.error(format!("{} is not a valid URL ({}): {}", field, value, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::AppConfig;

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.supabase.url = "https://demo.supabase.co".to_string();
        config.supabase.anon_key = "anon".to_string();
        config.security.encryption_key = base64::engine::general_purpose::STANDARD.encode([7u8; 32]);
        config
    }

    #[test]
    fn test_valid_config_passes() {
        let result = ConfigValidator::new().validate(&valid_config());
        assert!(result.is_valid, "errors: {:?}", result.errors);
        assert!(result.into_result().is_ok());
    }

    #[test]
    fn test_bad_values_are_errors() {
        let mut config = valid_config();
        config.solana.rpc_url = "not a url".to_string();
        config.security.encryption_key = base64::engine::general_purpose::STANDARD.encode([1u8; 16]);
        config.helius.key_refresh_interval_seconds = 0;

        let result = ConfigValidator::new().validate(&config);

        assert!(!result.is_valid);
        assert_eq!(result.errors.len(), 3);
        assert!(result.into_result().is_err());
    }

    #[test]
    fn test_production_requires_supabase() {
        let mut config = AppConfig::default();
        config.environment.name = "production".to_string();

        let result = ConfigValidator::new().validate(&config);
        assert!(result.errors.iter().any(|e| e.contains("Supabase")));
    }

    #[test]
    fn test_strict_mode_fails_on_warnings() {
        let config = AppConfig::default();

        assert!(ConfigValidator::new().validate(&config).is_valid);
        assert!(!ConfigValidator::new().with_strict_mode().validate(&config).is_valid);
    }
}
