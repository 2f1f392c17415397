//! Configuration data structures and models
//!
//! The complete configuration tree for the dashboard backend. Every field has
//! a serde default so a partial TOML file (or none at all) still produces a
//! usable configuration.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Main application configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Environment configuration
    #[serde(default)]
    pub environment: EnvironmentConfig,

    /// Supabase (PostgREST) connection
    #[serde(default)]
    pub supabase: SupabaseConfig,

    /// Solana RPC configuration
    #[serde(default)]
    pub solana: SolanaConfig,

    /// Helius API configuration
    #[serde(default)]
    pub helius: HeliusConfig,

    /// Price and explorer APIs
    #[serde(default)]
    pub market: MarketConfig,

    /// Vault and spend-limit configuration
    #[serde(default)]
    pub security: SecurityConfig,

    /// Local key/value store
    #[serde(default)]
    pub storage: StorageConfig,

    /// Monitoring configuration
    #[serde(default)]
    pub monitoring: MonitoringConfig,
}

/// Environment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnvironmentConfig {
    /// Environment name (development, staging, production)
    #[serde(default = "default_environment")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log format (json, pretty, compact)
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Write rotated log files here in addition to stdout
    #[serde(default)]
    pub log_directory: Option<String>,

    /// Use the in-memory table store instead of Supabase
    #[serde(default)]
    pub offline: bool,
}

/// Supabase configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`
    #[serde(default)]
    pub url: String,

    /// Public anon key, sent as `apikey`
    #[serde(default)]
    pub anon_key: String,

    /// Service role key; used as the bearer token when present
    #[serde(default)]
    pub service_role_key: Option<String>,

    /// Postgres schema exposed through PostgREST
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

/// Solana RPC configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolanaConfig {
    /// RPC endpoint URL
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Commitment level (processed, confirmed, finalized)
    #[serde(default = "default_commitment")]
    pub commitment: String,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

/// Helius API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeliusConfig {
    /// REST base URL
    #[serde(default = "default_helius_url")]
    pub base_url: String,

    /// Key used when `api_keys_storage` has no active Helius keys
    #[serde(default)]
    pub api_key: String,

    /// Seconds between key list refreshes
    #[serde(default = "default_key_refresh_interval")]
    pub key_refresh_interval_seconds: u64,

    /// Attempts per key list refresh
    #[serde(default = "default_max_retries")]
    pub refresh_attempts: u32,

    /// Seconds a single request may keep retrying
    #[serde(default = "default_max_elapsed")]
    pub max_retry_elapsed_seconds: u64,

    /// Concurrent requests in flight
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_requests: usize,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

/// Market data API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    /// CoinGecko API base URL
    #[serde(default = "default_coingecko_url")]
    pub coingecko_url: String,

    /// CoinGecko demo/pro key
    #[serde(default)]
    pub coingecko_api_key: Option<String>,

    /// Jupiter price API (v2) URL
    #[serde(default = "default_jupiter_price_url")]
    pub jupiter_price_url: String,

    /// Jupiter swap quote URL
    #[serde(default = "default_jupiter_quote_url")]
    pub jupiter_quote_url: String,

    /// Jupiter API key (sent as `x-api-key`)
    #[serde(default)]
    pub jupiter_api_key: Option<String>,

    /// Solscan API base URL
    #[serde(default = "default_solscan_url")]
    pub solscan_url: String,

    /// Solscan API token
    #[serde(default)]
    pub solscan_api_key: Option<String>,

    /// Seconds a cached `solscan_data` row stays fresh
    #[serde(default = "default_solscan_ttl")]
    pub solscan_cache_ttl_seconds: u64,

    /// Per-request timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

/// Security configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Base64 AES-256 key for vault values; empty stores keys as given
    #[serde(default)]
    pub encryption_key: String,

    /// Argon2 PHC hash of the vault passphrase
    #[serde(default)]
    pub vault_passphrase_hash: Option<String>,

    /// Daily limit used when a user has no `transaction_settings` row
    #[serde(default = "default_daily_limit")]
    pub default_daily_limit_sol: Decimal,

    /// Length of the spend window in hours
    #[serde(default = "default_spend_window")]
    pub spend_window_hours: u64,
}

/// Local store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding the local store file
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// File name of the local store
    #[serde(default = "default_store_file")]
    pub file_name: String,
}

/// Monitoring configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Install the Prometheus exporter
    #[serde(default)]
    pub enable_metrics: bool,

    /// Prometheus listener port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Seconds between health checks while serving
    #[serde(default = "default_health_interval")]
    pub health_check_interval_seconds: u64,

    /// Write reported errors to `error_logs`
    #[serde(default = "default_true")]
    pub persist_errors: bool,

    /// Errors kept in memory
    #[serde(default = "default_error_buffer")]
    pub error_buffer_size: usize,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            name: default_environment(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            log_directory: None,
            offline: false,
        }
    }
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            anon_key: String::new(),
            service_role_key: None,
            schema: default_schema(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl Default for SolanaConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            commitment: default_commitment(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl Default for HeliusConfig {
    fn default() -> Self {
        Self {
            base_url: default_helius_url(),
            api_key: String::new(),
            key_refresh_interval_seconds: default_key_refresh_interval(),
            refresh_attempts: default_max_retries(),
            max_retry_elapsed_seconds: default_max_elapsed(),
            max_concurrent_requests: default_max_concurrent(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            coingecko_url: default_coingecko_url(),
            coingecko_api_key: None,
            jupiter_price_url: default_jupiter_price_url(),
            jupiter_quote_url: default_jupiter_quote_url(),
            jupiter_api_key: None,
            solscan_url: default_solscan_url(),
            solscan_api_key: None,
            solscan_cache_ttl_seconds: default_solscan_ttl(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            encryption_key: String::new(),
            vault_passphrase_hash: None,
            default_daily_limit_sol: default_daily_limit(),
            spend_window_hours: default_spend_window(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            file_name: default_store_file(),
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enable_metrics: false,
            metrics_port: default_metrics_port(),
            health_check_interval_seconds: default_health_interval(),
            persist_errors: true,
            error_buffer_size: default_error_buffer(),
        }
    }
}

fn default_environment() -> String { "development".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "pretty".to_string() }
fn default_schema() -> String { "public".to_string() }
fn default_request_timeout() -> u64 { 10_000 }
fn default_rpc_url() -> String { "https://api.mainnet-beta.solana.com".to_string() }
fn default_commitment() -> String { "confirmed".to_string() }
fn default_helius_url() -> String { "https://api.helius.xyz/v0".to_string() }
fn default_key_refresh_interval() -> u64 { 60 }
fn default_max_retries() -> u32 { 3 }
fn default_max_elapsed() -> u64 { 30 }
fn default_max_concurrent() -> usize { 5 }
fn default_coingecko_url() -> String { "https://api.coingecko.com/api/v3".to_string() }
fn default_jupiter_price_url() -> String { "https://lite-api.jup.ag/price/v2".to_string() }
fn default_jupiter_quote_url() -> String { "https://lite-api.jup.ag/swap/v1/quote".to_string() }
fn default_solscan_url() -> String { "https://pro-api.solscan.io/v2.0".to_string() }
fn default_solscan_ttl() -> u64 { 300 }
fn default_daily_limit() -> Decimal { rust_decimal_macros::dec!(10) }
fn default_spend_window() -> u64 { 24 }
fn default_data_dir() -> String { "./data".to_string() }
fn default_store_file() -> String { "local_store.json".to_string() }
fn default_metrics_port() -> u16 { 9090 }
fn default_health_interval() -> u64 { 30 }
fn default_error_buffer() -> usize { 100 }
fn default_true() -> bool { true }

impl AppConfig {
    /// Check if running in development
    pub fn is_development(&self) -> bool {
        self.environment.name == "development"
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment.name == "production"
    }

    /// Get environment name
    pub fn environment(&self) -> &str {
        &self.environment.name
    }

    /// True when no Supabase project is configured or offline mode was requested
    pub fn use_in_memory_store(&self) -> bool {
        self.environment.offline || self.supabase.url.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [environment]
            name = "production"

            [supabase]
            url = "https://demo.supabase.co"
            anon_key = "anon"

            [security]
            default_daily_limit_sol = 2.5
            "#,
        )
        .unwrap();

        assert!(config.is_production());
        assert!(!config.use_in_memory_store());
        assert_eq!(config.supabase.schema, "public");
        assert_eq!(config.helius.key_refresh_interval_seconds, 60);
        assert_eq!(config.helius.base_url, "https://api.helius.xyz/v0");
        assert_eq!(config.security.default_daily_limit_sol, dec!(2.5));
        assert_eq!(config.security.spend_window_hours, 24);
        assert_eq!(config.environment.log_level, "info");
    }

    #[test]
    fn test_empty_config_runs_offline() {
        let config: AppConfig = toml::from_str("").unwrap();

        assert!(config.is_development());
        assert!(config.use_in_memory_store());
        assert_eq!(config.solana.rpc_url, "https://api.mainnet-beta.solana.com");
        assert!(config.monitoring.persist_errors);
    }
}
