//! Configuration loading
//!
//! Layers, lowest to highest precedence: built-in defaults, a TOML file,
//! `DASHBOARD_*` environment variables (after `.env` is read), and command
//! line flags.

use anyhow::{Context, Result};
use config::{Config, Environment};
use rust_decimal::Decimal;
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::models::AppConfig;
use crate::core::error::AppError;
use crate::core::result::AppResult;
use crate::utils::CliArgs;

const DEFAULT_PATHS: [&str; 3] = [
    "configs/dashboard.toml",
    "dashboard.toml",
    "/etc/solana-dashboard/dashboard.toml",
];

type Apply = fn(&mut AppConfig, String) -> Result<()>;

/// Environment keys (after the prefix) and the field each one sets
const ENV_OVERRIDES: &[(&str, Apply)] = &[
    ("environment", |c, v| {
        c.environment.name = v;
        Ok(())
    }),
    ("log_level", |c, v| {
        c.environment.log_level = v;
        Ok(())
    }),
    ("log_format", |c, v| {
        c.environment.log_format = v;
        Ok(())
    }),
    ("log_directory", |c, v| {
        c.environment.log_directory = Some(v);
        Ok(())
    }),
    ("offline", |c, v| {
        c.environment.offline = parse_flag(&v);
        Ok(())
    }),
    ("supabase_url", |c, v| {
        c.supabase.url = v;
        Ok(())
    }),
    ("supabase_anon_key", |c, v| {
        c.supabase.anon_key = v;
        Ok(())
    }),
    ("supabase_service_role_key", |c, v| {
        c.supabase.service_role_key = Some(v);
        Ok(())
    }),
    ("solana_rpc_url", |c, v| {
        c.solana.rpc_url = v;
        Ok(())
    }),
    ("helius_api_key", |c, v| {
        c.helius.api_key = v;
        Ok(())
    }),
    ("coingecko_api_key", |c, v| {
        c.market.coingecko_api_key = Some(v);
        Ok(())
    }),
    ("jupiter_api_key", |c, v| {
        c.market.jupiter_api_key = Some(v);
        Ok(())
    }),
    ("solscan_api_key", |c, v| {
        c.market.solscan_api_key = Some(v);
        Ok(())
    }),
    ("encryption_key", |c, v| {
        c.security.encryption_key = v;
        Ok(())
    }),
    ("vault_passphrase_hash", |c, v| {
        c.security.vault_passphrase_hash = Some(v);
        Ok(())
    }),
    ("default_daily_limit_sol", |c, v| {
        c.security.default_daily_limit_sol =
            Decimal::from_str(v.trim()).with_context(|| format!("'{}' is not a SOL amount", v))?;
        Ok(())
    }),
    ("data_dir", |c, v| {
        c.storage.data_dir = v;
        Ok(())
    }),
    ("metrics_port", |c, v| {
        c.monitoring.metrics_port = v.trim().parse().with_context(|| format!("'{}' is not a port", v))?;
        Ok(())
    }),
];

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Builder that assembles an [`AppConfig`] from every source
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    cli_args: Option<CliArgs>,
    env_prefix: String,
    enable_env: bool,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            config_path: None,
            cli_args: None,
            env_prefix: "DASHBOARD".to_string(),
            enable_env: true,
        }
    }

    /// Read this file instead of searching the default locations
    pub fn with_config_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_path = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_cli_args(mut self, args: CliArgs) -> Self {
        self.cli_args = Some(args);
        self
    }

    pub fn with_env_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Skip `.env` and environment overrides
    pub fn without_env(mut self) -> Self {
        self.enable_env = false;
        self
    }

    pub async fn load(self) -> AppResult<AppConfig> {
        self.load_layers().await.map_err(|e| AppError::config(format!("{:#}", e)))
    }

    async fn load_layers(&self) -> Result<AppConfig> {
        info!("🔧 Loading configuration");
        let mut config = self.load_file().await?;

        if self.enable_env {
            if let Err(e) = dotenvy::dotenv() {
                debug!("📄 No .env file loaded: {}", e);
            }
            self.apply_environment_overrides(&mut config)
                .context("Invalid environment override")?;
        }

        if let Some(cli_args) = &self.cli_args {
            apply_cli_overrides(&mut config, cli_args);
        }

        debug!(
            "✅ Configuration ready: environment={}, in_memory_store={}",
            config.environment.name,
            config.use_in_memory_store()
        );
        Ok(config)
    }

    async fn load_file(&self) -> Result<AppConfig> {
        let path = self.resolve_config_path();

        if !path.exists() {
            warn!("⚠️  No configuration file at {}, using defaults", path.display());
            return Ok(AppConfig::default());
        }

        info!("📄 Reading configuration from {}", path.display());
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn resolve_config_path(&self) -> PathBuf {
        let explicit = self
            .config_path
            .clone()
            .or_else(|| self.cli_args.as_ref()?.config_path.as_ref().map(PathBuf::from))
            .or_else(|| env::var("CONFIG_PATH").ok().map(PathBuf::from));
        if let Some(path) = explicit {
            return path;
        }

        DEFAULT_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|candidate| candidate.exists())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_PATHS[0]))
    }

    fn apply_environment_overrides(&self, config: &mut AppConfig) -> Result<()> {
        let env_config = Config::builder()
            .add_source(
                Environment::with_prefix(&self.env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .ignore_empty(true),
            )
            .build()
            .context("Failed to read environment")?;

        for (key, apply) in ENV_OVERRIDES {
            if let Ok(value) = env_config.get_string(key) {
                apply(config, value).with_context(|| format!("{}_{}", self.env_prefix, key.to_uppercase()))?;
                debug!("🔄 Applied environment override: {}", key);
            }
        }
        Ok(())
    }
}

fn apply_cli_overrides(config: &mut AppConfig, cli_args: &CliArgs) {
    if let Some(name) = &cli_args.environment {
        config.environment.name = name.clone();
    }
    if let Some(level) = &cli_args.log_level {
        config.environment.log_level = level.clone();
    }
    if let Some(format) = &cli_args.log_format {
        config.environment.log_format = format.clone();
    }
    config.environment.offline |= cli_args.offline;
    config.monitoring.enable_metrics |= cli_args.enable_metrics;
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::Command;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn cli_args() -> CliArgs {
        CliArgs {
            config_path: None,
            log_level: Some("debug".to_string()),
            log_format: Some("json".to_string()),
            environment: Some("staging".to_string()),
            offline: true,
            enable_metrics: true,
            command: Some(Command::Serve),
        }
    }

    #[tokio::test]
    async fn test_missing_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let config = ConfigLoader::new()
            .with_config_path(dir.path().join("missing.toml"))
            .without_env()
            .load()
            .await
            .unwrap();

        assert_eq!(config.environment.name, "development");
        assert!(config.is_development());
        assert!(config.use_in_memory_store());
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dashboard.toml");
        tokio::fs::write(
            &path,
            r#"
            [environment]
            log_level = "warn"

            [supabase]
            url = "https://demo.supabase.co"
            anon_key = "anon-key"

            [helius]
            key_refresh_interval_seconds = 120
            "#,
        )
        .await
        .unwrap();

        let config = ConfigLoader::new().with_config_path(&path).without_env().load().await.unwrap();

        assert_eq!(config.supabase.url, "https://demo.supabase.co");
        assert_eq!(config.helius.key_refresh_interval_seconds, 120);
        assert_eq!(config.environment.log_level, "warn");
        assert!(!config.use_in_memory_store());
    }

    #[tokio::test]
    async fn test_invalid_toml_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        tokio::fs::write(&path, "[supabase\nurl = ").await.unwrap();

        let result = ConfigLoader::new().with_config_path(&path).without_env().load().await;
        assert_matches!(result, Err(AppError::Config { .. }));
    }

    #[tokio::test]
    async fn test_cli_overrides() {
        let dir = TempDir::new().unwrap();
        let config = ConfigLoader::new()
            .with_config_path(dir.path().join("missing.toml"))
            .with_cli_args(cli_args())
            .without_env()
            .load()
            .await
            .unwrap();

        assert_eq!(config.environment.log_level, "debug");
        assert_eq!(config.environment.log_format, "json");
        assert_eq!(config.environment.name, "staging");
        assert!(config.environment.offline);
        assert!(config.monitoring.enable_metrics);
    }

    #[tokio::test]
    async fn test_unset_cli_flags_keep_file_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("dashboard.toml");
        tokio::fs::write(&path, "[environment]\nlog_level = \"warn\"\n").await.unwrap();

        let args = CliArgs {
            log_level: None,
            log_format: None,
            environment: None,
            offline: false,
            enable_metrics: false,
            ..cli_args()
        };
        let config = ConfigLoader::new()
            .with_config_path(&path)
            .with_cli_args(args)
            .without_env()
            .load()
            .await
            .unwrap();

        assert_eq!(config.environment.log_level, "warn");
        assert!(!config.environment.offline);
    }

    #[test]
    fn test_environment_variable_override() {
        env::set_var("DASHBOARDTEST_HELIUS_API_KEY", "env-helius-key");
        env::set_var("DASHBOARDTEST_DEFAULT_DAILY_LIMIT_SOL", "4.25");
        env::set_var("DASHBOARDTEST_OFFLINE", "yes");

        let loader = ConfigLoader::new().with_env_prefix("DASHBOARDTEST");
        let mut config = AppConfig::default();
        let result = loader.apply_environment_overrides(&mut config);

        env::remove_var("DASHBOARDTEST_HELIUS_API_KEY");
        env::remove_var("DASHBOARDTEST_DEFAULT_DAILY_LIMIT_SOL");
        env::remove_var("DASHBOARDTEST_OFFLINE");

        assert!(result.is_ok());
        assert_eq!(config.helius.api_key, "env-helius-key");
        assert_eq!(config.security.default_daily_limit_sol, rust_decimal_macros::dec!(4.25));
        assert!(config.environment.offline);
    }

    #[test]
    fn test_bad_numeric_override_is_rejected() {
        env::set_var("DASHBOARDBAD_METRICS_PORT", "not-a-port");

        let loader = ConfigLoader::new().with_env_prefix("DASHBOARDBAD");
        let mut config = AppConfig::default();
        let result = loader.apply_environment_overrides(&mut config);

        env::remove_var("DASHBOARDBAD_METRICS_PORT");

        let message = format!("{:#}", result.unwrap_err());
        assert!(message.contains("DASHBOARDBAD_METRICS_PORT"));
    }
}
