//! Dashboard error type
//!
//! Every service returns [`AppResult`](crate::core::result::AppResult). Call
//! sites that surface a failure to the user hand it to the error collector,
//! which turns it into an [`ErrorContext`] with [`AppError::to_context`].

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised by the dashboard services
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum AppError {
    /// Missing or malformed configuration
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Table store failure (PostgREST error, unreachable backend, bad row)
    #[error("Database error: {message}")]
    Database {
        message: String,
        table: Option<String>,
        operation: String,
    },

    /// Transport failure talking to RPC or an HTTP API
    #[error("Network error: {message}")]
    Network { message: String, endpoint: Option<String> },

    #[error("Not found: {entity} {id}")]
    NotFound { entity: String, id: String },

    /// Rejected user input
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
        value: Option<String>,
    },

    /// Policy refusal: unapproved destination, wrong passphrase
    #[error("Security error: {message}")]
    Security { message: String, user_id: Option<String> },

    /// The transfer would push the rolling daily spend over the user's limit
    #[error("Daily spend limit exceeded: {spent} + {requested} > {limit} SOL")]
    SpendLimit {
        user_id: String,
        limit: Decimal,
        spent: Decimal,
        requested: Decimal,
    },

    /// Locked vault or an undecryptable stored value
    #[error("Vault error: {message}")]
    Vault { message: String, locked: bool },

    /// Helius, Solscan, CoinGecko or Jupiter answered with an error
    #[error("External service error: {service} - {message}")]
    ExternalService {
        service: String,
        message: String,
        status_code: Option<u16>,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("Timeout error: {message}")]
    Timeout {
        message: String,
        operation: String,
        duration_ms: u64,
    },
}

/// How loudly an error is logged and how it is labelled in `error_logs`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Expected user-facing failures (bad input, limit reached)
    Low,
    /// Degraded functionality, usually transient
    Medium,
    /// A feature is unavailable
    High,
    /// Requires operator attention
    Critical,
}

impl ErrorSeverity {
    /// Lowercase label stored in `error_logs.severity`
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// What the error collector records next to the message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    pub severity: ErrorSeverity,
    /// Service that reported the error
    pub component: String,
    pub user_id: Option<String>,
    /// Variant-specific details (table, endpoint, limit, ...)
    pub metadata: HashMap<String, String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl AppError {
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into() }
    }

    /// Store error without a table, e.g. a failed health probe
    pub fn database<S: Into<String>, O: Into<String>>(message: S, operation: O) -> Self {
        Self::Database {
            message: message.into(),
            table: None,
            operation: operation.into(),
        }
    }

    /// Store error for one table operation
    pub fn table<S: Into<String>>(table: &str, operation: &str, message: S) -> Self {
        Self::Database {
            message: message.into(),
            table: Some(table.to_string()),
            operation: operation.to_string(),
        }
    }

    pub fn network<S: Into<String>>(message: S) -> Self {
        Self::Network {
            message: message.into(),
            endpoint: None,
        }
    }

    pub fn not_found<E: Into<String>, I: Into<String>>(entity: E, id: I) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn security<S: Into<String>>(message: S) -> Self {
        Self::Security {
            message: message.into(),
            user_id: None,
        }
    }

    /// Policy refusal attributed to a user
    pub fn denied<S: Into<String>>(user_id: &str, message: S) -> Self {
        Self::Security {
            message: message.into(),
            user_id: Some(user_id.to_string()),
        }
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
            value: None,
        }
    }

    /// Validation error naming the offending field and value
    pub fn invalid_field<S: Into<String>>(field: &str, value: &str, message: S) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.to_string()),
            value: Some(value.to_string()),
        }
    }

    pub fn vault<S: Into<String>>(message: S) -> Self {
        Self::Vault {
            message: message.into(),
            locked: false,
        }
    }

    /// The operation needs an unlocked vault
    pub fn vault_locked() -> Self {
        Self::Vault {
            message: "API vault is locked".to_string(),
            locked: true,
        }
    }

    pub fn external<S: Into<String>, M: Into<String>>(service: S, message: M, status_code: Option<u16>) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
            status_code,
        }
    }

    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    pub fn timeout<S: Into<String>, O: Into<String>>(message: S, operation: O, duration_ms: u64) -> Self {
        Self::Timeout {
            message: message.into(),
            operation: operation.into(),
            duration_ms,
        }
    }

    /// Short variant label, used as the `kind` metric label and context entry
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Database { .. } => "database",
            Self::Network { .. } => "network",
            Self::NotFound { .. } => "not_found",
            Self::Validation { .. } => "validation",
            Self::Security { .. } => "security",
            Self::SpendLimit { .. } => "spend_limit",
            Self::Vault { .. } => "vault",
            Self::ExternalService { .. } => "external_service",
            Self::Internal { .. } => "internal",
            Self::Timeout { .. } => "timeout",
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Validation { .. }
            | Self::NotFound { .. }
            | Self::SpendLimit { .. }
            | Self::Vault { locked: true, .. } => ErrorSeverity::Low,
            Self::Network { .. } | Self::Timeout { .. } | Self::ExternalService { .. } => ErrorSeverity::Medium,
            Self::Vault { .. } | Self::Database { .. } => ErrorSeverity::High,
            Self::Config { .. } | Self::Security { .. } | Self::Internal { .. } => ErrorSeverity::Critical,
        }
    }

    /// Transport failures, timeouts, 429 and 5xx are worth another attempt
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::Timeout { .. } => true,
            Self::ExternalService { status_code, .. } => status_code.map_or(true, |code| code == 429 || code >= 500),
            _ => false,
        }
    }

    /// Attach the endpoint to a network error; other variants are unchanged
    pub fn with_endpoint<S: Into<String>>(mut self, url: S) -> Self {
        if let Self::Network { endpoint, .. } = &mut self {
            *endpoint = Some(url.into());
        }
        self
    }

    pub fn to_context(&self, component: &str) -> ErrorContext {
        let mut metadata = HashMap::from([("kind".to_string(), self.kind().to_string())]);
        let mut user_id = None;

        match self {
            Self::Database { table, operation, .. } => {
                if let Some(t) = table {
                    metadata.insert("table".to_string(), t.clone());
                }
                metadata.insert("operation".to_string(), operation.clone());
            }
            Self::Network {
                endpoint: Some(endpoint),
                ..
            } => {
                metadata.insert("endpoint".to_string(), endpoint.clone());
            }
            Self::NotFound { entity, id } => {
                metadata.insert("entity".to_string(), entity.clone());
                metadata.insert("id".to_string(), id.clone());
            }
            Self::SpendLimit {
                user_id: uid,
                limit,
                spent,
                requested,
            } => {
                user_id = Some(uid.clone());
                metadata.insert("limit".to_string(), limit.to_string());
                metadata.insert("spent".to_string(), spent.to_string());
                metadata.insert("requested".to_string(), requested.to_string());
            }
            Self::Security { user_id: uid, .. } => {
                user_id = uid.clone();
            }
            Self::ExternalService {
                service, status_code, ..
            } => {
                metadata.insert("service".to_string(), service.clone());
                if let Some(code) = status_code {
                    metadata.insert("status_code".to_string(), code.to_string());
                }
            }
            Self::Validation { field: Some(field), .. } => {
                metadata.insert("field".to_string(), field.clone());
            }
            Self::Timeout {
                operation, duration_ms, ..
            } => {
                metadata.insert("operation".to_string(), operation.clone());
                metadata.insert("duration_ms".to_string(), duration_ms.to_string());
            }
            _ => {}
        }

        ErrorContext {
            severity: self.severity(),
            component: component.to_string(),
            user_id,
            metadata,
            timestamp: chrono::Utc::now(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(format!("{:#}", err))
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::validation(format!("Malformed JSON: {}", err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::internal(format!("IO error: {}", err))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            let endpoint = err.url().map(|u| u.to_string()).unwrap_or_default();
            return Self::timeout(format!("HTTP request timed out: {}", err), endpoint, 0);
        }
        let error = Self::network(format!("HTTP request failed: {}", err));
        match err.url() {
            Some(url) => error.with_endpoint(url.as_str()),
            None => error,
        }
    }
}

impl From<solana_client::client_error::ClientError> for AppError {
    fn from(err: solana_client::client_error::ClientError) -> Self {
        Self::network(format!("Solana RPC error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;

    #[test]
    fn test_severity_mapping() {
        assert_eq!(AppError::config("missing url").severity(), ErrorSeverity::Critical);
        assert_eq!(AppError::table("bots", "select", "boom").severity(), ErrorSeverity::High);
        assert_eq!(AppError::network("reset").severity(), ErrorSeverity::Medium);
        assert_eq!(AppError::not_found("bot", "b-1").severity(), ErrorSeverity::Low);
        assert_eq!(AppError::vault_locked().severity(), ErrorSeverity::Low);
        assert_eq!(AppError::vault("bad ciphertext").severity(), ErrorSeverity::High);
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(AppError::table("bots", "select", "boom").kind(), "database");
        assert_eq!(AppError::vault_locked().kind(), "vault");
        assert_eq!(AppError::external("coingecko", "down", None).kind(), "external_service");
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(AppError::network("Connection failed").is_retryable());
        assert!(AppError::timeout("slow", "helius", 1000).is_retryable());
        assert!(AppError::external("helius", "busy", Some(503)).is_retryable());
        assert!(AppError::external("helius", "slow down", Some(429)).is_retryable());
        assert!(!AppError::external("helius", "bad key", Some(401)).is_retryable());
        assert!(!AppError::validation("Invalid input").is_retryable());
    }

    #[test]
    fn test_endpoint_only_on_network_errors() {
        let error = AppError::network("refused").with_endpoint("https://api.helius.xyz");
        assert_matches!(error, AppError::Network { endpoint: Some(ref e), .. } if e == "https://api.helius.xyz");

        let unchanged = AppError::validation("x").with_endpoint("https://api.helius.xyz");
        assert_matches!(unchanged, AppError::Validation { .. });
    }

    #[test]
    fn test_spend_limit_context() {
        let error = AppError::SpendLimit {
            user_id: "user-1".to_string(),
            limit: dec!(10),
            spent: dec!(8),
            requested: dec!(3),
        };
        let context = error.to_context("transaction_security");

        assert_eq!(context.component, "transaction_security");
        assert_eq!(context.severity, ErrorSeverity::Low);
        assert_eq!(context.user_id.as_deref(), Some("user-1"));
        assert_eq!(context.metadata.get("limit").map(String::as_str), Some("10"));
        assert_eq!(context.metadata.get("kind").map(String::as_str), Some("spend_limit"));
        assert_eq!(error.to_string(), "Daily spend limit exceeded: 8 + 3 > 10 SOL");
    }

    #[test]
    fn test_denied_carries_user() {
        let context = AppError::denied("user-9", "destination not approved").to_context("security");
        assert_eq!(context.user_id.as_deref(), Some("user-9"));
        assert_eq!(context.severity, ErrorSeverity::Critical);
    }
}
