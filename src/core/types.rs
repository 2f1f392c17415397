//! Core type definitions and row models for the dashboard tables
//!
//! Each Supabase table the dashboard touches has a flat serde struct here.
//! Server-assigned columns (`id`, `created_at`) are optional so the same
//! struct can be used for inserts and reads.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::core::error::AppError;

/// A row type stored in a named table
pub trait TableRow: Serialize + DeserializeOwned + Send + Sync + Clone + 'static {
    /// Table name in the Supabase schema
    const TABLE: &'static str;
}

macro_rules! table_row {
    ($ty:ty, $name:literal) => {
        impl TableRow for $ty {
            const TABLE: &'static str = $name;
        }
    };
}

/// Solana account address (base58 public key)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WalletAddress(String);

impl WalletAddress {
    /// Create a new address, validating it as a public key
    pub fn new(address: impl Into<String>) -> Result<Self, AppError> {
        let address = address.into();
        crate::core::validation::validate_solana_address(&address)?;
        Ok(Self(address))
    }

    /// Get the address as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parse into an on-chain public key
    pub fn to_pubkey(&self) -> Result<solana_sdk::pubkey::Pubkey, AppError> {
        solana_sdk::pubkey::Pubkey::from_str(&self.0)
            .map_err(|e| AppError::invalid_field("address", &self.0, e.to_string()))
    }

    /// Shortened form used in log lines, e.g. `7xKX…gAsU`
    pub fn short(&self) -> String {
        if self.0.len() <= 8 {
            return self.0.clone();
        }
        format!("{}…{}", &self.0[..4], &self.0[self.0.len() - 4..])
    }
}

impl fmt::Display for WalletAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for WalletAddress {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Confirmation outcome of an on-chain transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Confirmed without error
    Success,
    /// Landed with an instruction error
    Failed,
    /// Seen but not yet confirmed
    Pending,
}

/// Transaction category, derived from the Helius `type` label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Transfer,
    Swap,
    Nft,
    Stake,
    #[serde(other)]
    Other,
}

impl TransactionKind {
    /// Map a Helius enhanced transaction type such as `TOKEN_TRANSFER` or `NFT_SALE`
    pub fn from_label(label: &str) -> Self {
        let label = label.to_ascii_uppercase();
        match label.as_str() {
            "TRANSFER" | "TOKEN_TRANSFER" => Self::Transfer,
            "SWAP" => Self::Swap,
            "STAKE_SOL" | "UNSTAKE_SOL" | "STAKE_TOKEN" | "UNSTAKE_TOKEN" => Self::Stake,
            _ if label.starts_with("NFT_") || label.starts_with("COMPRESSED_NFT_") => Self::Nft,
            _ => Self::Other,
        }
    }
}

/// Side of a bot trade
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    Buy,
    Sell,
}

/// External services a key can be stored for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceName {
    Helius,
    Solscan,
    CoinGecko,
    Jupiter,
}

impl ServiceName {
    /// Value of `api_keys_storage.service` and the metrics `service` label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Helius => "helius",
            Self::Solscan => "solscan",
            Self::CoinGecko => "coingecko",
            Self::Jupiter => "jupiter",
        }
    }
}

impl FromStr for ServiceName {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "helius" => Ok(Self::Helius),
            "solscan" => Ok(Self::Solscan),
            "coingecko" => Ok(Self::CoinGecko),
            "jupiter" => Ok(Self::Jupiter),
            other => Err(AppError::invalid_field("service", other, "unknown service")),
        }
    }
}

/// Status of a stored API key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyStatus {
    Active,
    Inactive,
    Revoked,
}

impl KeyStatus {
    /// Column value used in PostgREST filters
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Revoked => "revoked",
        }
    }
}

impl FromStr for KeyStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "revoked" => Ok(Self::Revoked),
            other => Err(AppError::invalid_field("status", other, "unknown key status")),
        }
    }
}

/// Trading bot configuration record (`bots`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bot {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: String,
    pub name: String,
    pub strategy: String,
    #[serde(default)]
    pub params: serde_json::Value,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}
table_row!(Bot, "bots");

/// Whether a bot is switched on; bots never execute trades themselves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotStatus {
    Active,
    Paused,
}

impl Bot {
    pub fn status(&self) -> BotStatus {
        if self.is_active {
            BotStatus::Active
        } else {
            BotStatus::Paused
        }
    }
}

/// Aggregated performance per bot (`bot_performance`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotPerformance {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub bot_id: String,
    #[serde(default)]
    pub total_trades: u64,
    #[serde(default)]
    pub winning_trades: u64,
    #[serde(default)]
    pub total_profit: Decimal,
    #[serde(default)]
    pub total_volume: Decimal,
    #[serde(default)]
    pub win_rate: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}
table_row!(BotPerformance, "bot_performance");

/// A trade executed on behalf of a bot (`bot_transactions`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotTransaction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub bot_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    pub side: TradeSide,
    pub token_mint: String,
    pub amount: Decimal,
    pub price: Decimal,
    /// Realised profit in SOL, set on closing trades
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profit: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}
table_row!(BotTransaction, "bot_transactions");

/// Predefined strategy template (`bot_templates`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub strategy: String,
    #[serde(default)]
    pub default_params: serde_json::Value,
}
table_row!(BotTemplate, "bot_templates");

/// Third-party API key (`api_keys_storage`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiKeyRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub service: String,
    pub key_name: String,
    pub api_key: String,
    pub status: KeyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}
table_row!(ApiKeyRecord, "api_keys_storage");

/// Destination a user allows transfers to (`approved_addresses`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovedAddress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}
table_row!(ApprovedAddress, "approved_addresses");

/// Per-user transfer policy (`transaction_settings`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: String,
    /// Rolling 24h cap in SOL
    pub daily_limit: Decimal,
    #[serde(default)]
    pub require_approved_addresses: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}
table_row!(TransactionSettings, "transaction_settings");

/// Cached on-chain transaction (`transactions`)
///
/// Everything but the signature is optional: a row may be known only from the
/// database cache, only from RPC, or from both.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub signature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slot: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TransactionStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<TransactionKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_mint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memo: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
table_row!(TransactionRecord, "transactions");

/// Token metadata (`tokens`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub mint: String,
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    pub decimals: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo_uri: Option<String>,
}
table_row!(TokenRecord, "tokens");

/// Wallet linked to a user (`wallets`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default = "default_wallet_type")]
    pub wallet_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_connected_at: Option<DateTime<Utc>>,
}
table_row!(WalletRecord, "wallets");

/// User profile (`profiles`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(default = "default_currency")]
    pub preferred_currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}
table_row!(Profile, "profiles");

/// Persisted error report (`error_logs`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub message: String,
    pub component: String,
    pub severity: String,
    #[serde(default)]
    pub context: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
table_row!(ErrorLogEntry, "error_logs");

/// Account security preferences (`security_settings`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecuritySettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: String,
    #[serde(default)]
    pub two_factor_enabled: bool,
    #[serde(default = "default_session_timeout")]
    pub session_timeout_minutes: u32,
    #[serde(default = "default_true")]
    pub login_notifications: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}
table_row!(SecuritySettings, "security_settings");

impl SecuritySettings {
    /// Settings applied when the user has never saved any
    pub fn defaults_for(user_id: &str) -> Self {
        Self {
            id: None,
            user_id: user_id.to_string(),
            two_factor_enabled: false,
            session_timeout_minutes: default_session_timeout(),
            login_notifications: true,
            updated_at: None,
        }
    }
}

/// Login / wallet session (`user_sessions`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
}
table_row!(UserSession, "user_sessions");

/// Cached Solscan response (`solscan_data`)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolscanData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Wallet or mint the response describes
    pub address: String,
    /// Endpoint family: `tokens` or `meta`
    pub data_type: String,
    pub data: serde_json::Value,
    pub fetched_at: DateTime<Utc>,
}
table_row!(SolscanData, "solscan_data");

fn default_wallet_type() -> String {
    "phantom".to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_session_timeout() -> u32 {
    60
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_wallet_address_validation() {
        let address = WalletAddress::new("11111111111111111111111111111111").unwrap();
        assert_eq!(address.as_str(), "11111111111111111111111111111111");
        assert_eq!(address.short(), "1111…1111");
        assert!(address.to_pubkey().is_ok());

        assert!(WalletAddress::new("not-an-address").is_err());
        assert!("".parse::<WalletAddress>().is_err());
    }

    #[test]
    fn test_transaction_record_sparse_json() {
        let record: TransactionRecord = serde_json::from_value(serde_json::json!({
            "signature": "abc",
            "status": "success",
            "block_time": "2024-05-01T12:00:00Z"
        }))
        .unwrap();

        assert_eq!(record.signature, "abc");
        assert_eq!(record.status, Some(TransactionStatus::Success));
        assert!(record.amount.is_none());

        let value = serde_json::to_value(&record).unwrap();
        assert!(value.get("amount").is_none());
    }

    #[test]
    fn test_key_status_parsing() {
        assert_eq!("ACTIVE".parse::<KeyStatus>().unwrap(), KeyStatus::Active);
        assert!("paused".parse::<KeyStatus>().is_err());
        assert_eq!(KeyStatus::Revoked.as_str(), "revoked");
    }

    #[test]
    fn test_transaction_kind_labels() {
        assert_eq!(TransactionKind::from_label("TRANSFER"), TransactionKind::Transfer);
        assert_eq!(TransactionKind::from_label("token_transfer"), TransactionKind::Transfer);
        assert_eq!(TransactionKind::from_label("NFT_SALE"), TransactionKind::Nft);
        assert_eq!(TransactionKind::from_label("UNSTAKE_SOL"), TransactionKind::Stake);
        assert_eq!(TransactionKind::from_label("COMPRESSED_NFT_MINT"), TransactionKind::Nft);
        assert_eq!(TransactionKind::from_label("UNKNOWN"), TransactionKind::Other);

        let record: TransactionRecord =
            serde_json::from_value(serde_json::json!({ "signature": "s", "kind": "airdrop" })).unwrap();
        assert_eq!(record.kind, Some(TransactionKind::Other));
    }

    #[test]
    fn test_service_names() {
        assert_eq!(" CoinGecko ".parse::<ServiceName>().unwrap(), ServiceName::CoinGecko);
        assert_eq!(serde_json::to_value(ServiceName::CoinGecko).unwrap(), "coingecko");
        assert_eq!(ServiceName::Helius.as_str(), "helius");
        assert!("birdeye".parse::<ServiceName>().is_err());
    }

    #[test]
    fn test_table_names() {
        assert_eq!(ApiKeyRecord::TABLE, "api_keys_storage");
        assert_eq!(TransactionRecord::TABLE, "transactions");
        assert_eq!(SolscanData::TABLE, "solscan_data");
    }
}
