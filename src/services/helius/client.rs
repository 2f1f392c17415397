//! Helius REST client
//!
//! Enhanced transaction history and token balances for an address. Each
//! attempt asks the key manager for the next key, so a rate-limited key is
//! rotated out on retry.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_sdk::native_token::LAMPORTS_PER_SOL;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

use super::key_manager::HeliusKeyManager;
use crate::config::models::HeliusConfig;
use crate::core::result::AppResult;
use crate::core::types::{ServiceName, TransactionKind, TransactionRecord, TransactionStatus, WalletAddress};
use crate::services::http::ApiHttp;
use crate::utils::time::from_unix_timestamp;

/// Largest page the enhanced transactions endpoint returns
pub const MAX_TRANSACTION_PAGE: usize = 100;

/// Native SOL movement inside an enhanced transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NativeTransfer {
    #[serde(default)]
    pub from_user_account: Option<String>,
    #[serde(default)]
    pub to_user_account: Option<String>,
    /// Lamports
    pub amount: u64,
}

/// SPL token movement inside an enhanced transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenTransfer {
    #[serde(default)]
    pub from_user_account: Option<String>,
    #[serde(default)]
    pub to_user_account: Option<String>,
    pub mint: String,
    /// UI amount (already scaled by decimals)
    #[serde(default)]
    pub token_amount: Decimal,
}

/// Parsed transaction from `/addresses/{address}/transactions`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancedTransaction {
    pub signature: String,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub slot: Option<u64>,
    /// Lamports
    #[serde(default)]
    pub fee: Option<u64>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub native_transfers: Vec<NativeTransfer>,
    #[serde(default)]
    pub token_transfers: Vec<TokenTransfer>,
    #[serde(default)]
    pub transaction_error: Option<serde_json::Value>,
}

impl EnhancedTransaction {
    /// Transaction record as seen from `wallet`
    ///
    /// The amount is the first token transfer touching the wallet, or else
    /// the net SOL the wallet sent or received.
    pub fn to_record(&self, wallet: &str) -> TransactionRecord {
        let failed = self.transaction_error.as_ref().is_some_and(|e| !e.is_null());
        let token = self.token_transfers.iter().find(|t| {
            t.from_user_account.as_deref() == Some(wallet) || t.to_user_account.as_deref() == Some(wallet)
        });

        let (amount, token_mint) = match token {
            Some(transfer) => (Some(transfer.token_amount), Some(transfer.mint.clone())),
            None => (self.native_amount(wallet), None),
        };

        TransactionRecord {
            signature: self.signature.clone(),
            wallet_address: Some(wallet.to_string()),
            block_time: self.timestamp.and_then(from_unix_timestamp),
            slot: self.slot,
            status: Some(if failed { TransactionStatus::Failed } else { TransactionStatus::Success }),
            kind: self.kind.as_deref().map(TransactionKind::from_label),
            amount,
            fee: self.fee.map(lamports_to_sol),
            token_mint,
            memo: self.description.clone().filter(|d| !d.is_empty()),
            ..TransactionRecord::default()
        }
    }

    fn native_amount(&self, wallet: &str) -> Option<Decimal> {
        let mut touched = false;
        let mut lamports: i128 = 0;
        for transfer in &self.native_transfers {
            if transfer.to_user_account.as_deref() == Some(wallet) {
                lamports += i128::from(transfer.amount);
                touched = true;
            }
            if transfer.from_user_account.as_deref() == Some(wallet) {
                lamports -= i128::from(transfer.amount);
                touched = true;
            }
        }
        touched.then(|| Decimal::from_i128_with_scale(lamports, 0) / Decimal::from(LAMPORTS_PER_SOL))
    }
}

/// One SPL token holding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenBalance {
    pub mint: String,
    /// Raw amount in base units
    pub amount: u64,
    pub decimals: u8,
    #[serde(default)]
    pub token_account: Option<String>,
}

impl TokenBalance {
    /// Amount scaled by decimals
    pub fn ui_amount(&self) -> Decimal {
        Decimal::from_i128_with_scale(i128::from(self.amount), u32::from(self.decimals.min(28)))
    }
}

/// Response of `/addresses/{address}/balances`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Balances {
    #[serde(default)]
    pub tokens: Vec<TokenBalance>,
    /// Lamports
    #[serde(default)]
    pub native_balance: u64,
}

fn lamports_to_sol(lamports: u64) -> Decimal {
    Decimal::from(lamports) / Decimal::from(LAMPORTS_PER_SOL)
}

/// Helius REST API client
#[derive(Debug, Clone)]
pub struct HeliusClient {
    http: ApiHttp,
    base_url: String,
    keys: Arc<HeliusKeyManager>,
}

impl HeliusClient {
    /// Create a client that draws keys from `keys`
    pub fn new(config: &HeliusConfig, keys: Arc<HeliusKeyManager>) -> AppResult<Self> {
        let http = ApiHttp::new(
            ServiceName::Helius.as_str(),
            config.request_timeout_ms,
            config.max_concurrent_requests,
        )?
        .with_retry_window(
            Duration::from_millis(500),
            Duration::from_secs(config.max_retry_elapsed_seconds),
        );

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            keys,
        })
    }

    /// Override the retry schedule
    pub fn with_retry_window(mut self, initial: Duration, max_elapsed: Duration) -> Self {
        self.http = self.http.with_retry_window(initial, max_elapsed);
        self
    }

    /// Key manager backing this client
    pub fn key_manager(&self) -> &Arc<HeliusKeyManager> {
        &self.keys
    }

    /// Recent parsed transactions for an address, newest first
    #[instrument(skip(self), fields(address = %address.short()))]
    pub async fn get_transactions(&self, address: &WalletAddress, limit: usize) -> AppResult<Vec<EnhancedTransaction>> {
        let url = format!("{}/addresses/{}/transactions", self.base_url, address);
        let limit = limit.clamp(1, MAX_TRANSACTION_PAGE).to_string();
        let (url, limit, keys, client) = (url.as_str(), limit.as_str(), &self.keys, self.http.client());

        self.http
            .execute("get_transactions", move || async move {
                let key = keys.get_api_key().await?;
                Ok(client.get(url).query(&[("api-key", key.as_str()), ("limit", limit)]))
            })
            .await
    }

    /// Native and token balances for an address
    #[instrument(skip(self), fields(address = %address.short()))]
    pub async fn get_balances(&self, address: &WalletAddress) -> AppResult<Balances> {
        let url = format!("{}/addresses/{}/balances", self.base_url, address);
        let (url, keys, client) = (url.as_str(), &self.keys, self.http.client());

        self.http
            .execute("get_balances", move || async move {
                let key = keys.get_api_key().await?;
                Ok(client.get(url).query(&[("api-key", key.as_str())]))
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::AppError;
    use crate::core::types::{ApiKeyRecord, KeyStatus};
    use crate::infrastructure::database::{InMemoryStore, Table};
    use crate::infrastructure::security::VaultCipher;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const WALLET: &str = "11111111111111111111111111111111";

    async fn client(server: &MockServer, keys: &[&str], fallback: &str) -> HeliusClient {
        let store = Arc::new(InMemoryStore::new());
        let table: Table<ApiKeyRecord> = Table::new(store.clone());
        for (i, key) in keys.iter().enumerate() {
            table
                .insert(&ApiKeyRecord {
                    id: None,
                    user_id: None,
                    service: "helius".to_string(),
                    key_name: format!("key-{}", i),
                    api_key: key.to_string(),
                    status: KeyStatus::Active,
                    created_at: None,
                })
                .await
                .unwrap();
        }

        let config = HeliusConfig {
            base_url: server.uri(),
            api_key: fallback.to_string(),
            ..HeliusConfig::default()
        };
        let manager = Arc::new(HeliusKeyManager::new(store, Arc::new(VaultCipher::disabled()), &config));
        manager.refresh().await.unwrap();

        HeliusClient::new(&config, manager)
            .unwrap()
            .with_retry_window(Duration::from_millis(5), Duration::from_millis(500))
    }

    fn wallet() -> WalletAddress {
        WalletAddress::new(WALLET).unwrap()
    }

    #[tokio::test]
    async fn test_get_transactions_parses_enhanced_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/addresses/{}/transactions", WALLET)))
            .and(query_param("api-key", "key-a"))
            .and(query_param("limit", "10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
                "signature": "sig-1",
                "timestamp": 1714564800,
                "slot": 260000000,
                "fee": 5000,
                "type": "TRANSFER",
                "description": "sent 1.5 SOL",
                "nativeTransfers": [
                    { "fromUserAccount": WALLET, "toUserAccount": "dest", "amount": 1500000000u64 }
                ],
                "tokenTransfers": []
            }])))
            .mount(&server)
            .await;

        let client = client(&server, &["key-a"], "").await;
        let txs = client.get_transactions(&wallet(), 10).await.unwrap();

        assert_eq!(txs.len(), 1);
        let record = txs[0].to_record(WALLET);
        assert_eq!(record.signature, "sig-1");
        assert_eq!(record.amount, Some(dec!(-1.5)));
        assert_eq!(record.fee, Some(dec!(0.000005)));
        assert_eq!(record.kind, Some(TransactionKind::Transfer));
        assert_eq!(record.status, Some(TransactionStatus::Success));
    }

    #[tokio::test]
    async fn test_keys_rotate_between_calls() {
        let server = MockServer::start().await;
        for key in ["key-a", "key-b"] {
            Mock::given(method("GET"))
                .and(path(format!("/addresses/{}/balances", WALLET)))
                .and(query_param("api-key", key))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "tokens": [],
                    "nativeBalance": 1
                })))
                .expect(1)
                .mount(&server)
                .await;
        }

        let client = client(&server, &["key-a", "key-b"], "").await;
        client.get_balances(&wallet()).await.unwrap();
        client.get_balances(&wallet()).await.unwrap();
    }

    #[tokio::test]
    async fn test_rate_limited_key_rotated_on_retry() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("api-key", "key-a"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("api-key", "key-b"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tokens": [{ "mint": "MintA", "amount": 2500000, "decimals": 6 }],
                "nativeBalance": 2000000000u64
            })))
            .mount(&server)
            .await;

        let client = client(&server, &["key-a", "key-b"], "").await;
        let balances = client.get_balances(&wallet()).await.unwrap();

        assert_eq!(balances.native_balance, 2_000_000_000);
        assert_eq!(balances.tokens[0].ui_amount(), dec!(2.5));
    }

    #[tokio::test]
    async fn test_no_key_is_config_error() {
        let server = MockServer::start().await;
        let client = client(&server, &[], "").await;

        assert_matches!(client.get_balances(&wallet()).await, Err(AppError::Config { .. }));
    }

    #[test]
    fn test_failed_token_transfer_record() {
        let tx: EnhancedTransaction = serde_json::from_value(json!({
            "signature": "sig-2",
            "timestamp": 1714564800,
            "type": "SWAP",
            "tokenTransfers": [
                { "fromUserAccount": "pool", "toUserAccount": WALLET, "mint": "MintA", "tokenAmount": 42.5 }
            ],
            "transactionError": { "InstructionError": [0, "Custom"] }
        }))
        .unwrap();

        let record = tx.to_record(WALLET);
        assert_eq!(record.status, Some(TransactionStatus::Failed));
        assert_eq!(record.token_mint.as_deref(), Some("MintA"));
        assert_eq!(record.amount, Some(dec!(42.5)));
    }
}
