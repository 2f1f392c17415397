//! Solana RPC access
//!
//! `ChainRpc` is the seam the services depend on; `SolanaRpc` implements it
//! over the nonblocking `solana-client` with exponential backoff.

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use rust_decimal::Decimal;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_client::GetConfirmedSignaturesForAddress2Config;
use solana_client::rpc_response::RpcConfirmedTransactionStatusWithSignature;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_transaction_status::TransactionConfirmationStatus;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, instrument, warn};

use super::types::{SignatureInfo, SolBalance};
use crate::config::models::SolanaConfig;
use crate::core::error::AppError;
use crate::core::result::AppResult;
use crate::core::types::{TransactionRecord, TransactionStatus, WalletAddress};
use crate::infrastructure::monitoring::metrics;

/// Upper bound the RPC node accepts for `getSignaturesForAddress`
pub const MAX_SIGNATURE_LIMIT: usize = 1000;

/// Chain reads used by the dashboard
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainRpc: Send + Sync {
    /// Native SOL balance of an address
    async fn get_sol_balance(&self, address: &WalletAddress) -> AppResult<Decimal>;

    /// Most recent signatures for an address, newest first
    async fn get_signatures(&self, address: &WalletAddress, limit: usize) -> AppResult<Vec<TransactionRecord>>;

    /// Node health probe
    async fn health(&self) -> AppResult<()>;
}

/// `ChainRpc` over a Solana JSON-RPC endpoint
pub struct SolanaRpc {
    client: Arc<RpcClient>,
    commitment: CommitmentConfig,
    max_elapsed: Duration,
}

impl std::fmt::Debug for SolanaRpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolanaRpc")
            .field("url", &self.client.url())
            .field("commitment", &self.commitment.commitment)
            .finish()
    }
}

impl SolanaRpc {
    /// Create a client; no request is made until first use
    pub fn new(config: &SolanaConfig) -> AppResult<Self> {
        let Ok(commitment) = CommitmentConfig::from_str(&config.commitment) else {
            crate::bail_config!("Unknown Solana commitment level '{}'", config.commitment);
        };

        info!("🔗 Creating Solana RPC client for {}", config.rpc_url);
        let client = RpcClient::new_with_timeout_and_commitment(
            config.rpc_url.clone(),
            Duration::from_millis(config.request_timeout_ms),
            commitment,
        );

        Ok(Self {
            client: Arc::new(client),
            commitment,
            max_elapsed: Duration::from_secs(15),
        })
    }

    /// Override how long a call keeps retrying
    pub fn with_max_elapsed(mut self, max_elapsed: Duration) -> Self {
        self.max_elapsed = max_elapsed;
        self
    }

    async fn execute_with_retry<T, F, Fut>(&self, operation: &str, f: F) -> AppResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, solana_client::client_error::ClientError>>,
    {
        let mut backoff = ExponentialBackoff {
            max_elapsed_time: Some(self.max_elapsed),
            ..ExponentialBackoff::default()
        };
        let started = Instant::now();

        loop {
            match f().await {
                Ok(result) => {
                    debug!("✅ RPC {} succeeded in {:?}", operation, started.elapsed());
                    metrics::record_request("solana_rpc", true, started.elapsed());
                    return Ok(result);
                }
                Err(e) => {
                    warn!("⚠️  RPC {} failed: {}", operation, e);
                    match backoff.next_backoff() {
                        Some(delay) => {
                            debug!("🔄 Retrying {} after {:?}", operation, delay);
                            tokio::time::sleep(delay).await;
                        }
                        None => {
                            error!("❌ RPC {} failed after all retries", operation);
                            metrics::record_request("solana_rpc", false, started.elapsed());
                            return Err(AppError::from(e).with_endpoint(self.client.url()));
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl ChainRpc for SolanaRpc {
    #[instrument(skip(self), fields(address = %address.short()))]
    async fn get_sol_balance(&self, address: &WalletAddress) -> AppResult<Decimal> {
        let pubkey = address.to_pubkey()?;
        let lamports = self
            .execute_with_retry("get_balance", || self.client.get_balance(&pubkey))
            .await?;

        Ok(SolBalance { lamports }.sol())
    }

    #[instrument(skip(self), fields(address = %address.short()))]
    async fn get_signatures(&self, address: &WalletAddress, limit: usize) -> AppResult<Vec<TransactionRecord>> {
        let pubkey = address.to_pubkey()?;
        let limit = limit.clamp(1, MAX_SIGNATURE_LIMIT);

        let statuses = self
            .execute_with_retry("get_signatures_for_address", || {
                self.client.get_signatures_for_address_with_config(
                    &pubkey,
                    GetConfirmedSignaturesForAddress2Config {
                        before: None,
                        until: None,
                        limit: Some(limit),
                        commitment: Some(self.commitment),
                    },
                )
            })
            .await?;

        debug!("📄 {} signatures for {}", statuses.len(), address.short());
        Ok(statuses
            .into_iter()
            .map(|status| signature_info(status).into_record(address.as_str()))
            .collect())
    }

    async fn health(&self) -> AppResult<()> {
        self.client
            .get_health()
            .await
            .map_err(|e| AppError::from(e).with_endpoint(self.client.url()))
    }
}

fn signature_info(status: RpcConfirmedTransactionStatusWithSignature) -> SignatureInfo {
    let tx_status = match (&status.err, &status.confirmation_status) {
        (Some(_), _) => TransactionStatus::Failed,
        (None, Some(TransactionConfirmationStatus::Processed)) => TransactionStatus::Pending,
        (None, _) => TransactionStatus::Success,
    };

    SignatureInfo {
        signature: status.signature,
        slot: status.slot,
        block_time: status.block_time,
        error: status.err.map(|e| e.to_string()),
        memo: status.memo,
        status: tx_status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use solana_sdk::transaction::TransactionError;

    fn status(err: Option<TransactionError>, confirmation: Option<TransactionConfirmationStatus>) -> RpcConfirmedTransactionStatusWithSignature {
        RpcConfirmedTransactionStatusWithSignature {
            signature: "5h6x".to_string(),
            slot: 250_000_000,
            err,
            memo: None,
            block_time: Some(1_714_564_800),
            confirmation_status: confirmation,
        }
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            signature_info(status(None, Some(TransactionConfirmationStatus::Finalized))).status,
            TransactionStatus::Success
        );
        assert_eq!(
            signature_info(status(None, Some(TransactionConfirmationStatus::Processed))).status,
            TransactionStatus::Pending
        );

        let failed = signature_info(status(
            Some(TransactionError::AccountNotFound),
            Some(TransactionConfirmationStatus::Confirmed),
        ));
        assert_eq!(failed.status, TransactionStatus::Failed);
        assert!(failed.error.is_some());
    }

    #[test]
    fn test_invalid_commitment_rejected() {
        let config = SolanaConfig {
            commitment: "eventually".to_string(),
            ..SolanaConfig::default()
        };
        assert_matches!(SolanaRpc::new(&config), Err(AppError::Config { .. }));
    }

    #[tokio::test]
    async fn test_unreachable_node_is_network_error() {
        let config = SolanaConfig {
            rpc_url: "http://127.0.0.1:9".to_string(),
            request_timeout_ms: 200,
            ..SolanaConfig::default()
        };
        let rpc = SolanaRpc::new(&config).unwrap().with_max_elapsed(Duration::from_millis(1));

        assert!(rpc.health().await.is_err());
    }
}
