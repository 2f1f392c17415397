//! Wallet transaction history
//!
//! History shown for a wallet is the union of rows cached in the
//! `transactions` table and what the chain reports right now. Live data wins
//! field by field; cached data fills what the live source does not know
//! (amounts, fees, kinds from earlier enrichment).

use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::core::result::AppResult;
use crate::core::types::{TransactionRecord, WalletAddress};
use crate::infrastructure::database::{Query, Table, TableStore};
use crate::infrastructure::monitoring::{metrics, ErrorCollector};
use crate::services::helius::HeliusClient;
use crate::services::solana::ChainRpc;
use crate::utils::time::utc_day;

const COMPONENT: &str = "transactions";

/// Overlay `live` on `cached`: every field comes from `live` unless it is absent there
fn overlay(live: TransactionRecord, cached: TransactionRecord) -> TransactionRecord {
    TransactionRecord {
        signature: live.signature,
        user_id: live.user_id.or(cached.user_id),
        wallet_address: live.wallet_address.or(cached.wallet_address),
        block_time: live.block_time.or(cached.block_time),
        slot: live.slot.or(cached.slot),
        status: live.status.or(cached.status),
        kind: live.kind.or(cached.kind),
        amount: live.amount.or(cached.amount),
        fee: live.fee.or(cached.fee),
        token_mint: live.token_mint.or(cached.token_mint),
        memo: live.memo.or(cached.memo),
        error: live.error.or(cached.error),
    }
}

/// Merge cached and live records by signature
///
/// The result has one record per signature, sorted by block time descending
/// with undated records last and ties ordered by signature.
pub fn merge_transactions(cached: Vec<TransactionRecord>, live: Vec<TransactionRecord>) -> Vec<TransactionRecord> {
    let mut by_signature: HashMap<String, TransactionRecord> = HashMap::with_capacity(cached.len() + live.len());

    for record in cached {
        by_signature.insert(record.signature.clone(), record);
    }
    for record in live {
        let merged = match by_signature.remove(&record.signature) {
            Some(existing) => overlay(record, existing),
            None => record,
        };
        by_signature.insert(merged.signature.clone(), merged);
    }

    let mut merged: Vec<TransactionRecord> = by_signature.into_values().collect();
    merged.sort_by(|a, b| match (a.block_time, b.block_time) {
        (Some(x), Some(y)) => y.cmp(&x).then_with(|| a.signature.cmp(&b.signature)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.signature.cmp(&b.signature),
    });
    merged
}

/// Sum of amounts per UTC day, for records with both a time and an amount
pub fn daily_totals(records: &[TransactionRecord]) -> BTreeMap<chrono::NaiveDate, Decimal> {
    let mut totals = BTreeMap::new();
    for record in records {
        if let (Some(at), Some(amount)) = (record.block_time, record.amount) {
            *totals.entry(utc_day(&at)).or_insert(Decimal::ZERO) += amount;
        }
    }
    totals
}

/// Loads, merges and caches wallet transactions
#[derive(Clone)]
pub struct TransactionService {
    rpc: Arc<dyn ChainRpc>,
    helius: Option<Arc<HeliusClient>>,
    cache: Table<TransactionRecord>,
    errors: Arc<ErrorCollector>,
}

impl std::fmt::Debug for TransactionService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionService")
            .field("cache", &self.cache)
            .field("helius", &self.helius.is_some())
            .finish()
    }
}

impl TransactionService {
    /// Create the service
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        helius: Option<Arc<HeliusClient>>,
        store: Arc<dyn TableStore>,
        errors: Arc<ErrorCollector>,
    ) -> Self {
        Self {
            rpc,
            helius,
            cache: Table::new(store),
            errors,
        }
    }

    /// Most recent `limit` transactions for a wallet
    ///
    /// When the chain cannot be reached the cached rows are returned alone and
    /// the failure is reported. Only when both sources fail is an error
    /// returned.
    #[instrument(skip(self), fields(wallet = %wallet.short()))]
    pub async fn load_wallet_transactions(&self, wallet: &WalletAddress, limit: usize) -> AppResult<Vec<TransactionRecord>> {
        let query = Query::new()
            .eq("wallet_address", wallet.as_str())
            .order("block_time", true)
            .limit(limit);

        let (cached, live) = futures::join!(self.cache.select(&query), self.fetch_live(wallet, limit));

        let (cached, cache_ok) = match cached {
            Ok(rows) => (rows, true),
            Err(e) => {
                self.errors.report(&e, COMPONENT).await;
                (Vec::new(), false)
            }
        };

        let live = match live {
            Ok(live) => live,
            Err(e) if cache_ok => {
                self.errors.report(&e, COMPONENT).await;
                warn!("⚠️  Showing {} cached transaction(s) for {}", cached.len(), wallet.short());
                let mut cached = cached;
                cached.truncate(limit);
                return Ok(cached);
            }
            Err(e) => return Err(self.errors.capture(e, COMPONENT).await),
        };

        let previous: HashMap<String, TransactionRecord> =
            cached.iter().map(|r| (r.signature.clone(), r.clone())).collect();
        let mut merged = merge_transactions(cached, live);

        let changed: Vec<TransactionRecord> = merged
            .iter()
            .filter(|record| previous.get(&record.signature) != Some(*record))
            .cloned()
            .collect();
        if cache_ok && !changed.is_empty() {
            match self.cache.upsert(&changed, &["signature"]).await {
                Ok(_) => debug!("💾 Cached {} new or changed transaction(s)", changed.len()),
                Err(e) => {
                    self.errors.report(&e, COMPONENT).await;
                }
            }
        }

        merged.truncate(limit);
        metrics::record_merge(merged.len());
        info!("📄 {} transaction(s) for {}", merged.len(), wallet.short());
        Ok(merged)
    }

    /// Signatures from RPC, enriched with Helius data when available
    async fn fetch_live(&self, wallet: &WalletAddress, limit: usize) -> AppResult<Vec<TransactionRecord>> {
        let signatures = self.rpc.get_signatures(wallet, limit).await?;

        let Some(helius) = &self.helius else {
            return Ok(signatures);
        };

        match helius.get_transactions(wallet, limit).await {
            Ok(enhanced) => {
                let enriched = enhanced.iter().map(|tx| tx.to_record(wallet.as_str())).collect();
                Ok(merge_transactions(enriched, signatures))
            }
            Err(e) => {
                self.errors.report(&e, "helius").await;
                Ok(signatures)
            }
        }
    }
}
