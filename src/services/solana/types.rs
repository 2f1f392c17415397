//! Chain-level types returned by the RPC layer

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use solana_sdk::native_token::LAMPORTS_PER_SOL;

use crate::core::types::{TransactionRecord, TransactionStatus};
use crate::utils::time::from_unix_timestamp;

/// A signature seen for an address, as reported by `getSignaturesForAddress`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignatureInfo {
    pub signature: String,
    pub slot: u64,
    pub block_time: Option<i64>,
    pub error: Option<String>,
    pub memo: Option<String>,
    pub status: TransactionStatus,
}

impl SignatureInfo {
    /// Live transaction record for `wallet`
    ///
    /// Amount, fee and kind are not part of the signature listing, so they
    /// stay empty and the merge falls back to cached values for them.
    pub fn into_record(self, wallet: &str) -> TransactionRecord {
        TransactionRecord {
            signature: self.signature,
            wallet_address: Some(wallet.to_string()),
            block_time: self.block_time.and_then(from_unix_timestamp),
            slot: Some(self.slot),
            status: Some(self.status),
            memo: self.memo,
            error: self.error,
            ..TransactionRecord::default()
        }
    }
}

/// Native SOL balance of an account
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolBalance {
    pub lamports: u64,
}

impl SolBalance {
    /// Balance in SOL
    pub fn sol(&self) -> Decimal {
        Decimal::from(self.lamports) / Decimal::from(LAMPORTS_PER_SOL)
    }
}
