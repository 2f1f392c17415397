//! Solana blockchain access
//!
//! RPC reads for balances and signature history.

pub mod rpc;
pub mod types;

pub use rpc::{ChainRpc, SolanaRpc};
pub use types::{SignatureInfo, SolBalance};

#[cfg(test)]
pub use rpc::MockChainRpc;
