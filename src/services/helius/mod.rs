//! Helius API integration
//!
//! Key rotation over `api_keys_storage` and the REST client that uses it.

pub mod client;
pub mod key_manager;

pub use client::{Balances, EnhancedTransaction, HeliusClient, TokenBalance};
pub use key_manager::HeliusKeyManager;
