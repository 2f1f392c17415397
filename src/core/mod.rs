//! Core domain layer: errors, results, row types and domain rules
//!
//! Everything here is free of I/O and shared by the infrastructure and
//! service layers.

pub mod error;
pub mod result;
pub mod types;

pub use error::{AppError, ErrorContext, ErrorSeverity};
pub use result::AppResult;
pub use types::*;

/// Domain constants and business rules
pub mod domain {
    use rust_decimal::Decimal;
    use std::time::Duration;

    /// Spend limit rules
    pub mod spending {
        use super::*;

        /// Length of the rolling window the daily limit applies to
        pub const WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

        /// Largest single transfer accepted, regardless of the user's limit
        pub const MAX_SINGLE_TRANSFER_SOL: Decimal = rust_decimal_macros::dec!(100000);
    }

    /// API key rotation rules
    pub mod keys {
        use super::*;

        /// How often the Helius key list is re-fetched
        pub const REFRESH_INTERVAL: Duration = Duration::from_secs(60);

        /// Attempts per refresh before the previous list is kept
        pub const REFRESH_ATTEMPTS: u32 = 3;
    }

    /// Bot configuration rules
    pub mod bots {
        /// Strategies the dashboard knows how to configure
        pub const STRATEGIES: &[&str] = &["dca", "grid", "sniper", "copy_trade", "arbitrage"];

        /// Maximum bot name length
        pub const MAX_NAME_LEN: usize = 64;

        /// Largest token amount a single recorded trade may carry
        pub const MAX_TRADE_AMOUNT: rust_decimal::Decimal = rust_decimal_macros::dec!(1000000000000);

        /// Largest per-token price a recorded trade may carry
        pub const MAX_TRADE_PRICE: rust_decimal::Decimal = rust_decimal_macros::dec!(1000000000);
    }
}

/// Domain validation rules and helpers
pub mod validation {
    use super::domain;
    use super::error::AppError;
    use super::result::{AppResult, ResultExt};
    use rust_decimal::Decimal;
    use std::str::FromStr;

    /// Validate a Solana address by decoding it as a public key
    pub fn validate_solana_address(address: &str) -> AppResult<()> {
        if address.len() < 32 || address.len() > 44 {
            return Err(AppError::invalid_field(
                "address",
                address,
                format!("Invalid Solana address length: {}", address.len()),
            ));
        }

        solana_sdk::pubkey::Pubkey::from_str(address)
            .map(|_| ())
            .map_validation_err("address")
    }

    /// Validate a transfer amount in SOL
    pub fn validate_amount(amount: Decimal) -> AppResult<()> {
        crate::ensure!(
            amount > Decimal::ZERO,
            AppError::invalid_field("amount", &amount.to_string(), "Amount must be greater than zero")
        );

        if amount > domain::spending::MAX_SINGLE_TRANSFER_SOL {
            return Err(AppError::invalid_field(
                "amount",
                &amount.to_string(),
                format!("Amount exceeds {} SOL", domain::spending::MAX_SINGLE_TRANSFER_SOL),
            ));
        }

        Ok(())
    }

    /// Validate a bot name and strategy pair
    pub fn validate_bot(name: &str, strategy: &str, params: &serde_json::Value) -> AppResult<()> {
        let trimmed = name.trim();
        if trimmed.is_empty() || trimmed.len() > domain::bots::MAX_NAME_LEN {
            return Err(AppError::invalid_field(
                "name",
                name,
                format!("Bot name must be 1-{} characters", domain::bots::MAX_NAME_LEN),
            ));
        }

        if !domain::bots::STRATEGIES.contains(&strategy) {
            return Err(AppError::invalid_field("strategy", strategy, "Unknown bot strategy"));
        }

        if !(params.is_object() || params.is_null()) {
            return Err(AppError::invalid_field("params", &params.to_string(), "Bot params must be an object"));
        }

        Ok(())
    }
}
