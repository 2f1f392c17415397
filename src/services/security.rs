//! Transfer security: rolling spend limit, approved destinations and
//! per-user security settings
//!
//! Spend windows are process local. Each user has a list of
//! `(amount, time)` entries; entries older than the window are dropped on
//! every check. A restart forgets all windows.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::config::models::SecurityConfig;
use crate::core::error::AppError;
use crate::core::result::AppResult;
use crate::core::types::{ApprovedAddress, SecuritySettings, TransactionSettings};
use crate::core::validation::{validate_amount, validate_solana_address};
use crate::infrastructure::database::{Query, Table, TableStore};
use crate::infrastructure::monitoring::metrics;
use crate::utils::time::now;

/// One accepted transfer inside the window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpendEntry {
    pub amount: Decimal,
    pub at: DateTime<Utc>,
}

/// Outcome of an accepted spend check
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpendApproval {
    pub limit: Decimal,
    /// Spent in the window before this transfer
    pub spent: Decimal,
    /// Left in the window after this transfer
    pub remaining: Decimal,
}

/// Partial update of `transaction_settings`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TransactionSettingsUpdate {
    pub daily_limit: Option<Decimal>,
    pub require_approved_addresses: Option<bool>,
}

/// Partial update of `security_settings`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecuritySettingsUpdate {
    pub two_factor_enabled: Option<bool>,
    pub session_timeout_minutes: Option<u32>,
    pub login_notifications: Option<bool>,
}

const MIN_SESSION_TIMEOUT: u32 = 5;
const MAX_SESSION_TIMEOUT: u32 = 24 * 60;

/// Spend limit enforcement plus security settings CRUD
#[derive(Debug)]
pub struct TransactionSecurityService {
    transaction_settings: Table<TransactionSettings>,
    security_settings: Table<SecuritySettings>,
    approved: Table<ApprovedAddress>,
    windows: DashMap<String, Vec<SpendEntry>>,
    default_limit: Decimal,
    window: ChronoDuration,
}

impl TransactionSecurityService {
    /// Create the service
    pub fn new(store: Arc<dyn TableStore>, config: &SecurityConfig) -> Self {
        Self {
            transaction_settings: Table::new(store.clone()),
            security_settings: Table::new(store.clone()),
            approved: Table::new(store),
            windows: DashMap::new(),
            default_limit: config.default_daily_limit_sol,
            window: ChronoDuration::hours(config.spend_window_hours.max(1) as i64),
        }
    }

    /// Check a transfer against the user's limits and record it when accepted
    #[instrument(skip(self))]
    pub async fn check_transaction(
        &self,
        user_id: &str,
        amount: Decimal,
        destination: Option<&str>,
    ) -> AppResult<SpendApproval> {
        self.check_transaction_at(user_id, amount, destination, now()).await
    }

    /// [`check_transaction`](Self::check_transaction) evaluated at `at`
    pub async fn check_transaction_at(
        &self,
        user_id: &str,
        amount: Decimal,
        destination: Option<&str>,
        at: DateTime<Utc>,
    ) -> AppResult<SpendApproval> {
        validate_amount(amount)?;
        let settings = self.get_transaction_settings(user_id).await?;

        if settings.require_approved_addresses {
            let Some(destination) = destination else {
                metrics::record_spend_check(false);
                return Err(AppError::denied(user_id, "A destination address is required"));
            };
            if !self.is_approved(user_id, destination).await? {
                metrics::record_spend_check(false);
                warn!("🚫 Destination {} is not approved for {}", destination, user_id);
                return Err(AppError::denied(user_id, format!("Destination {} is not an approved address", destination)));
            }
        }

        let cutoff = at - self.window;
        let mut entries = self.windows.entry(user_id.to_string()).or_default();
        entries.retain(|entry| entry.at > cutoff);
        let spent: Decimal = entries.iter().map(|entry| entry.amount).sum();

        if spent + amount > settings.daily_limit {
            drop(entries);
            metrics::record_spend_check(false);
            warn!("🚫 Spend limit hit for {}: {} + {} > {}", user_id, spent, amount, settings.daily_limit);
            return Err(AppError::SpendLimit {
                user_id: user_id.to_string(),
                limit: settings.daily_limit,
                spent,
                requested: amount,
            });
        }

        entries.push(SpendEntry { amount, at });
        drop(entries);
        metrics::record_spend_check(true);
        debug!("✅ Spend accepted for {}: {} SOL ({} already in window)", user_id, amount, spent);

        Ok(SpendApproval {
            limit: settings.daily_limit,
            spent,
            remaining: settings.daily_limit - spent - amount,
        })
    }

    /// Total accepted in the current window
    pub fn spent_in_window(&self, user_id: &str) -> Decimal {
        self.spent_in_window_at(user_id, now())
    }

    /// Total accepted in the window ending at `at`
    pub fn spent_in_window_at(&self, user_id: &str, at: DateTime<Utc>) -> Decimal {
        let cutoff = at - self.window;
        self.windows
            .get(user_id)
            .map(|entries| entries.iter().filter(|e| e.at > cutoff).map(|e| e.amount).sum())
            .unwrap_or(Decimal::ZERO)
    }

    /// Forget a user's window
    pub fn reset_user(&self, user_id: &str) {
        if self.windows.remove(user_id).is_some() {
            info!("🔄 Spend window reset for {}", user_id);
        }
    }

    /// Stored settings, or defaults when the user has none
    pub async fn get_transaction_settings(&self, user_id: &str) -> AppResult<TransactionSettings> {
        let stored = self
            .transaction_settings
            .first(Query::new().eq("user_id", user_id))
            .await?;

        Ok(stored.unwrap_or_else(|| TransactionSettings {
            id: None,
            user_id: user_id.to_string(),
            daily_limit: self.default_limit,
            require_approved_addresses: false,
            updated_at: None,
        }))
    }

    /// Apply a partial settings update
    #[instrument(skip(self))]
    pub async fn update_transaction_settings(
        &self,
        user_id: &str,
        update: TransactionSettingsUpdate,
    ) -> AppResult<TransactionSettings> {
        let mut settings = self.get_transaction_settings(user_id).await?;

        if let Some(limit) = update.daily_limit {
            if limit <= Decimal::ZERO {
                return Err(AppError::invalid_field("daily_limit", &limit.to_string(), "Daily limit must be positive"));
            }
            settings.daily_limit = limit;
        }
        if let Some(require) = update.require_approved_addresses {
            settings.require_approved_addresses = require;
        }
        settings.updated_at = Some(now());

        let stored = self.transaction_settings.upsert(&[settings], &["user_id"]).await?;
        info!("💾 Transaction settings saved for {}", user_id);
        first_row(stored, "transaction_settings")
    }

    /// Stored security settings, or defaults
    pub async fn get_security_settings(&self, user_id: &str) -> AppResult<SecuritySettings> {
        let stored = self
            .security_settings
            .first(Query::new().eq("user_id", user_id))
            .await?;
        Ok(stored.unwrap_or_else(|| SecuritySettings::defaults_for(user_id)))
    }

    /// Apply a partial security settings update
    #[instrument(skip(self))]
    pub async fn update_security_settings(
        &self,
        user_id: &str,
        update: SecuritySettingsUpdate,
    ) -> AppResult<SecuritySettings> {
        let mut settings = self.get_security_settings(user_id).await?;

        if let Some(enabled) = update.two_factor_enabled {
            settings.two_factor_enabled = enabled;
        }
        if let Some(minutes) = update.session_timeout_minutes {
            if !(MIN_SESSION_TIMEOUT..=MAX_SESSION_TIMEOUT).contains(&minutes) {
                return Err(AppError::invalid_field(
                    "session_timeout_minutes",
                    &minutes.to_string(),
                    format!("Session timeout must be {}-{} minutes", MIN_SESSION_TIMEOUT, MAX_SESSION_TIMEOUT),
                ));
            }
            settings.session_timeout_minutes = minutes;
        }
        if let Some(notify) = update.login_notifications {
            settings.login_notifications = notify;
        }
        settings.updated_at = Some(now());

        let stored = self.security_settings.upsert(&[settings], &["user_id"]).await?;
        first_row(stored, "security_settings")
    }

    /// Approved destinations, newest first
    pub async fn list_approved_addresses(&self, user_id: &str) -> AppResult<Vec<ApprovedAddress>> {
        self.approved
            .select(&Query::new().eq("user_id", user_id).order("created_at", true))
            .await
    }

    /// Approve a destination
    #[instrument(skip(self))]
    pub async fn add_approved_address(
        &self,
        user_id: &str,
        address: &str,
        label: Option<String>,
    ) -> AppResult<ApprovedAddress> {
        validate_solana_address(address)?;
        if self.is_approved(user_id, address).await? {
            return Err(AppError::invalid_field("address", address, "Address is already approved"));
        }

        let stored = self
            .approved
            .insert(&ApprovedAddress {
                id: None,
                user_id: user_id.to_string(),
                address: address.to_string(),
                label: label.filter(|l| !l.trim().is_empty()),
                created_at: None,
            })
            .await?;
        info!("✅ Approved {} for {}", address, user_id);
        Ok(stored)
    }

    /// Remove an approved destination; false when it was not approved
    pub async fn remove_approved_address(&self, user_id: &str, address: &str) -> AppResult<bool> {
        let removed = self
            .approved
            .delete(&Query::new().eq("user_id", user_id).eq("address", address))
            .await?;
        Ok(removed > 0)
    }

    async fn is_approved(&self, user_id: &str, address: &str) -> AppResult<bool> {
        let found = self
            .approved
            .first(Query::new().eq("user_id", user_id).eq("address", address))
            .await?;
        Ok(found.is_some())
    }
}

fn first_row<T>(rows: Vec<T>, table: &str) -> AppResult<T> {
    rows.into_iter()
        .next()
        .ok_or_else(|| AppError::table(table, "upsert", "upsert returned no rows"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::InMemoryStore;
    use assert_matches::assert_matches;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;

    const DEST: &str = "So11111111111111111111111111111111111111112";

    fn service() -> TransactionSecurityService {
        let config = SecurityConfig {
            default_daily_limit_sol: dec!(10),
            spend_window_hours: 24,
            ..SecurityConfig::default()
        };
        TransactionSecurityService::new(Arc::new(InMemoryStore::new()), &config)
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_limit_rejects_over_cap() {
        let service = service();

        service.check_transaction_at("u1", dec!(6), None, t0()).await.unwrap();
        let approval = service
            .check_transaction_at("u1", dec!(4), None, t0() + ChronoDuration::hours(1))
            .await
            .unwrap();
        assert_eq!(approval.remaining, dec!(0));

        let rejected = service
            .check_transaction_at("u1", dec!(0.1), None, t0() + ChronoDuration::hours(2))
            .await;
        assert_matches!(
            rejected,
            Err(AppError::SpendLimit { limit, spent, requested, .. })
                if limit == dec!(10) && spent == dec!(10) && requested == dec!(0.1)
        );
        assert_eq!(service.spent_in_window_at("u1", t0() + ChronoDuration::hours(2)), dec!(10));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checks_cannot_both_fit() {
        for _ in 0..20 {
            let service = Arc::new(service());
            let first = tokio::spawn({
                let service = service.clone();
                async move { service.check_transaction_at("u1", dec!(6), None, t0()).await }
            });
            let second = tokio::spawn({
                let service = service.clone();
                async move { service.check_transaction_at("u1", dec!(6), None, t0()).await }
            });
            let (first, second) = tokio::join!(first, second);
            let results = [first.unwrap(), second.unwrap()];

            assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
            assert!(results.iter().any(|r| matches!(r, Err(AppError::SpendLimit { .. }))));
            assert_eq!(service.spent_in_window_at("u1", t0()), dec!(6));
        }
    }

    #[tokio::test]
    async fn test_window_expiry_frees_limit() {
        let service = service();
        service.check_transaction_at("u1", dec!(9), None, t0()).await.unwrap();

        assert!(service
            .check_transaction_at("u1", dec!(5), None, t0() + ChronoDuration::hours(23))
            .await
            .is_err());
        assert!(service
            .check_transaction_at("u1", dec!(5), None, t0() + ChronoDuration::hours(24) + ChronoDuration::seconds(1))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_users_are_independent() {
        let service = service();
        service.check_transaction_at("u1", dec!(10), None, t0()).await.unwrap();

        assert!(service.check_transaction_at("u2", dec!(10), None, t0()).await.is_ok());
        service.reset_user("u1");
        assert!(service.check_transaction_at("u1", dec!(10), None, t0()).await.is_ok());
    }

    #[tokio::test]
    async fn test_stored_limit_overrides_default() {
        let service = service();
        service
            .update_transaction_settings(
                "u1",
                TransactionSettingsUpdate { daily_limit: Some(dec!(2)), ..Default::default() },
            )
            .await
            .unwrap();

        assert!(service.check_transaction_at("u1", dec!(3), None, t0()).await.is_err());
        assert_eq!(service.spent_in_window_at("u1", t0()), dec!(0));
    }

    #[tokio::test]
    async fn test_invalid_amount_rejected() {
        let service = service();
        assert_matches!(
            service.check_transaction_at("u1", dec!(0), None, t0()).await,
            Err(AppError::Validation { .. })
        );
    }

    #[tokio::test]
    async fn test_approved_addresses_enforced() {
        let service = service();
        service
            .update_transaction_settings(
                "u1",
                TransactionSettingsUpdate { require_approved_addresses: Some(true), ..Default::default() },
            )
            .await
            .unwrap();

        assert_matches!(
            service.check_transaction_at("u1", dec!(1), Some(DEST), t0()).await,
            Err(AppError::Security { .. })
        );
        assert_matches!(
            service.check_transaction_at("u1", dec!(1), None, t0()).await,
            Err(AppError::Security { .. })
        );

        service.add_approved_address("u1", DEST, Some("wrapped SOL".into())).await.unwrap();
        assert!(service.check_transaction_at("u1", dec!(1), Some(DEST), t0()).await.is_ok());
    }

    #[tokio::test]
    async fn test_approved_address_crud() {
        let service = service();

        assert_matches!(
            service.add_approved_address("u1", "bogus", None).await,
            Err(AppError::Validation { .. })
        );

        service.add_approved_address("u1", DEST, None).await.unwrap();
        assert_matches!(
            service.add_approved_address("u1", DEST, None).await,
            Err(AppError::Validation { .. })
        );
        assert_eq!(service.list_approved_addresses("u1").await.unwrap().len(), 1);

        assert!(service.remove_approved_address("u1", DEST).await.unwrap());
        assert!(!service.remove_approved_address("u1", DEST).await.unwrap());
    }

    #[tokio::test]
    async fn test_security_settings_update() {
        let service = service();
        let defaults = service.get_security_settings("u1").await.unwrap();
        assert_eq!(defaults.session_timeout_minutes, 60);

        let updated = service
            .update_security_settings(
                "u1",
                SecuritySettingsUpdate {
                    two_factor_enabled: Some(true),
                    session_timeout_minutes: Some(30),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(updated.two_factor_enabled);
        assert!(updated.login_notifications);

        assert_matches!(
            service
                .update_security_settings(
                    "u1",
                    SecuritySettingsUpdate { session_timeout_minutes: Some(1), ..Default::default() },
                )
                .await,
            Err(AppError::Validation { .. })
        );
        assert_eq!(service.get_security_settings("u1").await.unwrap().session_timeout_minutes, 30);
    }
}
