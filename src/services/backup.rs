//! Site backups
//!
//! A backup is a JSON snapshot of a user's dashboard configuration kept in
//! the local store under `site_backup:<user>`. Only the newest snapshot per
//! user is kept. API keys are not part of a snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::core::error::AppError;
use crate::core::result::AppResult;
use crate::core::types::{
    ApprovedAddress, Bot, Profile, SecuritySettings, TableRow, TransactionSettings, WalletRecord,
};
use crate::infrastructure::database::{Query, Table, TableStore};
use crate::infrastructure::storage::{LocalStore, SITE_BACKUP_PREFIX};
use crate::utils::time::now;

/// Snapshot format version
pub const SNAPSHOT_VERSION: u32 = 1;

/// A user's dashboard configuration at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteSnapshot {
    pub version: u32,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub profile: Option<Profile>,
    #[serde(default)]
    pub bots: Vec<Bot>,
    #[serde(default)]
    pub wallets: Vec<WalletRecord>,
    #[serde(default)]
    pub approved_addresses: Vec<ApprovedAddress>,
    #[serde(default)]
    pub transaction_settings: Option<TransactionSettings>,
    #[serde(default)]
    pub security_settings: Option<SecuritySettings>,
}

/// Row counts written back by a restore
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RestoreSummary {
    pub bots: usize,
    pub wallets: usize,
    pub approved_addresses: usize,
    pub settings: usize,
    pub profile: bool,
}

/// Creates and restores site snapshots
#[derive(Debug, Clone)]
pub struct BackupService {
    store: Arc<dyn TableStore>,
    local: Arc<LocalStore>,
}

impl BackupService {
    pub fn new(store: Arc<dyn TableStore>, local: Arc<LocalStore>) -> Self {
        Self { store, local }
    }

    fn table<T: TableRow>(&self) -> Table<T> {
        Table::new(self.store.clone())
    }

    /// Snapshot the user's rows, replacing any previous snapshot
    #[instrument(skip(self))]
    pub async fn create_snapshot(&self, user_id: &str) -> AppResult<SiteSnapshot> {
        let by_user = Query::new().eq("user_id", user_id);

        let snapshot = SiteSnapshot {
            version: SNAPSHOT_VERSION,
            user_id: user_id.to_string(),
            created_at: now(),
            profile: self.table::<Profile>().first(Query::new().eq("id", user_id)).await?,
            bots: self.table::<Bot>().select(&by_user.clone().order("created_at", false)).await?,
            wallets: self.table::<WalletRecord>().select(&by_user).await?,
            approved_addresses: self.table::<ApprovedAddress>().select(&by_user).await?,
            transaction_settings: self.table::<TransactionSettings>().first(by_user.clone()).await?,
            security_settings: self.table::<SecuritySettings>().first(by_user).await?,
        };

        self.local.set(&backup_key(user_id), &snapshot).await?;
        info!(
            "💾 Backed up {} bot(s), {} wallet(s), {} approved address(es) for {}",
            snapshot.bots.len(),
            snapshot.wallets.len(),
            snapshot.approved_addresses.len(),
            user_id
        );
        Ok(snapshot)
    }

    /// The stored snapshot for `user_id`
    pub fn latest_snapshot(&self, user_id: &str) -> AppResult<Option<SiteSnapshot>> {
        self.local.get(&backup_key(user_id))
    }

    /// Users that have a stored snapshot
    pub fn backed_up_users(&self) -> Vec<String> {
        self.local
            .keys_with_prefix(SITE_BACKUP_PREFIX)
            .into_iter()
            .filter_map(|key| key.strip_prefix(SITE_BACKUP_PREFIX).map(str::to_string))
            .collect()
    }

    /// Write the stored snapshot back to the tables
    ///
    /// Rows are upserted, so data created after the snapshot is kept.
    #[instrument(skip(self))]
    pub async fn restore_snapshot(&self, user_id: &str) -> AppResult<RestoreSummary> {
        let snapshot = self
            .latest_snapshot(user_id)?
            .ok_or_else(|| AppError::not_found("site_backup", user_id))?;

        if snapshot.version > SNAPSHOT_VERSION {
            return Err(AppError::validation(format!(
                "Backup version {} is newer than supported version {}",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }

        let owned = |row_user: &str| row_user == user_id;
        let bots: Vec<Bot> = snapshot.bots.into_iter().filter(|b| owned(&b.user_id)).collect();
        let wallets: Vec<WalletRecord> = snapshot.wallets.into_iter().filter(|w| owned(&w.user_id)).collect();
        let approved: Vec<ApprovedAddress> = snapshot
            .approved_addresses
            .into_iter()
            .filter(|a| owned(&a.user_id))
            .collect();

        let mut summary = RestoreSummary::default();

        if !bots.is_empty() {
            summary.bots = self.table::<Bot>().upsert(&bots, &["id"]).await?.len();
        }
        if !wallets.is_empty() {
            summary.wallets = self
                .table::<WalletRecord>()
                .upsert(&wallets, &["user_id", "address"])
                .await?
                .len();
        }
        if !approved.is_empty() {
            summary.approved_addresses = self
                .table::<ApprovedAddress>()
                .upsert(&approved, &["user_id", "address"])
                .await?
                .len();
        }
        if let Some(settings) = snapshot.transaction_settings.filter(|s| owned(&s.user_id)) {
            self.table::<TransactionSettings>().upsert(&[settings], &["user_id"]).await?;
            summary.settings += 1;
        }
        if let Some(settings) = snapshot.security_settings.filter(|s| owned(&s.user_id)) {
            self.table::<SecuritySettings>().upsert(&[settings], &["user_id"]).await?;
            summary.settings += 1;
        }
        if let Some(profile) = snapshot.profile.filter(|p| owned(&p.id)) {
            self.table::<Profile>().upsert(&[profile], &["id"]).await?;
            summary.profile = true;
        }

        info!("🔄 Restored backup from {} for {}", snapshot.created_at, user_id);
        Ok(summary)
    }
}

fn backup_key(user_id: &str) -> String {
    format!("{}{}", SITE_BACKUP_PREFIX, user_id)
}
