//! Helius API key rotation
//!
//! Active Helius keys live in `api_keys_storage`. The manager keeps the
//! current list in memory, hands keys out round robin and re-reads the list
//! on a fixed interval. Nothing is persisted: after a restart the list is
//! fetched again.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::models::HeliusConfig;
use crate::core::error::AppError;
use crate::core::result::{utils::retry_with_backoff, AppResult};
use crate::core::types::{ApiKeyRecord, KeyStatus, ServiceName};
use crate::infrastructure::database::{Query, Table, TableStore};
use crate::infrastructure::monitoring::metrics;
use crate::infrastructure::security::VaultCipher;

#[derive(Debug, Default)]
struct KeyRing {
    keys: Vec<String>,
    index: usize,
}

/// Round-robin selector over the active Helius keys
#[derive(Debug)]
pub struct HeliusKeyManager {
    api_keys: Table<ApiKeyRecord>,
    cipher: Arc<VaultCipher>,
    ring: RwLock<KeyRing>,
    fallback_key: Option<String>,
    refresh_interval: Duration,
    refresh_attempts: u32,
    retry_delay: Duration,
}

impl HeliusKeyManager {
    /// Create an empty manager; call [`refresh`](Self::refresh) to load keys
    pub fn new(store: Arc<dyn TableStore>, cipher: Arc<VaultCipher>, config: &HeliusConfig) -> Self {
        let fallback_key = Some(config.api_key.trim().to_string()).filter(|k| !k.is_empty());

        Self {
            api_keys: Table::new(store),
            cipher,
            ring: RwLock::new(KeyRing::default()),
            fallback_key,
            refresh_interval: Duration::from_secs(config.key_refresh_interval_seconds.max(1)),
            refresh_attempts: config.refresh_attempts.max(1),
            retry_delay: Duration::from_millis(500),
        }
    }

    /// Shorten the pause between refresh attempts
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Re-read the active keys
    ///
    /// On failure after every attempt the previous list stays in place and the
    /// error is returned.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> AppResult<usize> {
        let result = retry_with_backoff(
            || self.fetch_active_keys(),
            self.refresh_attempts,
            self.retry_delay,
            "helius_key_refresh",
            true,
        )
        .await;

        match result {
            Ok(keys) => {
                let count = keys.len();
                let mut ring = self.ring.write().await;
                if count > 0 {
                    ring.index %= count;
                } else {
                    ring.index = 0;
                }
                ring.keys = keys;
                drop(ring);

                metrics::set_keys_loaded(count);
                info!("🔑 Loaded {} active Helius key(s)", count);
                Ok(count)
            }
            Err(e) => {
                error!("❌ Helius key refresh failed, keeping previous list: {}", e);
                Err(e)
            }
        }
    }

    async fn fetch_active_keys(&self) -> AppResult<Vec<String>> {
        let query = Query::new()
            .eq("service", ServiceName::Helius.as_str())
            .eq("status", KeyStatus::Active.as_str())
            .order("created_at", false);

        let records = self.api_keys.select(&query).await?;
        let mut keys = Vec::with_capacity(records.len());
        for record in records {
            match self.cipher.open(&record.api_key) {
                Ok(key) if !key.trim().is_empty() => keys.push(key.trim().to_string()),
                Ok(_) => debug!("Skipping empty Helius key {}", record.key_name),
                Err(e) => warn!("⚠️  Skipping unreadable Helius key {}: {}", record.key_name, e),
            }
        }
        Ok(keys)
    }

    /// Next key in rotation, or the configured key when none are loaded
    pub async fn get_api_key(&self) -> AppResult<String> {
        let mut ring = self.ring.write().await;
        if ring.keys.is_empty() {
            return self
                .fallback_key
                .clone()
                .ok_or_else(|| AppError::config("No active Helius API key available"));
        }

        let key = ring.keys[ring.index].clone();
        ring.index = (ring.index + 1) % ring.keys.len();
        metrics::record_key_rotation();
        Ok(key)
    }

    /// Keys currently in rotation
    pub async fn key_count(&self) -> usize {
        self.ring.read().await.keys.len()
    }

    /// Whether any key (rotated or configured) is available
    pub async fn has_key(&self) -> bool {
        self.fallback_key.is_some() || self.key_count().await > 0
    }

    /// Refresh the list every interval until cancelled
    pub fn spawn_refresh_task(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(manager.refresh_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            info!("🔄 Helius key refresh every {:?}", manager.refresh_interval);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("🔌 Helius key refresh stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        // failure is logged inside refresh and the old list kept
                        let _ = manager.refresh().await;
                    }
                }
            }
        })
    }
}
