//! API Vault
//!
//! Third-party API keys in `api_keys_storage` behind a lock gate. Listing
//! shows masked values at any time; revealing a key needs the vault to be
//! unlocked with the passphrase. Revealed keys are cached in the local store
//! until the vault is locked again.

use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::models::SecurityConfig;
use crate::core::error::AppError;
use crate::core::result::AppResult;
use crate::core::types::{ApiKeyRecord, KeyStatus};
use crate::infrastructure::database::{Query, Table, TableStore};
use crate::infrastructure::security::{mask_secret, verify_passphrase, VaultCipher};
use crate::infrastructure::storage::{LocalStore, API_KEY_CACHE_KEY};

type RevealedKeys = HashMap<String, String>;

/// Lock-gated access to stored API keys
#[derive(Debug)]
pub struct ApiVault {
    api_keys: Table<ApiKeyRecord>,
    cipher: Arc<VaultCipher>,
    passphrase_hash: Option<String>,
    local: Arc<LocalStore>,
    locked: AtomicBool,
    /// Held while the lock flag is set or the reveal cache is rewritten
    cache_gate: Mutex<()>,
}

impl ApiVault {
    /// Create a locked vault
    pub fn new(
        store: Arc<dyn TableStore>,
        cipher: Arc<VaultCipher>,
        local: Arc<LocalStore>,
        config: &SecurityConfig,
    ) -> Self {
        Self {
            api_keys: Table::new(store),
            cipher,
            passphrase_hash: config.vault_passphrase_hash.clone().filter(|h| !h.trim().is_empty()),
            local,
            locked: AtomicBool::new(true),
            cache_gate: Mutex::new(()),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::SeqCst)
    }

    /// Unlock with the vault passphrase
    pub fn unlock(&self, passphrase: &str) -> AppResult<()> {
        match &self.passphrase_hash {
            None => warn!("⚠️  No vault passphrase configured, unlocking without verification"),
            Some(hash) => {
                if !verify_passphrase(passphrase, hash)? {
                    return Err(AppError::security("Incorrect vault passphrase"));
                }
            }
        }

        self.locked.store(false, Ordering::SeqCst);
        info!("🔓 API vault unlocked");
        Ok(())
    }

    /// Lock the vault and drop every cached revealed key
    pub async fn lock(&self) -> AppResult<()> {
        let _gate = self.cache_gate.lock().await;
        self.locked.store(true, Ordering::SeqCst);
        self.local.remove(API_KEY_CACHE_KEY).await?;
        info!("🔒 API vault locked");
        Ok(())
    }

    /// Store a new key; the returned record carries the masked value
    #[instrument(skip(self, secret))]
    pub async fn store_key(&self, user_id: &str, service: &str, key_name: &str, secret: &str) -> AppResult<ApiKeyRecord> {
        let service = service.trim().to_ascii_lowercase();
        if service.is_empty() {
            return Err(AppError::invalid_field("service", service.as_str(), "Service is required"));
        }
        if key_name.trim().is_empty() {
            return Err(AppError::invalid_field("key_name", key_name, "Key name is required"));
        }
        let secret = secret.trim();
        if secret.is_empty() {
            return Err(AppError::validation("API key value is required"));
        }

        let stored = self
            .api_keys
            .insert(&ApiKeyRecord {
                id: None,
                user_id: Some(user_id.to_string()),
                service,
                key_name: key_name.trim().to_string(),
                api_key: self.cipher.seal(secret)?,
                status: KeyStatus::Active,
                created_at: None,
            })
            .await?;

        info!("🔑 Stored {} key '{}' for {}", stored.service, stored.key_name, user_id);
        Ok(ApiKeyRecord {
            api_key: mask_secret(secret),
            ..stored
        })
    }

    /// A user's keys with masked values; works while locked
    pub async fn list_keys(&self, user_id: &str) -> AppResult<Vec<ApiKeyRecord>> {
        let records = self
            .api_keys
            .select(&Query::new().eq("user_id", user_id).order("created_at", true))
            .await?;

        Ok(records
            .into_iter()
            .map(|record| {
                let masked = match self.cipher.open(&record.api_key) {
                    Ok(plain) => mask_secret(&plain),
                    Err(_) => mask_secret(""),
                };
                ApiKeyRecord { api_key: masked, ..record }
            })
            .collect())
    }

    /// Decrypted value of a key; requires an unlocked vault
    #[instrument(skip(self))]
    pub async fn reveal_key(&self, key_id: &str) -> AppResult<String> {
        {
            let _gate = self.cache_gate.lock().await;
            if self.is_locked() {
                return Err(AppError::vault_locked());
            }
            let cache: RevealedKeys = self.local.get(API_KEY_CACHE_KEY)?.unwrap_or_default();
            if let Some(value) = cache.get(key_id) {
                debug!("🔑 Key {} served from reveal cache", key_id);
                return Ok(value.clone());
            }
        }

        let record = self.find(key_id).await?;
        let plain = self.cipher.open(&record.api_key)?;
        let value = plain.as_str().to_string();

        let _gate = self.cache_gate.lock().await;
        // locked while the row was loading: hand out the value, cache nothing
        if !self.is_locked() {
            let mut cache: RevealedKeys = self.local.get(API_KEY_CACHE_KEY)?.unwrap_or_default();
            cache.insert(key_id.to_string(), value.clone());
            self.local.set(API_KEY_CACHE_KEY, &cache).await?;
        }
        Ok(value)
    }

    /// Change a key's status
    pub async fn set_status(&self, key_id: &str, status: KeyStatus) -> AppResult<ApiKeyRecord> {
        let updated = self
            .api_keys
            .update(&Query::new().eq("id", key_id), json!({ "status": status }))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::not_found("api_key", key_id))?;

        info!("🔑 Key {} is now {}", key_id, status.as_str());
        Ok(ApiKeyRecord {
            api_key: mask_secret(""),
            ..updated
        })
    }

    /// Delete a key and forget any revealed copy
    pub async fn delete_key(&self, key_id: &str) -> AppResult<()> {
        if self.api_keys.delete(&Query::new().eq("id", key_id)).await? == 0 {
            return Err(AppError::not_found("api_key", key_id));
        }

        let _gate = self.cache_gate.lock().await;
        if let Some(mut cache) = self.local.get::<RevealedKeys>(API_KEY_CACHE_KEY)? {
            if cache.remove(key_id).is_some() {
                self.local.set(API_KEY_CACHE_KEY, &cache).await?;
            }
        }
        info!("🗑️  Deleted key {}", key_id);
        Ok(())
    }

    async fn find(&self, key_id: &str) -> AppResult<ApiKeyRecord> {
        self.api_keys
            .first(Query::new().eq("id", key_id))
            .await?
            .ok_or_else(|| AppError::not_found("api_key", key_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::InMemoryStore;
    use crate::infrastructure::security::{hash_passphrase, is_sealed};
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;

    struct Fixture {
        vault: Arc<ApiVault>,
        store: Arc<InMemoryStore>,
        local: Arc<LocalStore>,
    }

    fn fixture(passphrase: Option<&str>) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let local = Arc::new(LocalStore::ephemeral());
        let config = SecurityConfig {
            vault_passphrase_hash: passphrase.map(|p| hash_passphrase(p).unwrap()),
            ..SecurityConfig::default()
        };
        let cipher = Arc::new(VaultCipher::from_key_bytes(&[7u8; 32]).unwrap());
        Fixture {
            vault: Arc::new(ApiVault::new(store.clone(), cipher, local.clone(), &config)),
            store,
            local,
        }
    }

    #[tokio::test]
    async fn test_store_encrypts_and_masks() {
        let f = fixture(None);
        let record = f
            .vault
            .store_key("u1", "Helius", "main", "abcd-1234-efgh-5678")
            .await
            .unwrap();

        assert_eq!(record.service, "helius");
        assert_eq!(record.api_key, "abcd…5678");

        let raw: Table<ApiKeyRecord> = Table::new(f.store.clone());
        let stored = raw.select(&Query::new()).await.unwrap();
        assert!(is_sealed(&stored[0].api_key));

        let listed = f.vault.list_keys("u1").await.unwrap();
        assert_eq!(listed[0].api_key, "abcd…5678");
    }

    #[tokio::test]
    async fn test_reveal_requires_unlock() {
        let f = fixture(Some("open sesame"));
        let id = f
            .vault
            .store_key("u1", "coingecko", "pro", "cg-secret-value")
            .await
            .unwrap()
            .id
            .unwrap();

        assert!(f.vault.is_locked());
        assert_matches!(f.vault.reveal_key(&id).await, Err(AppError::Vault { locked: true, .. }));

        assert_matches!(f.vault.unlock("wrong passphrase"), Err(AppError::Security { .. }));
        assert!(f.vault.is_locked());

        f.vault.unlock("open sesame").unwrap();
        assert_eq!(f.vault.reveal_key(&id).await.unwrap(), "cg-secret-value");
        assert!(f.local.get::<RevealedKeys>(API_KEY_CACHE_KEY).unwrap().is_some());

        f.vault.lock().await.unwrap();
        assert!(f.local.get::<RevealedKeys>(API_KEY_CACHE_KEY).unwrap().is_none());
        assert_matches!(f.vault.reveal_key(&id).await, Err(AppError::Vault { .. }));
    }

    #[tokio::test]
    async fn test_status_and_delete() {
        let f = fixture(None);
        let id = f
            .vault
            .store_key("u1", "jupiter", "default", "jup-key-000000")
            .await
            .unwrap()
            .id
            .unwrap();

        let revoked = f.vault.set_status(&id, KeyStatus::Revoked).await.unwrap();
        assert_eq!(revoked.status, KeyStatus::Revoked);

        f.vault.unlock("anything").unwrap();
        f.vault.reveal_key(&id).await.unwrap();
        f.vault.delete_key(&id).await.unwrap();

        let cache: RevealedKeys = f.local.get(API_KEY_CACHE_KEY).unwrap().unwrap_or_default();
        assert!(cache.is_empty());
        assert_matches!(f.vault.delete_key(&id).await, Err(AppError::NotFound { .. }));
        assert_matches!(f.vault.set_status(&id, KeyStatus::Active).await, Err(AppError::NotFound { .. }));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_lock_racing_reveal_leaves_no_cached_key() {
        let f = fixture(None);
        let id = f
            .vault
            .store_key("u1", "helius", "main", "helius-secret-key-0001")
            .await
            .unwrap()
            .id
            .unwrap();

        for _ in 0..50 {
            f.vault.unlock("anything").unwrap();
            let vault = f.vault.clone();
            let key_id = id.clone();
            let reveal = tokio::spawn(async move { vault.reveal_key(&key_id).await });
            f.vault.lock().await.unwrap();

            match reveal.await.unwrap() {
                Ok(value) => assert_eq!(value, "helius-secret-key-0001"),
                Err(e) => assert_matches!(e, AppError::Vault { locked: true, .. }),
            }
            assert!(f.vault.is_locked());
            assert!(f.local.get::<RevealedKeys>(API_KEY_CACHE_KEY).unwrap().is_none());
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reveals_keep_every_cached_key() {
        let f = fixture(None);
        let first = f.vault.store_key("u1", "helius", "a", "first-secret-value-1").await.unwrap().id.unwrap();
        let second = f.vault.store_key("u1", "solscan", "b", "second-secret-value-2").await.unwrap().id.unwrap();
        f.vault.unlock("anything").unwrap();

        let (a, b) = tokio::join!(
            tokio::spawn({
                let vault = f.vault.clone();
                async move { vault.reveal_key(&first).await }
            }),
            tokio::spawn({
                let vault = f.vault.clone();
                async move { vault.reveal_key(&second).await }
            }),
        );
        assert_eq!(a.unwrap().unwrap(), "first-secret-value-1");
        assert_eq!(b.unwrap().unwrap(), "second-secret-value-2");

        let cache: RevealedKeys = f.local.get(API_KEY_CACHE_KEY).unwrap().unwrap();
        assert_eq!(cache.len(), 2);
    }

    #[tokio::test]
    async fn test_empty_values_rejected() {
        let f = fixture(None);
        assert_matches!(f.vault.store_key("u1", " ", "n", "v").await, Err(AppError::Validation { .. }));
        assert_matches!(f.vault.store_key("u1", "s", "n", "  ").await, Err(AppError::Validation { .. }));
    }
}
