//! File-backed local key/value store
//!
//! Holds the small client-side state the dashboard keeps outside Supabase:
//! the connected wallet session, revealed API keys while the vault is
//! unlocked, and site backup snapshots. The whole store is one JSON document
//! rewritten on every change.

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::models::StorageConfig;
use crate::core::error::AppError;
use crate::core::result::AppResult;

/// Key of the cached wallet session
pub const WALLET_SESSION_KEY: &str = "wallet_session";

/// Key of the revealed API key cache
pub const API_KEY_CACHE_KEY: &str = "api_key_cache";

/// Prefix of per-user backup snapshots
pub const SITE_BACKUP_PREFIX: &str = "site_backup:";

/// JSON key/value store persisted to a single file
#[derive(Debug)]
pub struct LocalStore {
    path: Option<PathBuf>,
    entries: Mutex<Map<String, Value>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl LocalStore {
    /// Open (or create) the store described by the configuration
    pub async fn open(config: &StorageConfig) -> AppResult<Self> {
        Self::open_at(Path::new(&config.data_dir).join(&config.file_name)).await
    }

    /// Open the store at an explicit file path
    pub async fn open_at(path: PathBuf) -> AppResult<Self> {
        let entries = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => Map::new(),
            Ok(content) => match serde_json::from_str::<Value>(&content) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    warn!("⚠️  Local store {} is corrupt, starting empty", path.display());
                    Map::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Map::new(),
            Err(e) => {
                return Err(AppError::internal(format!(
                    "Failed to read local store {}: {}",
                    path.display(),
                    e
                )))
            }
        };

        debug!("💾 Local store {} opened with {} key(s)", path.display(), entries.len());

        Ok(Self {
            path: Some(path),
            entries: Mutex::new(entries),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// Store that never touches disk
    pub fn ephemeral() -> Self {
        Self {
            path: None,
            entries: Mutex::new(Map::new()),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Read and deserialize a value
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> AppResult<Option<T>> {
        let value = self.entries.lock().get(key).cloned();
        value
            .map(|v| {
                serde_json::from_value(v)
                    .map_err(|e| AppError::internal(format!("Local store entry '{}' is malformed: {}", key, e)))
            })
            .transpose()
    }

    /// Serialize and store a value
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> AppResult<()> {
        let value = serde_json::to_value(value)?;
        self.entries.lock().insert(key.to_string(), value);
        self.flush().await
    }

    /// Remove a key, returning whether it existed
    pub async fn remove(&self, key: &str) -> AppResult<bool> {
        let existed = self.entries.lock().remove(key).is_some();
        if existed {
            self.flush().await?;
        }
        Ok(existed)
    }

    /// Keys starting with `prefix`
    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries
            .lock()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    async fn flush(&self) -> AppResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let _guard = self.write_lock.lock().await;
        let snapshot = {
            let entries = self.entries.lock();
            serde_json::to_vec_pretty(&*entries)?
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, snapshot).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}
