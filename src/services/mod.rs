//! Services layer module
//!
//! Dashboard services built on the table store, the local store and the
//! external API clients, plus the container that wires them together.

pub mod account;
pub mod backup;
pub mod bots;
pub mod helius;
pub mod http;
pub mod market;
pub mod security;
pub mod solana;
pub mod transactions;
pub mod vault;
pub mod wallet;

pub use account::{AccountService, ProfileUpdate};
pub use backup::{BackupService, SiteSnapshot};
pub use bots::BotService;
pub use helius::{HeliusClient, HeliusKeyManager};
pub use market::{MarketService, SolscanClient};
pub use security::TransactionSecurityService;
pub use solana::{ChainRpc, SolanaRpc};
pub use transactions::TransactionService;
pub use vault::ApiVault;
pub use wallet::{Portfolio, WalletService, WalletSession};

use std::sync::Arc;
use tracing::info;

use crate::config::AppConfig;
use crate::core::result::AppResult;
use crate::infrastructure::database::{self, TableStore};
use crate::infrastructure::monitoring::ErrorCollector;
use crate::infrastructure::security::VaultCipher;
use crate::infrastructure::storage::LocalStore;

/// Services collection for dependency injection
#[derive(Clone)]
pub struct ServiceContainer {
    /// Supabase or in-memory table store
    pub store: Arc<dyn TableStore>,
    pub local: Arc<LocalStore>,
    pub errors: Arc<ErrorCollector>,
    pub rpc: Arc<dyn ChainRpc>,
    pub helius_keys: Arc<HeliusKeyManager>,
    pub helius: Arc<HeliusClient>,
    pub market: Arc<MarketService>,
    pub solscan: Arc<SolscanClient>,
    pub transactions: Arc<TransactionService>,
    pub security: Arc<TransactionSecurityService>,
    pub bots: BotService,
    pub vault: Arc<ApiVault>,
    pub wallet: Arc<WalletService>,
    pub accounts: AccountService,
    pub backups: BackupService,
}

impl std::fmt::Debug for ServiceContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceContainer")
            .field("store", &self.store.backend())
            .field("errors", &self.errors.len())
            .field("vault_locked", &self.vault.is_locked())
            .finish()
    }
}

impl ServiceContainer {
    /// Initialize all services
    pub async fn initialize(config: &AppConfig) -> AppResult<Self> {
        info!("🚀 Initializing service container");

        let store = database::connect(config)?;
        let local = Arc::new(LocalStore::open(&config.storage).await?);

        let errors = Arc::new(if config.monitoring.persist_errors {
            ErrorCollector::with_persistence(config.monitoring.error_buffer_size, store.clone())
        } else {
            ErrorCollector::new(config.monitoring.error_buffer_size)
        });

        let cipher = Arc::new(VaultCipher::from_config(&config.security)?);

        let rpc: Arc<dyn ChainRpc> = Arc::new(SolanaRpc::new(&config.solana)?);

        let helius_keys = Arc::new(HeliusKeyManager::new(store.clone(), cipher.clone(), &config.helius));
        let helius = Arc::new(HeliusClient::new(&config.helius, helius_keys.clone())?);

        let market = Arc::new(MarketService::new(
            market::JupiterClient::new(&config.market)?,
            market::CoinGeckoClient::new(&config.market)?,
            errors.clone(),
        ));
        let solscan = Arc::new(SolscanClient::new(&config.market, store.clone())?);

        let transactions = Arc::new(TransactionService::new(
            rpc.clone(),
            Some(helius.clone()),
            store.clone(),
            errors.clone(),
        ));
        let security = Arc::new(TransactionSecurityService::new(store.clone(), &config.security));
        let vault = Arc::new(ApiVault::new(store.clone(), cipher, local.clone(), &config.security));
        let accounts = AccountService::new(store.clone());
        let wallet = Arc::new(WalletService::new(
            store.clone(),
            local.clone(),
            accounts.clone(),
            rpc.clone(),
            Some(helius.clone()),
            market.clone(),
            errors.clone(),
        ));

        let container = Self {
            bots: BotService::new(store.clone()),
            backups: BackupService::new(store.clone(), local.clone()),
            store,
            local,
            errors,
            rpc,
            helius_keys,
            helius,
            market,
            solscan,
            transactions,
            security,
            vault,
            wallet,
            accounts,
        };

        info!("✅ Service container initialized with {} store", container.store.backend());
        Ok(container)
    }

    /// Graceful shutdown of all services
    pub async fn shutdown(&self) -> AppResult<()> {
        info!("🛑 Shutting down services");

        // revealed keys must not outlive the process
        self.vault.lock().await?;

        info!("✅ Services shut down successfully");
        Ok(())
    }
}
