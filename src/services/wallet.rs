//! Wallet connection and portfolio valuation
//!
//! Connecting a wallet links it to the user in `wallets`, opens a
//! `user_sessions` row and caches the session in the local store so the
//! next process start knows which wallet was active. The portfolio is built
//! from the RPC SOL balance and Helius token balances, named from the
//! `tokens` table and priced through [`MarketService`].

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::core::result::AppResult;
use crate::core::types::{TokenRecord, WalletAddress, WalletRecord};
use crate::infrastructure::database::{Query, Table, TableStore};
use crate::infrastructure::monitoring::ErrorCollector;
use crate::infrastructure::storage::{LocalStore, WALLET_SESSION_KEY};
use crate::services::account::AccountService;
use crate::services::helius::{HeliusClient, TokenBalance};
use crate::services::market::{MarketService, SOL_MINT};
use crate::services::solana::ChainRpc;
use crate::utils::time::now;

const COMPONENT: &str = "wallet";
const DEFAULT_WALLET_TYPE: &str = "phantom";

/// Cached record of the connected wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletSession {
    pub user_id: String,
    pub address: String,
    pub wallet_type: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub connected_at: DateTime<Utc>,
}

/// One token line of a portfolio
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PortfolioToken {
    pub mint: String,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub logo_uri: Option<String>,
    pub amount: Decimal,
    pub decimals: u8,
    pub price_usd: Option<Decimal>,
    pub value_usd: Option<Decimal>,
}

/// SOL plus token holdings with USD values where a price is known
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Portfolio {
    pub address: String,
    pub sol_balance: Decimal,
    pub sol_price_usd: Option<Decimal>,
    pub sol_value_usd: Option<Decimal>,
    pub tokens: Vec<PortfolioToken>,
    pub total_value_usd: Decimal,
}

/// Wallet connections and balances
#[derive(Clone)]
pub struct WalletService {
    wallets: Table<WalletRecord>,
    tokens: Table<TokenRecord>,
    accounts: AccountService,
    local: Arc<LocalStore>,
    rpc: Arc<dyn ChainRpc>,
    helius: Option<Arc<HeliusClient>>,
    market: Arc<MarketService>,
    errors: Arc<ErrorCollector>,
}

impl std::fmt::Debug for WalletService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletService")
            .field("wallets", &self.wallets)
            .field("helius", &self.helius.is_some())
            .finish()
    }
}

impl WalletService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn TableStore>,
        local: Arc<LocalStore>,
        accounts: AccountService,
        rpc: Arc<dyn ChainRpc>,
        helius: Option<Arc<HeliusClient>>,
        market: Arc<MarketService>,
        errors: Arc<ErrorCollector>,
    ) -> Self {
        Self {
            wallets: Table::new(store.clone()),
            tokens: Table::new(store),
            accounts,
            local,
            rpc,
            helius,
            market,
            errors,
        }
    }

    /// Link `address` to the user and make it the active wallet
    #[instrument(skip(self))]
    pub async fn connect(&self, user_id: &str, address: &str, wallet_type: &str) -> AppResult<WalletSession> {
        let address = WalletAddress::new(address.trim())?;
        let wallet_type = match wallet_type.trim() {
            "" => DEFAULT_WALLET_TYPE.to_string(),
            other => other.to_ascii_lowercase(),
        };
        let connected_at = now();

        self.wallets
            .upsert(
                &[WalletRecord {
                    id: None,
                    user_id: user_id.to_string(),
                    address: address.to_string(),
                    label: None,
                    wallet_type: wallet_type.clone(),
                    last_connected_at: Some(connected_at),
                }],
                &["user_id", "address"],
            )
            .await?;

        if let Some(previous) = self.current_session()? {
            if previous.user_id == user_id {
                self.end_session(&previous).await;
            }
        }

        let session = self
            .accounts
            .start_session(user_id, Some(&format!("wallet:{}", wallet_type)))
            .await?;

        let cached = WalletSession {
            user_id: user_id.to_string(),
            address: address.to_string(),
            wallet_type,
            session_id: session.id,
            connected_at,
        };
        self.local.set(WALLET_SESSION_KEY, &cached).await?;

        info!("👛 Connected {} wallet {} for {}", cached.wallet_type, address.short(), user_id);
        Ok(cached)
    }

    /// Forget the active wallet of `user_id`; false when none was connected
    #[instrument(skip(self))]
    pub async fn disconnect(&self, user_id: &str) -> AppResult<bool> {
        let Some(session) = self.current_session()? else {
            return Ok(false);
        };
        if session.user_id != user_id {
            return Ok(false);
        }

        self.local.remove(WALLET_SESSION_KEY).await?;
        self.end_session(&session).await;

        info!("👋 Disconnected wallet for {}", user_id);
        Ok(true)
    }

    /// The cached wallet session, if any
    pub fn current_session(&self) -> AppResult<Option<WalletSession>> {
        self.local.get(WALLET_SESSION_KEY)
    }

    /// Wallets a user has connected, most recent first
    pub async fn list_wallets(&self, user_id: &str) -> AppResult<Vec<WalletRecord>> {
        self.wallets
            .select(&Query::new().eq("user_id", user_id).order("last_connected_at", true))
            .await
    }

    /// SOL and token holdings of `address` valued in USD
    ///
    /// The SOL balance is required. Token balances and prices degrade to
    /// empty when their source fails; the failure is reported.
    #[instrument(skip(self))]
    pub async fn portfolio(&self, address: &str) -> AppResult<Portfolio> {
        let address = WalletAddress::new(address.trim())?;

        let sol_balance = match self.rpc.get_sol_balance(&address).await {
            Ok(balance) => balance,
            Err(e) => return Err(self.errors.capture(e, COMPONENT).await),
        };

        let balances = self.token_balances(&address).await;
        let metadata = self.token_metadata(&balances).await;

        let mut mints: Vec<String> = balances.iter().map(|b| b.mint.clone()).collect();
        mints.push(SOL_MINT.to_string());
        let prices = match self.market.token_prices(&mints).await {
            Ok(prices) => prices,
            Err(e) => {
                self.errors.report(&e, COMPONENT).await;
                HashMap::new()
            }
        };

        let sol_price_usd = prices.get(SOL_MINT).copied();
        let sol_value_usd = sol_price_usd.map(|p| p * sol_balance);

        let mut tokens: Vec<PortfolioToken> = balances
            .into_iter()
            .map(|balance| {
                let meta = metadata.get(&balance.mint);
                let amount = balance.ui_amount();
                let price_usd = prices.get(&balance.mint).copied();
                PortfolioToken {
                    symbol: meta.map(|m| m.symbol.clone()),
                    name: meta.map(|m| m.name.clone()).filter(|n| !n.is_empty()),
                    logo_uri: meta.and_then(|m| m.logo_uri.clone()),
                    amount,
                    decimals: balance.decimals,
                    price_usd,
                    value_usd: price_usd.map(|p| p * amount),
                    mint: balance.mint,
                }
            })
            .collect();
        tokens.sort_by(|a, b| b.value_usd.unwrap_or_default().cmp(&a.value_usd.unwrap_or_default()));

        let total_value_usd = sol_value_usd.unwrap_or_default()
            + tokens.iter().filter_map(|t| t.value_usd).sum::<Decimal>();

        Ok(Portfolio {
            address: address.to_string(),
            sol_balance,
            sol_price_usd,
            sol_value_usd,
            tokens,
            total_value_usd: total_value_usd.round_dp(2),
        })
    }

    async fn token_balances(&self, address: &WalletAddress) -> Vec<TokenBalance> {
        let Some(helius) = &self.helius else {
            return Vec::new();
        };
        match helius.get_balances(address).await {
            Ok(balances) => balances.tokens.into_iter().filter(|t| t.amount > 0).collect(),
            Err(e) => {
                self.errors.report(&e, COMPONENT).await;
                Vec::new()
            }
        }
    }

    async fn token_metadata(&self, balances: &[TokenBalance]) -> HashMap<String, TokenRecord> {
        if balances.is_empty() {
            return HashMap::new();
        }
        let mints = balances.iter().map(|b| b.mint.clone());
        match self.tokens.select(&Query::new().is_in("mint", mints)).await {
            Ok(rows) => rows.into_iter().map(|t| (t.mint.clone(), t)).collect(),
            Err(e) => {
                warn!("⚠️  Token metadata unavailable: {}", e);
                HashMap::new()
            }
        }
    }

    async fn end_session(&self, session: &WalletSession) {
        if let Some(id) = &session.session_id {
            if let Err(e) = self.accounts.end_session(id).await {
                self.errors.report(&e, COMPONENT).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::{HeliusConfig, MarketConfig};
    use crate::core::error::AppError;
    use crate::infrastructure::database::InMemoryStore;
    use crate::infrastructure::security::VaultCipher;
    use crate::services::helius::HeliusKeyManager;
    use crate::services::http::ApiHttp;
    use crate::services::market::{CoinGeckoClient, JupiterClient};
    use crate::services::solana::MockChainRpc;
    use assert_matches::assert_matches;
    use pretty_assertions::assert_eq;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ADDRESS: &str = "7xKXtg2CW87d97TXJSDpbD5jBkheTqA83TZRuJosgAsU";
    const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    struct Fixture {
        wallet: WalletService,
        store: Arc<InMemoryStore>,
        errors: Arc<ErrorCollector>,
    }

    fn fast_http(service: &'static str) -> ApiHttp {
        ApiHttp::new(service, 1_000, 2)
            .unwrap()
            .with_retry_window(Duration::from_millis(5), Duration::from_millis(30))
    }

    fn fixture(server: Option<&MockServer>, rpc: MockChainRpc) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let errors = Arc::new(ErrorCollector::new(20));
        let base = server.map_or_else(|| "http://127.0.0.1:9".to_string(), MockServer::uri);

        let market_config = MarketConfig {
            jupiter_price_url: format!("{}/price/v2", base),
            coingecko_url: base.clone(),
            ..MarketConfig::default()
        };
        let market = MarketService::new(
            JupiterClient::new(&market_config).unwrap().with_http(fast_http("jupiter")),
            CoinGeckoClient::new(&market_config).unwrap().with_http(fast_http("coingecko")),
            errors.clone(),
        );

        let helius = server.map(|server| {
            let config = HeliusConfig {
                base_url: server.uri(),
                api_key: "fallback-key".to_string(),
                ..HeliusConfig::default()
            };
            let keys = Arc::new(HeliusKeyManager::new(store.clone(), Arc::new(VaultCipher::disabled()), &config));
            Arc::new(
                HeliusClient::new(&config, keys)
                    .unwrap()
                    .with_retry_window(Duration::from_millis(5), Duration::from_millis(30)),
            )
        });

        let wallet = WalletService::new(
            store.clone(),
            Arc::new(LocalStore::ephemeral()),
            AccountService::new(store.clone()),
            Arc::new(rpc),
            helius,
            Arc::new(market),
            errors.clone(),
        );
        Fixture { wallet, store, errors }
    }

    #[tokio::test]
    async fn test_connect_and_disconnect() {
        let f = fixture(None, MockChainRpc::new());

        let session = f.wallet.connect("u1", ADDRESS, "Solflare").await.unwrap();
        assert_eq!(session.wallet_type, "solflare");
        assert_eq!(f.wallet.current_session().unwrap(), Some(session.clone()));
        assert_eq!(f.store.row_count("wallets"), 1);

        // reconnecting updates the wallet row and replaces the session
        f.wallet.connect("u1", ADDRESS, "").await.unwrap();
        assert_eq!(f.store.row_count("wallets"), 1);
        assert_eq!(f.wallet.list_wallets("u1").await.unwrap()[0].wallet_type, "phantom");

        let accounts = AccountService::new(f.store.clone());
        assert_eq!(accounts.active_sessions("u1").await.unwrap().len(), 1);

        assert!(!f.wallet.disconnect("someone-else").await.unwrap());
        assert!(f.wallet.disconnect("u1").await.unwrap());
        assert_eq!(f.wallet.current_session().unwrap(), None);
        assert!(accounts.active_sessions("u1").await.unwrap().is_empty());
        assert!(!f.wallet.disconnect("u1").await.unwrap());
    }

    #[tokio::test]
    async fn test_connect_rejects_invalid_address() {
        let f = fixture(None, MockChainRpc::new());
        assert_matches!(f.wallet.connect("u1", "not-a-key", "phantom").await, Err(AppError::Validation { .. }));
        assert_eq!(f.store.row_count("wallets"), 0);
    }

    #[tokio::test]
    async fn test_portfolio_values_holdings() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/addresses/{}/balances", ADDRESS)))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "tokens": [
                    { "mint": USDC, "amount": 25_500_000u64, "decimals": 6 },
                    { "mint": "EmptyMint111111111111111111111111111111111", "amount": 0, "decimals": 9 }
                ],
                "nativeBalance": 2_000_000_000u64
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/price/v2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    SOL_MINT: { "price": "150" },
                    USDC: { "price": "1" }
                }
            })))
            .mount(&server)
            .await;

        let mut rpc = MockChainRpc::new();
        rpc.expect_get_sol_balance().returning(|_| Ok(dec!(2)));
        let f = fixture(Some(&server), rpc);

        let tokens: Table<TokenRecord> = Table::new(f.store.clone());
        tokens
            .insert(&TokenRecord {
                mint: USDC.to_string(),
                symbol: "USDC".to_string(),
                name: "USD Coin".to_string(),
                decimals: 6,
                logo_uri: None,
            })
            .await
            .unwrap();

        let portfolio = f.wallet.portfolio(ADDRESS).await.unwrap();
        assert_eq!(portfolio.sol_value_usd, Some(dec!(300)));
        assert_eq!(portfolio.tokens.len(), 1);
        assert_eq!(portfolio.tokens[0].symbol.as_deref(), Some("USDC"));
        assert_eq!(portfolio.tokens[0].amount, dec!(25.5));
        assert_eq!(portfolio.total_value_usd, dec!(325.50));
        assert!(f.errors.is_empty());
    }

    #[tokio::test]
    async fn test_portfolio_degrades_without_prices() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let mut rpc = MockChainRpc::new();
        rpc.expect_get_sol_balance().returning(|_| Ok(dec!(1.5)));
        let f = fixture(Some(&server), rpc);

        let portfolio = f.wallet.portfolio(ADDRESS).await.unwrap();
        assert_eq!(portfolio.sol_balance, dec!(1.5));
        assert!(portfolio.tokens.is_empty());
        assert_eq!(portfolio.sol_price_usd, None);
        assert_eq!(portfolio.total_value_usd, Decimal::ZERO);
        assert!(!f.errors.is_empty());
    }

    #[tokio::test]
    async fn test_portfolio_requires_sol_balance() {
        let mut rpc = MockChainRpc::new();
        rpc.expect_get_sol_balance()
            .returning(|_| Err(AppError::network("connection refused")));
        let f = fixture(None, rpc);

        assert_matches!(f.wallet.portfolio(ADDRESS).await, Err(AppError::Network { .. }));
        assert_eq!(f.errors.len(), 1);
    }
}
