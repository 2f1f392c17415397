//! Market data: token prices, swap quotes and Solscan lookups
//!
//! `MarketService` is the price entry point the rest of the crate uses.
//! Jupiter prices every mint; when Jupiter is unavailable SOL alone is
//! priced through CoinGecko so portfolio totals still have their largest
//! component.

pub mod coingecko;
pub mod jupiter;
pub mod solscan;

pub use coingecko::CoinGeckoClient;
pub use jupiter::{JupiterClient, SwapQuote};
pub use solscan::SolscanClient;

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::core::error::AppError;
use crate::core::result::AppResult;
use crate::infrastructure::monitoring::ErrorCollector;

/// Wrapped SOL mint, used by every price source as the id for native SOL
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";

/// Price lookups with a SOL fallback
#[derive(Debug, Clone)]
pub struct MarketService {
    jupiter: JupiterClient,
    coingecko: CoinGeckoClient,
    errors: Arc<ErrorCollector>,
}

impl MarketService {
    pub fn new(jupiter: JupiterClient, coingecko: CoinGeckoClient, errors: Arc<ErrorCollector>) -> Self {
        Self {
            jupiter,
            coingecko,
            errors,
        }
    }

    /// USD price per mint; mints without a known price are absent
    #[instrument(skip(self), fields(count = mints.len()))]
    pub async fn token_prices(&self, mints: &[String]) -> AppResult<HashMap<String, Decimal>> {
        if mints.is_empty() {
            return Ok(HashMap::new());
        }

        let jupiter_err = match self.jupiter.prices(mints).await {
            Ok(prices) => {
                debug!("💰 Jupiter priced {}/{} mints", prices.len(), mints.len());
                return Ok(prices);
            }
            Err(e) => self.errors.capture(e, "market.jupiter").await,
        };

        if !mints.iter().any(|m| m == SOL_MINT) {
            return Err(jupiter_err);
        }

        warn!("⚠️  Jupiter prices unavailable, falling back to CoinGecko for SOL");
        let sol = self.coingecko_sol_price().await?;
        Ok(HashMap::from([(SOL_MINT.to_string(), sol)]))
    }

    /// SOL price in USD
    pub async fn sol_price(&self) -> AppResult<Decimal> {
        let prices = self.token_prices(&[SOL_MINT.to_string()]).await?;
        prices
            .get(SOL_MINT)
            .copied()
            .ok_or_else(|| AppError::external("market", "No SOL price available", None))
    }

    /// Read-only swap quote
    pub async fn quote(&self, input_mint: &str, output_mint: &str, amount: u64, slippage_bps: u16) -> AppResult<SwapQuote> {
        self.jupiter.quote(input_mint, output_mint, amount, slippage_bps).await
    }

    async fn coingecko_sol_price(&self) -> AppResult<Decimal> {
        let prices = match self.coingecko.simple_prices(&[coingecko::SOLANA_ID], "usd").await {
            Ok(prices) => prices,
            Err(e) => return Err(self.errors.capture(e, "market.coingecko").await),
        };
        prices
            .get(coingecko::SOLANA_ID)
            .copied()
            .ok_or_else(|| AppError::external("coingecko", "Response did not include SOL", None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::MarketConfig;
    use crate::services::http::ApiHttp;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BONK: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";

    fn fast_http(service: &'static str) -> ApiHttp {
        ApiHttp::new(service, 1_000, 2)
            .unwrap()
            .with_retry_window(Duration::from_millis(5), Duration::from_millis(30))
    }

    fn service(server: &MockServer, errors: Arc<ErrorCollector>) -> MarketService {
        let config = MarketConfig {
            jupiter_price_url: format!("{}/price/v2", server.uri()),
            coingecko_url: server.uri(),
            ..MarketConfig::default()
        };
        MarketService::new(
            JupiterClient::new(&config).unwrap().with_http(fast_http("jupiter")),
            CoinGeckoClient::new(&config).unwrap().with_http(fast_http("coingecko")),
            errors,
        )
    }

    #[tokio::test]
    async fn test_jupiter_prices_used_first() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/price/v2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    SOL_MINT: { "price": "150.10" },
                    BONK: { "price": "0.0000213" }
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let errors = Arc::new(ErrorCollector::new(10));
        let market = service(&server, errors.clone());
        let prices = market
            .token_prices(&[SOL_MINT.to_string(), BONK.to_string()])
            .await
            .unwrap();

        assert_eq!(prices[SOL_MINT], dec!(150.10));
        assert_eq!(prices[BONK], dec!(0.0000213));
        assert!(errors.is_empty());
    }

    #[tokio::test]
    async fn test_coingecko_fallback_for_sol() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/price/v2"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "solana": { "usd": 149.5 } })))
            .mount(&server)
            .await;

        let errors = Arc::new(ErrorCollector::new(10));
        let market = service(&server, errors.clone());

        assert_eq!(market.sol_price().await.unwrap(), dec!(149.5));
        assert_eq!(errors.len(), 1);

        assert_matches!(
            market.token_prices(&[BONK.to_string()]).await,
            Err(AppError::ExternalService { .. })
        );
    }
}
