//! Jupiter price (v2) and swap quote (v1) client
//!
//! Quotes are read-only: nothing here builds or sends a swap.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::instrument;

use crate::config::models::MarketConfig;
use crate::core::error::AppError;
use crate::core::result::AppResult;
use crate::core::types::ServiceName;
use crate::services::http::ApiHttp;

/// Price API accepts at most this many ids per call
pub const MAX_PRICE_IDS: usize = 100;

#[derive(Debug, Deserialize)]
struct PriceResponse {
    #[serde(default)]
    data: HashMap<String, Option<PriceEntry>>,
}

#[derive(Debug, Deserialize)]
struct PriceEntry {
    #[serde(default, with = "rust_decimal::serde::str_option")]
    price: Option<Decimal>,
}

/// Swap quote as returned by `/swap/v1/quote`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapQuote {
    pub input_mint: String,
    pub in_amount: String,
    pub output_mint: String,
    pub out_amount: String,
    #[serde(default)]
    pub other_amount_threshold: Option<String>,
    #[serde(default)]
    pub swap_mode: Option<String>,
    pub slippage_bps: u16,
    #[serde(default, with = "rust_decimal::serde::str_option")]
    pub price_impact_pct: Option<Decimal>,
    #[serde(default)]
    pub route_plan: Vec<serde_json::Value>,
}

impl SwapQuote {
    /// Output amount in base units
    pub fn out_amount_raw(&self) -> AppResult<u64> {
        self.out_amount
            .parse()
            .map_err(|_| AppError::external("jupiter", format!("invalid outAmount '{}'", self.out_amount), None))
    }
}

/// Jupiter REST client
#[derive(Debug, Clone)]
pub struct JupiterClient {
    http: ApiHttp,
    price_url: String,
    quote_url: String,
    api_key: Option<String>,
}

impl JupiterClient {
    pub fn new(config: &MarketConfig) -> AppResult<Self> {
        Ok(Self {
            http: ApiHttp::new(ServiceName::Jupiter.as_str(), config.request_timeout_ms, 4)?,
            price_url: config.jupiter_price_url.clone(),
            quote_url: config.jupiter_quote_url.clone(),
            api_key: config.jupiter_api_key.clone().filter(|k| !k.is_empty()),
        })
    }

    /// Replace the HTTP client, e.g. to shorten retries
    pub fn with_http(mut self, http: ApiHttp) -> Self {
        self.http = http;
        self
    }

    /// USD price per mint; mints without a price are absent
    #[instrument(skip(self), fields(count = mints.len()))]
    pub async fn prices(&self, mints: &[String]) -> AppResult<HashMap<String, Decimal>> {
        let mut prices = HashMap::with_capacity(mints.len());

        for chunk in mints.chunks(MAX_PRICE_IDS) {
            let ids = chunk.join(",");
            let (url, ids, api_key, client) =
                (self.price_url.as_str(), ids.as_str(), self.api_key.as_deref(), self.http.client());

            let response: PriceResponse = self
                .http
                .execute("price", move || async move {
                    let mut request = client.get(url).query(&[("ids", ids)]);
                    if let Some(key) = api_key {
                        request = request.header("x-api-key", key);
                    }
                    Ok(request)
                })
                .await?;

            prices.extend(
                response
                    .data
                    .into_iter()
                    .filter_map(|(mint, entry)| entry.and_then(|e| e.price).map(|price| (mint, price))),
            );
        }

        Ok(prices)
    }

    /// Best route quote for swapping `amount` base units of `input_mint`
    #[instrument(skip(self))]
    pub async fn quote(&self, input_mint: &str, output_mint: &str, amount: u64, slippage_bps: u16) -> AppResult<SwapQuote> {
        if amount == 0 {
            return Err(AppError::invalid_field("amount", "0", "Quote amount must be positive"));
        }
        if slippage_bps > 10_000 {
            return Err(AppError::invalid_field(
                "slippage_bps",
                &slippage_bps.to_string(),
                "Slippage cannot exceed 100%",
            ));
        }

        let amount = amount.to_string();
        let slippage = slippage_bps.to_string();
        let (url, amount, slippage, api_key, client) = (
            self.quote_url.as_str(),
            amount.as_str(),
            slippage.as_str(),
            self.api_key.as_deref(),
            self.http.client(),
        );

        self.http
            .execute("quote", move || async move {
                let mut request = client.get(url).query(&[
                    ("inputMint", input_mint),
                    ("outputMint", output_mint),
                    ("amount", amount),
                    ("slippageBps", slippage),
                ]);
                if let Some(key) = api_key {
                    request = request.header("x-api-key", key);
                }
                Ok(request)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const SOL: &str = "So11111111111111111111111111111111111111112";
    const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    fn client(server: &MockServer) -> JupiterClient {
        let config = MarketConfig {
            jupiter_price_url: format!("{}/price/v2", server.uri()),
            jupiter_quote_url: format!("{}/swap/v1/quote", server.uri()),
            ..MarketConfig::default()
        };
        JupiterClient::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_prices_skip_unknown_mints() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/price/v2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {
                    SOL: { "id": SOL, "type": "derivedPrice", "price": "151.25" },
                    "unknownMint": null
                },
                "timeTaken": 0.002
            })))
            .mount(&server)
            .await;

        let prices = client(&server)
            .prices(&[SOL.to_string(), "unknownMint".to_string()])
            .await
            .unwrap();

        assert_eq!(prices.len(), 1);
        assert_eq!(prices[SOL], dec!(151.25));
    }

    #[tokio::test]
    async fn test_quote() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/swap/v1/quote"))
            .and(query_param("inputMint", SOL))
            .and(query_param("outputMint", USDC))
            .and(query_param("amount", "1000000000"))
            .and(query_param("slippageBps", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "inputMint": SOL,
                "inAmount": "1000000000",
                "outputMint": USDC,
                "outAmount": "151230000",
                "otherAmountThreshold": "150473850",
                "swapMode": "ExactIn",
                "slippageBps": 50,
                "priceImpactPct": "0.0001",
                "routePlan": [{ "percent": 100 }]
            })))
            .mount(&server)
            .await;

        let quote = client(&server).quote(SOL, USDC, 1_000_000_000, 50).await.unwrap();
        assert_eq!(quote.out_amount_raw().unwrap(), 151_230_000);
        assert_eq!(quote.route_plan.len(), 1);
    }

    #[tokio::test]
    async fn test_quote_validation() {
        let server = MockServer::start().await;
        let client = client(&server);

        assert_matches!(client.quote(SOL, USDC, 0, 50).await, Err(AppError::Validation { .. }));
        assert_matches!(client.quote(SOL, USDC, 1, 20_000).await, Err(AppError::Validation { .. }));
    }
}
