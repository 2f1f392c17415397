//! CoinGecko simple price client

use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::instrument;

use crate::config::models::MarketConfig;
use crate::core::result::AppResult;
use crate::core::types::ServiceName;
use crate::services::http::ApiHttp;

/// CoinGecko id of SOL
pub const SOLANA_ID: &str = "solana";

/// `/simple/price` client
#[derive(Debug, Clone)]
pub struct CoinGeckoClient {
    http: ApiHttp,
    base_url: String,
    api_key: Option<String>,
}

impl CoinGeckoClient {
    pub fn new(config: &MarketConfig) -> AppResult<Self> {
        Ok(Self {
            http: ApiHttp::new(ServiceName::CoinGecko.as_str(), config.request_timeout_ms, 4)?,
            base_url: config.coingecko_url.trim_end_matches('/').to_string(),
            api_key: config.coingecko_api_key.clone().filter(|k| !k.is_empty()),
        })
    }

    /// Replace the HTTP client, e.g. to shorten retries
    pub fn with_http(mut self, http: ApiHttp) -> Self {
        self.http = http;
        self
    }

    /// Price of each id in `vs_currency`; ids CoinGecko does not know are absent
    #[instrument(skip(self))]
    pub async fn simple_prices(&self, ids: &[&str], vs_currency: &str) -> AppResult<HashMap<String, Decimal>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let url = format!("{}/simple/price", self.base_url);
        let ids = ids.join(",");
        let vs = vs_currency.to_ascii_lowercase();
        let (url, ids_param, vs_param, api_key, client) =
            (url.as_str(), ids.as_str(), vs.as_str(), self.api_key.as_deref(), self.http.client());

        let body: HashMap<String, HashMap<String, Decimal>> = self
            .http
            .execute("simple_price", move || async move {
                let mut request = client
                    .get(url)
                    .query(&[("ids", ids_param), ("vs_currencies", vs_param)]);
                if let Some(key) = api_key {
                    request = request.header("x-cg-demo-api-key", key);
                }
                Ok(request)
            })
            .await?;

        Ok(body
            .into_iter()
            .filter_map(|(id, quotes)| quotes.get(&vs).copied().map(|price| (id, price)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_simple_prices() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/simple/price"))
            .and(query_param("ids", "solana,usd-coin"))
            .and(query_param("vs_currencies", "usd"))
            .and(header("x-cg-demo-api-key", "demo"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "solana": { "usd": 152.37 },
                "usd-coin": { "usd": 1.0 }
            })))
            .mount(&server)
            .await;

        let config = MarketConfig {
            coingecko_url: server.uri(),
            coingecko_api_key: Some("demo".to_string()),
            ..MarketConfig::default()
        };
        let client = CoinGeckoClient::new(&config).unwrap();

        let prices = client.simple_prices(&[SOLANA_ID, "usd-coin"], "USD").await.unwrap();
        assert_eq!(prices.get(SOLANA_ID), Some(&dec!(152.37)));
        assert_eq!(prices.get("usd-coin"), Some(&dec!(1)));
    }

    #[tokio::test]
    async fn test_server_error_surfaces_after_retries() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let config = MarketConfig {
            coingecko_url: server.uri(),
            ..MarketConfig::default()
        };
        let client = CoinGeckoClient::new(&config).unwrap().with_http(
            ApiHttp::new("coingecko", 1_000, 1)
                .unwrap()
                .with_retry_window(Duration::from_millis(5), Duration::from_millis(50)),
        );

        assert!(client.simple_prices(&[SOLANA_ID], "usd").await.is_err());
    }
}
