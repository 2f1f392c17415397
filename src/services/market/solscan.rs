//! Solscan API client with a `solscan_data` read-through cache
//!
//! Responses are stored by cache key with the time they were fetched. A
//! cached row younger than the configured TTL is served without calling
//! Solscan; older rows are refreshed and overwritten.

use chrono::Duration as ChronoDuration;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::config::models::MarketConfig;
use crate::core::error::AppError;
use crate::core::result::AppResult;
use crate::core::types::{ServiceName, SolscanData, WalletAddress};
use crate::infrastructure::database::{Query, Table, TableStore};
use crate::services::http::ApiHttp;
use crate::utils::time::{is_fresh, now};

const TOKEN_ACCOUNTS_PAGE_SIZE: &str = "40";

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    errors: Option<Value>,
}

/// Solscan pro API client
#[derive(Debug, Clone)]
pub struct SolscanClient {
    http: ApiHttp,
    base_url: String,
    api_key: Option<String>,
    cache: Table<SolscanData>,
    ttl: ChronoDuration,
}

impl SolscanClient {
    pub fn new(config: &MarketConfig, store: Arc<dyn TableStore>) -> AppResult<Self> {
        Ok(Self {
            http: ApiHttp::new(ServiceName::Solscan.as_str(), config.request_timeout_ms, 2)?,
            base_url: config.solscan_url.trim_end_matches('/').to_string(),
            api_key: config.solscan_api_key.clone().filter(|k| !k.is_empty()),
            cache: Table::new(store),
            ttl: ChronoDuration::seconds(config.solscan_cache_ttl_seconds as i64),
        })
    }

    /// Replace the HTTP client, e.g. to shorten retries
    pub fn with_http(mut self, http: ApiHttp) -> Self {
        self.http = http;
        self
    }

    /// SPL token accounts held by an address
    #[instrument(skip(self), fields(address = %address.short()))]
    pub async fn account_tokens(&self, address: &WalletAddress) -> AppResult<Value> {
        let params = [
            ("address", address.as_str()),
            ("type", "token"),
            ("page", "1"),
            ("page_size", TOKEN_ACCOUNTS_PAGE_SIZE),
        ];
        self.cached(address.as_str(), "tokens", "/account/token-accounts", &params)
            .await
    }

    /// Token metadata for a mint
    #[instrument(skip(self))]
    pub async fn token_meta(&self, mint: &str) -> AppResult<Value> {
        self.cached(mint, "meta", "/token/meta", &[("address", mint)])
            .await
    }

    async fn cached(
        &self,
        address: &str,
        data_type: &str,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> AppResult<Value> {
        let current = now();
        let key = Query::new().eq("address", address).eq("data_type", data_type);
        match self.cache.first(key).await {
            Ok(Some(row)) if is_fresh(&row.fetched_at, self.ttl, current) => {
                debug!("📦 Solscan {} cache hit for {}", data_type, address);
                return Ok(row.data);
            }
            Ok(_) => {}
            Err(e) => warn!("⚠️  Solscan cache read failed for {}: {}", address, e),
        }

        let data = self.fetch(endpoint, params).await?;

        let row = SolscanData {
            id: None,
            address: address.to_string(),
            data_type: data_type.to_string(),
            data: data.clone(),
            fetched_at: current,
        };
        if let Err(e) = self.cache.upsert(&[row], &["address", "data_type"]).await {
            warn!("⚠️  Failed to cache Solscan {} for {}: {}", data_type, address, e);
        }
        Ok(data)
    }

    async fn fetch(&self, endpoint: &str, params: &[(&str, &str)]) -> AppResult<Value> {
        let url = format!("{}{}", self.base_url, endpoint);
        let (url, api_key, client) = (url.as_str(), self.api_key.as_deref(), self.http.client());

        let envelope: Envelope = self
            .http
            .execute(endpoint, move || async move {
                let mut request = client.get(url).query(params);
                if let Some(key) = api_key {
                    request = request.header("token", key);
                }
                Ok(request)
            })
            .await?;

        if !envelope.success {
            let detail = envelope.errors.map(|e| e.to_string()).unwrap_or_else(|| "unknown error".to_string());
            return Err(AppError::external("solscan", format!("{} failed: {}", endpoint, detail), None));
        }
        Ok(envelope.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::InMemoryStore;
    use assert_matches::assert_matches;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    fn client(server: &MockServer, store: Arc<InMemoryStore>) -> SolscanClient {
        let config = MarketConfig {
            solscan_url: server.uri(),
            solscan_api_key: Some("token-123".to_string()),
            solscan_cache_ttl_seconds: 300,
            ..MarketConfig::default()
        };
        SolscanClient::new(&config, store).unwrap()
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token/meta"))
            .and(query_param("address", MINT))
            .and(header("token", "token-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "symbol": "USDC", "decimals": 6 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(InMemoryStore::new());
        let client = client(&server, store.clone());

        let first = client.token_meta(MINT).await.unwrap();
        let second = client.token_meta(MINT).await.unwrap();

        assert_eq!(first["symbol"], "USDC");
        assert_eq!(first, second);
        assert_eq!(store.row_count("solscan_data"), 1);
    }

    #[tokio::test]
    async fn test_stale_cache_refreshed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token/meta"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "symbol": "USDC", "decimals": 6 }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let store = Arc::new(InMemoryStore::new());
        let cache: Table<SolscanData> = Table::new(store.clone());
        cache
            .insert(&SolscanData {
                id: None,
                address: MINT.to_string(),
                data_type: "meta".to_string(),
                data: json!({ "symbol": "OLD" }),
                fetched_at: now() - ChronoDuration::hours(1),
            })
            .await
            .unwrap();

        let meta = client(&server, store.clone()).token_meta(MINT).await.unwrap();
        assert_eq!(meta["symbol"], "USDC");
        assert_eq!(store.row_count("solscan_data"), 1);
    }

    #[tokio::test]
    async fn test_cache_rows_keyed_by_address_and_type() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/token/meta"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "symbol": "USDC" }
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/account/token-accounts"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": [] })))
            .mount(&server)
            .await;

        let store = Arc::new(InMemoryStore::new());
        let client = client(&server, store.clone());
        client.token_meta(MINT).await.unwrap();
        client.account_tokens(&WalletAddress::new(MINT).unwrap()).await.unwrap();

        let cache: Table<SolscanData> = Table::new(store);
        let rows = cache.select(&Query::new().eq("address", MINT)).await.unwrap();
        let mut types: Vec<_> = rows.iter().map(|r| r.data_type.as_str()).collect();
        types.sort();
        assert_eq!(types, vec!["meta", "tokens"]);
    }

    #[tokio::test]
    async fn test_unsuccessful_envelope_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "errors": { "code": 1100, "message": "invalid address" }
            })))
            .mount(&server)
            .await;

        let store = Arc::new(InMemoryStore::new());
        assert_matches!(
            client(&server, store).token_meta("bad").await,
            Err(AppError::ExternalService { .. })
        );
    }
}
