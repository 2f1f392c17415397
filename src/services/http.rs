//! Shared JSON-over-HTTPS plumbing for the third-party API clients
//!
//! Every outbound API (Helius, CoinGecko, Jupiter, Solscan) goes through
//! [`ApiHttp::execute`]: a concurrency permit, then a request loop that
//! retries transport errors, 429 and 5xx with exponential backoff.

use backoff::{backoff::Backoff, ExponentialBackoff};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::core::error::AppError;
use crate::core::result::AppResult;
use crate::infrastructure::monitoring::metrics;

const MAX_ERROR_BODY: usize = 256;

/// HTTP client bound to one external service
#[derive(Debug, Clone)]
pub struct ApiHttp {
    client: Client,
    service: &'static str,
    semaphore: Arc<Semaphore>,
    initial_interval: Duration,
    max_elapsed: Duration,
}

impl ApiHttp {
    /// Client for `service` with a per-request timeout and concurrency cap
    pub fn new(service: &'static str, timeout_ms: u64, max_concurrent: usize) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("solana-dashboard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            service,
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            initial_interval: Duration::from_millis(500),
            max_elapsed: Duration::from_secs(30),
        })
    }

    /// Override the retry schedule
    pub fn with_retry_window(mut self, initial_interval: Duration, max_elapsed: Duration) -> Self {
        self.initial_interval = initial_interval;
        self.max_elapsed = max_elapsed;
        self
    }

    /// Underlying `reqwest` client for building requests
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Service name used in errors and metrics
    pub fn service(&self) -> &'static str {
        self.service
    }

    /// Send the request produced by `build` and decode a JSON body
    ///
    /// `build` runs once per attempt so callers can vary the request (for
    /// example rotate API keys) between retries.
    pub async fn execute<T, F, Fut>(&self, operation: &str, mut build: F) -> AppResult<T>
    where
        T: DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = AppResult<RequestBuilder>>,
    {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| AppError::internal(format!("{} request semaphore closed", self.service)))?;

        let mut backoff = ExponentialBackoff {
            initial_interval: self.initial_interval,
            current_interval: self.initial_interval,
            max_elapsed_time: Some(self.max_elapsed),
            ..ExponentialBackoff::default()
        };
        let started = Instant::now();

        loop {
            let request = build().await?;
            let error = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let decoded = response.json::<T>().await.map_err(|e| {
                            AppError::external(
                                self.service,
                                format!("{}: invalid response body: {}", operation, e),
                                Some(status.as_u16()),
                            )
                        });
                        metrics::record_request(self.service, decoded.is_ok(), started.elapsed());
                        if decoded.is_ok() {
                            debug!("✅ {} {} succeeded in {:?}", self.service, operation, started.elapsed());
                        }
                        return decoded;
                    }

                    let body = response.text().await.unwrap_or_default();
                    let error = self.status_error(operation, status, &body);
                    if !is_transient(status) {
                        warn!("⚠️  {} {} rejected: {}", self.service, operation, error);
                        metrics::record_request(self.service, false, started.elapsed());
                        return Err(error);
                    }
                    if status == StatusCode::TOO_MANY_REQUESTS {
                        warn!("⚠️  {} rate limit hit on {}", self.service, operation);
                    }
                    error
                }
                Err(e) => AppError::from(e),
            };

            match backoff.next_backoff() {
                Some(delay) => {
                    debug!("🔄 Retrying {} {} after {:?}: {}", self.service, operation, delay, error);
                    tokio::time::sleep(delay).await;
                }
                None => {
                    error!("❌ {} {} failed after retries: {}", self.service, operation, error);
                    metrics::record_request(self.service, false, started.elapsed());
                    return Err(error);
                }
            }
        }
    }

    fn status_error(&self, operation: &str, status: StatusCode, body: &str) -> AppError {
        let mut snippet: String = body.chars().take(MAX_ERROR_BODY).collect();
        if snippet.is_empty() {
            snippet = status.canonical_reason().unwrap_or("no body").to_string();
        }
        AppError::external(
            self.service,
            format!("{} returned {}: {}", operation, status.as_u16(), snippet),
            Some(status.as_u16()),
        )
    }
}

fn is_transient(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::{json, Value};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn http() -> ApiHttp {
        ApiHttp::new("test", 2_000, 2)
            .unwrap()
            .with_retry_window(Duration::from_millis(5), Duration::from_millis(500))
    }

    #[tokio::test]
    async fn test_retries_transient_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .mount(&server)
            .await;

        let client = http();
        let url = format!("{}/flaky", server.uri());
        let body: Value = client
            .execute("flaky", || {
                let request = client.client().get(&url);
                async move { Ok(request) }
            })
            .await
            .unwrap();

        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_client_error_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_string("nope"))
            .expect(1)
            .mount(&server)
            .await;

        let client = http();
        let url = format!("{}/missing", server.uri());
        let result: AppResult<Value> = client
            .execute("missing", || {
                let request = client.client().get(&url);
                async move { Ok(request) }
            })
            .await;

        assert_matches!(
            result,
            Err(AppError::ExternalService { status_code: Some(404), ref service, .. }) if service == "test"
        );
    }

    #[tokio::test]
    async fn test_invalid_json_is_external_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = http();
        let url = server.uri();
        let result: AppResult<Value> = client
            .execute("html", || {
                let request = client.client().get(&url);
                async move { Ok(request) }
            })
            .await;

        assert_matches!(result, Err(AppError::ExternalService { .. }));
    }
}
