//! Supabase table store over PostgREST
//!
//! Rows are read and written through `{url}/rest/v1/{table}` with the
//! project's anon key. Writes ask for `return=representation` so callers get
//! back the rows as stored (ids, defaults). Reads retry transient failures with
//! exponential backoff; writes are sent once.

use async_trait::async_trait;
use backoff::{backoff::Backoff, ExponentialBackoff};
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use super::{Query, TableStore};
use crate::config::models::SupabaseConfig;
use crate::core::error::AppError;
use crate::core::result::AppResult;

/// PostgREST error body
#[derive(Debug, Deserialize)]
struct PostgrestError {
    #[serde(default)]
    message: String,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    hint: Option<String>,
}

/// Supabase-backed table store
#[derive(Debug, Clone)]
pub struct SupabaseStore {
    http_client: Client,
    rest_url: String,
    anon_key: String,
    bearer_token: String,
    schema: String,
}

impl SupabaseStore {
    /// Create a store for the configured project
    pub fn new(config: &SupabaseConfig) -> AppResult<Self> {
        if config.url.is_empty() || config.anon_key.is_empty() {
            return Err(AppError::config("Supabase url and anon_key are required"));
        }

        let http_client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::network(format!("Failed to create HTTP client: {}", e)))?;

        info!("🗄️  Supabase store ready (schema {})", config.schema);

        Ok(Self {
            http_client,
            rest_url: format!("{}/rest/v1", config.url.trim_end_matches('/')),
            anon_key: config.anon_key.clone(),
            bearer_token: config.service_role_key.clone().unwrap_or_else(|| config.anon_key.clone()),
            schema: config.schema.clone(),
        })
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        let profile_header = if method == Method::GET { "Accept-Profile" } else { "Content-Profile" };
        self.http_client
            .request(method, format!("{}/{}", self.rest_url, table))
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.bearer_token)
            .header(profile_header, &self.schema)
    }

    /// Send a request built by `build`, retrying transport errors and 5xx/429 when `retry` is set
    async fn execute<F>(&self, table: &str, operation: &str, retry: bool, build: F) -> AppResult<Vec<Value>>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut backoff = ExponentialBackoff {
            max_elapsed_time: Some(Duration::from_secs(15)),
            ..ExponentialBackoff::default()
        };

        loop {
            let error = match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return parse_rows(table, operation, response).await;
                    }
                    let body = response.text().await.unwrap_or_default();
                    let error = postgrest_error(table, operation, status, &body);
                    if !(status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS) {
                        return Err(error);
                    }
                    error
                }
                Err(e) => AppError::from(e),
            };

            match backoff.next_backoff() {
                Some(delay) if retry => {
                    debug!("🔄 Retrying {} on {} after {:?}: {}", operation, table, delay, error);
                    tokio::time::sleep(delay).await;
                }
                _ => {
                    warn!("⚠️  Supabase {} on {} failed: {}", operation, table, error);
                    return Err(error);
                }
            }
        }
    }
}

async fn parse_rows(table: &str, operation: &str, response: reqwest::Response) -> AppResult<Vec<Value>> {
    let body = response.text().await.map_err(AppError::from)?;
    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    match serde_json::from_str::<Value>(&body) {
        Ok(Value::Array(rows)) => Ok(rows),
        Ok(Value::Null) => Ok(Vec::new()),
        Ok(row) => Ok(vec![row]),
        Err(e) => Err(AppError::table(table, operation, format!("Invalid PostgREST response: {}", e))),
    }
}

/// Union of the keys of every row, comma separated
///
/// PostgREST rejects a bulk write whose objects do not share one key set
/// unless `columns` names them; absent keys then take the column default.
fn column_list(rows: &[Value]) -> String {
    rows.iter()
        .filter_map(Value::as_object)
        .flat_map(|row| row.keys().map(String::as_str))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>()
        .join(",")
}

fn postgrest_error(table: &str, operation: &str, status: StatusCode, body: &str) -> AppError {
    let message = match serde_json::from_str::<PostgrestError>(body) {
        Ok(err) => {
            let mut message = format!("{} ({})", err.message, status.as_u16());
            if let Some(code) = err.code {
                message.push_str(&format!(" [{}]", code));
            }
            if let Some(hint) = err.hint {
                message.push_str(&format!(" hint: {}", hint));
            }
            message
        }
        Err(_) => format!("HTTP {}: {}", status.as_u16(), body),
    };

    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        AppError::external("supabase", format!("{} {}: {}", operation, table, message), Some(status.as_u16()))
    } else {
        AppError::table(table, operation, message)
    }
}

#[async_trait]
impl TableStore for SupabaseStore {
    #[instrument(skip(self, query))]
    async fn select(&self, table: &str, query: &Query) -> AppResult<Vec<Value>> {
        let params = query.to_postgrest_params();
        self.execute(table, "select", true, || {
            self.request(Method::GET, table).query(&[("select", "*")]).query(&params)
        })
        .await
    }

    #[instrument(skip(self, rows), fields(count = rows.len()))]
    async fn insert(&self, table: &str, rows: Vec<Value>) -> AppResult<Vec<Value>> {
        let columns = column_list(&rows);
        let body = Value::Array(rows);
        self.execute(table, "insert", false, || {
            self.request(Method::POST, table)
                .header("Prefer", "return=representation,missing=default")
                .query(&[("columns", columns.as_str())])
                .json(&body)
        })
        .await
    }

    #[instrument(skip(self, rows), fields(count = rows.len()))]
    async fn upsert(&self, table: &str, rows: Vec<Value>, on_conflict: &[&str]) -> AppResult<Vec<Value>> {
        let columns = column_list(&rows);
        let body = Value::Array(rows);
        let conflict = on_conflict.join(",");
        self.execute(table, "upsert", false, || {
            let mut request = self
                .request(Method::POST, table)
                .header("Prefer", "return=representation,resolution=merge-duplicates,missing=default")
                .query(&[("columns", columns.as_str())])
                .json(&body);
            if !conflict.is_empty() {
                request = request.query(&[("on_conflict", conflict.as_str())]);
            }
            request
        })
        .await
    }

    #[instrument(skip(self, query, patch))]
    async fn update(&self, table: &str, query: &Query, patch: Value) -> AppResult<Vec<Value>> {
        if query.filters.is_empty() {
            return Err(AppError::table(table, "update", "refusing to update without filters"));
        }
        let params = query.to_postgrest_params();
        self.execute(table, "update", false, || {
            self.request(Method::PATCH, table)
                .header("Prefer", "return=representation")
                .query(&params)
                .json(&patch)
        })
        .await
    }

    #[instrument(skip(self, query))]
    async fn delete(&self, table: &str, query: &Query) -> AppResult<u64> {
        if query.filters.is_empty() {
            return Err(AppError::table(table, "delete", "refusing to delete without filters"));
        }
        let params = query.to_postgrest_params();
        let rows = self
            .execute(table, "delete", false, || {
                self.request(Method::DELETE, table)
                    .header("Prefer", "return=representation")
                    .query(&params)
            })
            .await?;
        Ok(rows.len() as u64)
    }

    async fn health_check(&self) -> AppResult<()> {
        let response = self
            .http_client
            .get(format!("{}/", self.rest_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.bearer_token)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(AppError::external(
                "supabase",
                format!("health check returned {}", response.status()),
                Some(response.status().as_u16()),
            ))
        }
    }

    fn backend(&self) -> &'static str {
        "supabase"
    }
}
