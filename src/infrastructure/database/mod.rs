//! Table store abstraction over the Supabase schema
//!
//! Services talk to tables through [`TableStore`], which moves JSON rows and
//! understands the small filter language PostgREST exposes. [`SupabaseStore`]
//! is the production backend; [`InMemoryStore`] backs tests and offline runs.
//! [`Table`] adds typed (de)serialization on top for a single row type.

pub mod memory;
pub mod query;
pub mod supabase;

pub use memory::InMemoryStore;
pub use query::{Filter, Order, Query};
pub use supabase::SupabaseStore;

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::info;

use crate::config::AppConfig;
use crate::core::error::AppError;
use crate::core::result::{AppResult, ResultExt};
use crate::core::types::TableRow;

/// Row-level access to the dashboard tables
#[async_trait]
pub trait TableStore: Send + Sync + fmt::Debug {
    /// Rows matching the query
    async fn select(&self, table: &str, query: &Query) -> AppResult<Vec<Value>>;

    /// Insert rows, returning them as stored
    async fn insert(&self, table: &str, rows: Vec<Value>) -> AppResult<Vec<Value>>;

    /// Insert rows or merge them into existing rows with the same conflict key
    async fn upsert(&self, table: &str, rows: Vec<Value>, on_conflict: &[&str]) -> AppResult<Vec<Value>>;

    /// Apply a partial update to every matching row, returning the updated rows
    async fn update(&self, table: &str, query: &Query, patch: Value) -> AppResult<Vec<Value>>;

    /// Delete matching rows, returning how many were removed
    async fn delete(&self, table: &str, query: &Query) -> AppResult<u64>;

    /// Cheap round trip proving the backend is reachable
    async fn health_check(&self) -> AppResult<()>;

    /// Backend name for logs and health output
    fn backend(&self) -> &'static str;
}

/// Build the store selected by configuration
pub fn connect(config: &AppConfig) -> AppResult<Arc<dyn TableStore>> {
    if config.use_in_memory_store() {
        info!("🧪 Using in-memory table store");
        return Ok(Arc::new(InMemoryStore::new()));
    }

    info!("🗄️  Using Supabase table store at {}", config.supabase.url);
    Ok(Arc::new(SupabaseStore::new(&config.supabase)?))
}

/// Typed view of one table
pub struct Table<T> {
    store: Arc<dyn TableStore>,
    _row: PhantomData<fn() -> T>,
}

impl<T: TableRow> Table<T> {
    /// Wrap a store for row type `T`
    pub fn new(store: Arc<dyn TableStore>) -> Self {
        Self {
            store,
            _row: PhantomData,
        }
    }

    /// Rows matching the query
    pub async fn select(&self, query: &Query) -> AppResult<Vec<T>> {
        let rows = self.store.select(T::TABLE, query).await?;
        decode_rows(rows)
    }

    /// First row matching the query
    pub async fn first(&self, query: Query) -> AppResult<Option<T>> {
        let rows = self.select(&query.limit(1)).await?;
        Ok(rows.into_iter().next())
    }

    /// Insert a single row, returning it as stored
    pub async fn insert(&self, row: &T) -> AppResult<T> {
        let stored = self.store.insert(T::TABLE, vec![encode_row(row)?]).await?;
        decode_rows(stored)?
            .into_iter()
            .next()
            .ok_or_else(|| AppError::table(T::TABLE, "insert", "insert returned no rows"))
    }

    /// Upsert rows on the given conflict columns
    pub async fn upsert(&self, rows: &[T], on_conflict: &[&str]) -> AppResult<Vec<T>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let values = rows.iter().map(encode_row).collect::<AppResult<Vec<_>>>()?;
        let stored = self.store.upsert(T::TABLE, values, on_conflict).await?;
        decode_rows(stored)
    }

    /// Patch matching rows
    pub async fn update(&self, query: &Query, patch: Value) -> AppResult<Vec<T>> {
        let rows = self.store.update(T::TABLE, query, patch).await?;
        decode_rows(rows)
    }

    /// Delete matching rows
    pub async fn delete(&self, query: &Query) -> AppResult<u64> {
        self.store.delete(T::TABLE, query).await
    }
}

impl<T> Clone for Table<T> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            _row: PhantomData,
        }
    }
}

impl<T: TableRow> fmt::Debug for Table<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("table", &T::TABLE)
            .field("backend", &self.store.backend())
            .finish()
    }
}

fn encode_row<T: TableRow>(row: &T) -> AppResult<Value> {
    serde_json::to_value(row).map_db_err(T::TABLE, "encode")
}

fn decode_rows<T: TableRow>(rows: Vec<Value>) -> AppResult<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(row).map_db_err(T::TABLE, "decode"))
        .collect()
}
