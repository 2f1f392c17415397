//! In-memory table store
//!
//! Same row semantics as the Supabase backend: `id` and `created_at` are
//! assigned on insert when absent, upserts merge into the row sharing the
//! conflict columns, and queries filter, order and limit identically.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use super::{Query, TableStore};
use crate::core::error::AppError;
use crate::core::result::AppResult;

/// Table store kept in process memory
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<HashMap<String, Vec<Value>>>,
    unavailable: AtomicBool,
}

impl InMemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation fail as if the backend were unreachable
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of rows in a table
    pub fn row_count(&self, table: &str) -> usize {
        self.tables.read().get(table).map_or(0, Vec::len)
    }

    fn check_available(&self, table: &str, operation: &str) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::table(table, operation, "in-memory store marked unavailable"));
        }
        Ok(())
    }
}

fn as_object(table: &str, row: Value) -> AppResult<Map<String, Value>> {
    match row {
        Value::Object(map) => Ok(map),
        other => Err(AppError::table(table, "write", format!("row must be a JSON object, got {}", other))),
    }
}

fn stamp_new_row(row: &mut Map<String, Value>) {
    if row.get("id").map_or(true, Value::is_null) {
        row.insert("id".to_string(), Value::String(uuid::Uuid::new_v4().to_string()));
    }
    if row.get("created_at").map_or(true, Value::is_null) {
        row.insert("created_at".to_string(), Value::String(chrono::Utc::now().to_rfc3339()));
    }
}

fn merge_into(target: &mut Value, patch: &Map<String, Value>) {
    if let Value::Object(existing) = target {
        for (key, value) in patch {
            existing.insert(key.clone(), value.clone());
        }
    }
}

fn same_key(existing: &Value, row: &Map<String, Value>, on_conflict: &[&str]) -> bool {
    !on_conflict.is_empty()
        && on_conflict.iter().all(|column| match (existing.get(*column), row.get(*column)) {
            (Some(a), Some(b)) => a == b && !a.is_null(),
            _ => false,
        })
}

#[async_trait]
impl TableStore for InMemoryStore {
    async fn select(&self, table: &str, query: &Query) -> AppResult<Vec<Value>> {
        self.check_available(table, "select")?;
        let tables = self.tables.read();
        let mut rows: Vec<Value> = tables
            .get(table)
            .map(|rows| rows.iter().filter(|row| query.matches(row)).cloned().collect())
            .unwrap_or_default();
        query.apply_order_and_limit(&mut rows);
        Ok(rows)
    }

    async fn insert(&self, table: &str, rows: Vec<Value>) -> AppResult<Vec<Value>> {
        self.check_available(table, "insert")?;
        let mut stored = Vec::with_capacity(rows.len());
        for row in rows {
            let mut object = as_object(table, row)?;
            stamp_new_row(&mut object);
            stored.push(Value::Object(object));
        }

        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .extend(stored.iter().cloned());
        debug!("🧪 Inserted {} row(s) into {}", stored.len(), table);
        Ok(stored)
    }

    async fn upsert(&self, table: &str, rows: Vec<Value>, on_conflict: &[&str]) -> AppResult<Vec<Value>> {
        self.check_available(table, "upsert")?;
        let mut tables = self.tables.write();
        let existing = tables.entry(table.to_string()).or_default();
        let mut stored = Vec::with_capacity(rows.len());

        for row in rows {
            let mut object = as_object(table, row)?;
            match existing.iter_mut().find(|current| same_key(current, &object, on_conflict)) {
                Some(current) => {
                    // Drop a null id so the row keeps the one it was stored with
                    if object.get("id").map_or(false, Value::is_null) {
                        object.remove("id");
                    }
                    merge_into(current, &object);
                    stored.push(current.clone());
                }
                None => {
                    stamp_new_row(&mut object);
                    let value = Value::Object(object);
                    existing.push(value.clone());
                    stored.push(value);
                }
            }
        }

        Ok(stored)
    }

    async fn update(&self, table: &str, query: &Query, patch: Value) -> AppResult<Vec<Value>> {
        self.check_available(table, "update")?;
        let patch = as_object(table, patch)?;
        let mut tables = self.tables.write();
        let mut updated = Vec::new();

        if let Some(rows) = tables.get_mut(table) {
            for row in rows.iter_mut().filter(|row| query.matches(row)) {
                merge_into(row, &patch);
                updated.push(row.clone());
            }
        }

        Ok(updated)
    }

    async fn delete(&self, table: &str, query: &Query) -> AppResult<u64> {
        self.check_available(table, "delete")?;
        let mut tables = self.tables.write();
        let Some(rows) = tables.get_mut(table) else {
            return Ok(0);
        };

        let before = rows.len();
        rows.retain(|row| !query.matches(row));
        Ok((before - rows.len()) as u64)
    }

    async fn health_check(&self) -> AppResult<()> {
        self.check_available("*", "health_check")
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}
