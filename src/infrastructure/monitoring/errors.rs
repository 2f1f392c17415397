//! Error collector
//!
//! Central sink for failures the user should hear about. Each report is
//! logged, counted, kept in a bounded in-memory ring and, when enabled,
//! written to the `error_logs` table. Persisting is best effort: a failed
//! write is logged and never replaces the original error.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tracing::{error, warn};

use super::metrics;
use crate::core::error::{AppError, ErrorSeverity};
use crate::core::result::AppResult;
use crate::core::types::ErrorLogEntry;
use crate::infrastructure::database::{Query, Table, TableStore};

/// One reported error
#[derive(Debug, Clone, Serialize)]
pub struct CollectedError {
    pub message: String,
    pub component: String,
    pub severity: ErrorSeverity,
    pub user_id: Option<String>,
    pub metadata: HashMap<String, String>,
    pub reported_at: DateTime<Utc>,
}

/// Bounded error ring with optional persistence
#[derive(Debug)]
pub struct ErrorCollector {
    entries: Mutex<VecDeque<CollectedError>>,
    capacity: usize,
    error_logs: Option<Table<ErrorLogEntry>>,
}

impl ErrorCollector {
    /// Collector that only keeps errors in memory
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            error_logs: None,
        }
    }

    /// Collector that also writes every report to `error_logs`
    pub fn with_persistence(capacity: usize, store: Arc<dyn TableStore>) -> Self {
        Self {
            error_logs: Some(Table::new(store)),
            ..Self::new(capacity)
        }
    }

    /// Record an error raised in `component`
    pub async fn report(&self, err: &AppError, component: &str) -> CollectedError {
        let context = err.to_context(component);
        let entry = CollectedError {
            message: err.to_string(),
            component: component.to_string(),
            severity: context.severity,
            user_id: context.user_id,
            metadata: context.metadata,
            reported_at: context.timestamp,
        };

        match entry.severity {
            ErrorSeverity::Low => warn!(component, "⚠️  {}", entry.message),
            _ => error!(component, severity = entry.severity.as_str(), "❌ {}", entry.message),
        }
        metrics::record_error(component, err.kind(), entry.severity);

        {
            let mut entries = self.entries.lock();
            if entries.len() == self.capacity {
                entries.pop_front();
            }
            entries.push_back(entry.clone());
        }

        if let Some(table) = &self.error_logs {
            let row = ErrorLogEntry {
                id: None,
                user_id: entry.user_id.clone(),
                message: entry.message.clone(),
                component: entry.component.clone(),
                severity: entry.severity.as_str().to_string(),
                context: serde_json::to_value(&entry.metadata).unwrap_or_default(),
                created_at: entry.reported_at,
            };
            if let Err(persist_err) = table.insert(&row).await {
                warn!("⚠️  Failed to persist error log: {}", persist_err);
            }
        }

        entry
    }

    /// Report the error and hand it back, for use in `map_err` chains
    pub async fn capture(&self, err: AppError, component: &str) -> AppError {
        self.report(&err, component).await;
        err
    }

    /// Most recent `limit` errors, newest first
    pub fn recent(&self, limit: usize) -> Vec<CollectedError> {
        self.entries.lock().iter().rev().take(limit).cloned().collect()
    }

    /// Most recent `limit` rows of `error_logs`; empty when persistence is off
    pub async fn persisted(&self, limit: usize) -> AppResult<Vec<ErrorLogEntry>> {
        match &self.error_logs {
            Some(table) => {
                table
                    .select(&Query::new().order("created_at", true).limit(limit))
                    .await
            }
            None => Ok(Vec::new()),
        }
    }

    /// Number of buffered errors per severity
    pub fn count_by_severity(&self) -> HashMap<ErrorSeverity, usize> {
        let mut counts = HashMap::new();
        for entry in self.entries.lock().iter() {
            *counts.entry(entry.severity).or_insert(0) += 1;
        }
        counts
    }

    /// Drop all buffered errors
    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    /// Buffered error count
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// True when nothing has been reported since the last clear
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}
