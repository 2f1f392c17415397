//! Health monitoring service
//!
//! Periodically probes the table store, the Solana RPC endpoint and the
//! Helius key supply. Critical components failing make the system
//! unhealthy; anything else failing only degrades it.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use crate::core::result::utils::with_timeout;
use crate::infrastructure::database::TableStore;
use crate::services::{ChainRpc, HeliusKeyManager};

const DATABASE: &str = "database";
const PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const SOLANA_RPC: &str = "solana_rpc";
const HELIUS_KEYS: &str = "helius_keys";

/// Overall system health status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum HealthStatus {
    /// All components are healthy
    Healthy,
    /// Some non-critical components are unhealthy
    Degraded,
    /// Critical components are unhealthy
    Unhealthy,
    /// No check has completed yet
    Starting,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            HealthStatus::Healthy => "Healthy",
            HealthStatus::Degraded => "Degraded",
            HealthStatus::Unhealthy => "Unhealthy",
            HealthStatus::Starting => "Starting",
        };
        f.write_str(label)
    }
}

/// Health status of an individual component
#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub message: Option<String>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_check: DateTime<Utc>,
    pub consecutive_failures: u32,
    /// Whether this component failing makes the whole system unhealthy
    pub is_critical: bool,
    pub response_time_ms: Option<u64>,
}

impl ComponentHealth {
    pub fn new(name: &str, is_critical: bool) -> Self {
        Self {
            name: name.to_string(),
            status: HealthStatus::Starting,
            message: None,
            last_success: None,
            last_check: Utc::now(),
            consecutive_failures: 0,
            is_critical,
            response_time_ms: None,
        }
    }

    pub fn mark_healthy(&mut self, message: Option<String>, response_time_ms: Option<u64>) {
        self.status = HealthStatus::Healthy;
        self.message = message;
        self.last_success = Some(Utc::now());
        self.last_check = Utc::now();
        self.consecutive_failures = 0;
        self.response_time_ms = response_time_ms;
    }

    pub fn mark_unhealthy(&mut self, message: String) {
        self.status = HealthStatus::Unhealthy;
        self.message = Some(message);
        self.last_check = Utc::now();
        self.consecutive_failures += 1;
        self.response_time_ms = None;
    }

    pub fn mark_degraded(&mut self, message: String, response_time_ms: Option<u64>) {
        self.status = HealthStatus::Degraded;
        self.message = Some(message);
        self.last_check = Utc::now();
        self.response_time_ms = response_time_ms;
    }
}

/// Health monitoring service
pub struct HealthService {
    store: Arc<dyn TableStore>,
    rpc: Arc<dyn ChainRpc>,
    helius_keys: Arc<HeliusKeyManager>,
    components: RwLock<BTreeMap<String, ComponentHealth>>,
}

impl std::fmt::Debug for HealthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthService")
            .field("store", &self.store.backend())
            .finish()
    }
}

impl HealthService {
    pub fn new(store: Arc<dyn TableStore>, rpc: Arc<dyn ChainRpc>, helius_keys: Arc<HeliusKeyManager>) -> Self {
        let components = [
            ComponentHealth::new(DATABASE, true),
            ComponentHealth::new(SOLANA_RPC, true),
            ComponentHealth::new(HELIUS_KEYS, false),
        ]
        .into_iter()
        .map(|c| (c.name.clone(), c))
        .collect();

        Self {
            store,
            rpc,
            helius_keys,
            components: RwLock::new(components),
        }
    }

    /// Probe every component once and return the overall status
    pub async fn check_all(&self) -> HealthStatus {
        debug!("🔍 Performing health checks on all components");

        let started = Instant::now();
        let database = with_timeout(PROBE_TIMEOUT, "database health", self.store.health_check()).await;
        let database_ms = elapsed_ms(started);

        let started = Instant::now();
        let rpc = with_timeout(PROBE_TIMEOUT, "solana health", self.rpc.health()).await;
        let rpc_ms = elapsed_ms(started);

        let key_count = self.helius_keys.key_count().await;
        let has_key = self.helius_keys.has_key().await;

        {
            let mut components = self.components.write().await;

            if let Some(component) = components.get_mut(DATABASE) {
                match database {
                    Ok(()) => component.mark_healthy(Some(format!("{} store reachable", self.store.backend())), Some(database_ms)),
                    Err(e) => component.mark_unhealthy(e.to_string()),
                }
            }

            if let Some(component) = components.get_mut(SOLANA_RPC) {
                match rpc {
                    Ok(()) => component.mark_healthy(None, Some(rpc_ms)),
                    Err(e) => component.mark_unhealthy(e.to_string()),
                }
            }

            if let Some(component) = components.get_mut(HELIUS_KEYS) {
                if key_count > 0 {
                    component.mark_healthy(Some(format!("{} rotating key(s)", key_count)), None);
                } else if has_key {
                    component.mark_degraded("Using configured key only, no keys in api_keys_storage".to_string(), None);
                } else {
                    component.mark_unhealthy("No Helius API key available".to_string());
                }
            }
        }

        let overall = self.overall().await;
        match overall {
            HealthStatus::Healthy => debug!("✅ All systems healthy"),
            HealthStatus::Degraded => warn!("⚠️  System degraded - some components unhealthy"),
            HealthStatus::Unhealthy => error!("❌ System unhealthy - critical components failed"),
            HealthStatus::Starting => debug!("🔄 System starting up"),
        }
        overall
    }

    /// Overall status derived from the last check of each component
    pub async fn overall(&self) -> HealthStatus {
        let components = self.components.read().await;
        overall_status(components.values())
    }

    /// Snapshot of every component
    pub async fn components(&self) -> Vec<ComponentHealth> {
        self.components.read().await.values().cloned().collect()
    }

    /// Multi-line human readable summary
    pub async fn summary(&self) -> String {
        let components = self.components.read().await;
        let mut summary = format!("Overall Status: {}\n\nComponents:\n", overall_status(components.values()));

        for component in components.values() {
            let emoji = match component.status {
                HealthStatus::Healthy => "✅",
                HealthStatus::Degraded => "⚠️",
                HealthStatus::Unhealthy => "❌",
                HealthStatus::Starting => "🔄",
            };
            let critical = if component.is_critical { " (Critical)" } else { "" };
            summary.push_str(&format!("{} {}{}: {}", emoji, component.name, critical, component.status));
            if let Some(message) = &component.message {
                summary.push_str(&format!(" - {}", message));
            }
            if let Some(ms) = component.response_time_ms {
                summary.push_str(&format!(" ({}ms)", ms));
            }
            summary.push('\n');
        }
        summary
    }
}

fn overall_status<'a>(components: impl Iterator<Item = &'a ComponentHealth>) -> HealthStatus {
    let mut critical_failure = false;
    let mut degraded = false;
    let mut all_starting = true;

    for component in components {
        match component.status {
            HealthStatus::Unhealthy if component.is_critical => critical_failure = true,
            HealthStatus::Unhealthy | HealthStatus::Degraded => {
                degraded = true;
                all_starting = false;
            }
            HealthStatus::Healthy => all_starting = false,
            HealthStatus::Starting => {}
        }
    }

    if critical_failure {
        HealthStatus::Unhealthy
    } else if degraded {
        HealthStatus::Degraded
    } else if all_starting {
        HealthStatus::Starting
    } else {
        HealthStatus::Healthy
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
