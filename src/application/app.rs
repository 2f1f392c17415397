//! Main application structure and lifecycle management
//!
//! `Application` owns the configuration and the service container. `run`
//! drives the background work (Helius key refresh and health checks) until
//! the cancellation token fires, then shuts the services down.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

use super::health::{HealthService, HealthStatus};
use crate::config::{AppConfig, ConfigValidator};
use crate::core::result::AppResult;
use crate::services::ServiceContainer;

/// Main application state and coordinator
#[derive(Debug)]
pub struct Application {
    config: Arc<AppConfig>,
    services: ServiceContainer,
    health: Arc<HealthService>,
    state: Arc<RwLock<ApplicationState>>,
}

/// Application runtime state
#[derive(Debug, Clone)]
pub struct ApplicationState {
    pub is_running: bool,
    pub is_shutting_down: bool,
    pub started_at: chrono::DateTime<chrono::Utc>,
    pub last_health_check: Option<chrono::DateTime<chrono::Utc>>,
    pub health_status: HealthStatus,
}

impl Default for ApplicationState {
    fn default() -> Self {
        Self {
            is_running: false,
            is_shutting_down: false,
            started_at: chrono::Utc::now(),
            last_health_check: None,
            health_status: HealthStatus::Starting,
        }
    }
}

impl Application {
    /// Validate the configuration and wire every service
    #[instrument(skip(config))]
    pub async fn build(config: AppConfig) -> AppResult<Self> {
        info!("🏗️  Building application instance");

        let validation = ConfigValidator::new().validate(&config).into_result()?;
        for warning in &validation.warnings {
            warn!("⚠️  Configuration warning: {}", warning);
        }

        let services = ServiceContainer::initialize(&config).await?;
        let health = Arc::new(HealthService::new(
            services.store.clone(),
            services.rpc.clone(),
            services.helius_keys.clone(),
        ));

        info!("✅ Application instance built successfully");
        Ok(Self {
            config: Arc::new(config),
            services,
            health,
            state: Arc::new(RwLock::new(ApplicationState::default())),
        })
    }

    /// Run background tasks until `cancel` fires
    #[instrument(skip(self, cancel))]
    pub async fn run(&self, cancel: CancellationToken) -> AppResult<()> {
        info!("🚀 Starting dashboard backend in {} mode", self.config.environment());

        {
            let mut state = self.state.write().await;
            state.is_running = true;
            state.started_at = chrono::Utc::now();
        }

        match self.services.helius_keys.refresh().await {
            Ok(count) => info!("🔑 {} Helius key(s) loaded", count),
            Err(e) => {
                self.services.errors.report(&e, "helius.keys").await;
            }
        }
        self.perform_health_check().await;

        let refresh_task = self.services.helius_keys.spawn_refresh_task(cancel.child_token());
        let interval = Duration::from_secs(self.config.monitoring.health_check_interval_seconds.max(1));
        let health_task = self.spawn_health_loop(interval, cancel.child_token());

        info!("✅ Background tasks started");
        cancel.cancelled().await;
        info!("🔌 Shutdown requested");

        for (name, task) in [("key refresh", refresh_task), ("health", health_task)] {
            if let Err(e) = task.await {
                error!("❌ {} task failed: {}", name, e);
            }
        }

        self.shutdown().await?;
        info!("👋 Dashboard backend stopped");
        Ok(())
    }

    fn spawn_health_loop(&self, interval: Duration, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let health = self.health.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // the first tick fires immediately and run() has just checked
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let status = health.check_all().await;
                        let mut state = state.write().await;
                        state.last_health_check = Some(chrono::Utc::now());
                        state.health_status = status;
                    }
                }
            }
        })
    }

    async fn perform_health_check(&self) -> HealthStatus {
        let status = self.health.check_all().await;
        let mut state = self.state.write().await;
        state.last_health_check = Some(chrono::Utc::now());
        state.health_status = status;
        status
    }

    /// Initiate graceful shutdown
    #[instrument(skip(self))]
    pub async fn shutdown(&self) -> AppResult<()> {
        info!("🛑 Initiating graceful shutdown");
        {
            let mut state = self.state.write().await;
            state.is_shutting_down = true;
            state.is_running = false;
        }

        self.services.shutdown().await?;
        info!("✅ Graceful shutdown completed");
        Ok(())
    }

    pub fn services(&self) -> &ServiceContainer {
        &self.services
    }

    pub fn health(&self) -> &Arc<HealthService> {
        &self.health
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub async fn state(&self) -> ApplicationState {
        self.state.read().await.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn offline_config(dir: &TempDir) -> AppConfig {
        let mut config = AppConfig::default();
        config.environment.offline = true;
        config.storage.data_dir = dir.path().to_string_lossy().to_string();
        config
    }

    #[tokio::test]
    async fn test_application_build() {
        let dir = TempDir::new().unwrap();
        let app = Application::build(offline_config(&dir)).await.unwrap();

        let state = app.state().await;
        assert!(!state.is_running);
        assert!(!state.is_shutting_down);
        assert_eq!(state.health_status, HealthStatus::Starting);
        assert_eq!(app.services().store.backend(), "memory");
    }

    #[tokio::test]
    async fn test_application_shutdown() {
        let dir = TempDir::new().unwrap();
        let app = Application::build(offline_config(&dir)).await.unwrap();

        app.shutdown().await.unwrap();
        let state = app.state().await;
        assert!(state.is_shutting_down);
        assert!(!state.is_running);
        assert!(app.services().vault.is_locked());
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let dir = TempDir::new().unwrap();
        let mut config = offline_config(&dir);
        // unreachable endpoint; the health check fails fast and run must still stop
        config.solana.rpc_url = "http://127.0.0.1:9".to_string();
        config.solana.request_timeout_ms = 200;
        let app = Arc::new(Application::build(config).await.unwrap());

        let cancel = CancellationToken::new();
        let runner = {
            let app = app.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { app.run(cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(30), runner)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert!(app.state().await.is_shutting_down);
    }
}
