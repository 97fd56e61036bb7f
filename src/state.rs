//! Application State
//!
//! Wires configuration, storage, telemetry and the orchestrator together for
//! the CLI.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use crate::models::settings::{AppConfig, SettingsUpdate};
use crate::services::analytics::{
    HttpCollector, LogCollector, NoopSink, TelemetryCollector, TelemetrySink, TelemetryTracker,
    TrackerConfig,
};
use crate::services::orchestrator::{AnalysisOrchestrator, HttpStepTransport, OrchestratorSettings};
use crate::services::session::{AuthTokenSource, KvAuthToken};
use crate::storage::{ConfigService, KeyValueStore, SnapshotStore, SqliteKvStore};
use crate::utils::error::{AppError, AppResult};
use crate::utils::paths::{config_path, database_path};

/// Where the state lives on disk.
#[derive(Debug, Clone)]
pub struct StatePaths {
    pub config: PathBuf,
    pub database: PathBuf,
}

impl StatePaths {
    /// `~/.sitewatch/config.json` and `~/.sitewatch/data.db`
    pub fn default_paths() -> AppResult<Self> {
        Ok(Self {
            config: config_path()?,
            database: database_path()?,
        })
    }
}

struct Services {
    config: ConfigService,
    kv: Arc<SqliteKvStore>,
    snapshots: Arc<SnapshotStore>,
    tracker: Option<Arc<TelemetryTracker>>,
    orchestrator: AnalysisOrchestrator,
}

/// Application state shared by CLI commands
pub struct AppState {
    services: Arc<RwLock<Option<Services>>>,
}

impl AppState {
    /// Create a new uninitialized app state
    pub fn new() -> Self {
        Self {
            services: Arc::new(RwLock::new(None)),
        }
    }

    /// Initialize all services from the given paths. Must run inside a tokio
    /// runtime. Calling it twice is a no-op.
    pub async fn initialize(&self, paths: StatePaths) -> AppResult<()> {
        let mut guard = self.services.write().await;
        if guard.is_some() {
            return Ok(());
        }

        let config = ConfigService::open(&paths.config)?;
        let app_config = config.get_config().clone();
        let kv = Arc::new(SqliteKvStore::open(&paths.database)?);
        let kv_dyn: Arc<dyn KeyValueStore> = kv.clone();
        let auth: Arc<dyn AuthTokenSource> =
            Arc::new(KvAuthToken::new(kv_dyn.clone(), app_config.auth_token_key.clone()));

        let snapshots = Arc::new(
            SnapshotStore::new(kv_dyn, auth.clone())
                .with_key(app_config.storage_key.clone())
                .with_ttl(Duration::from_secs(app_config.snapshot_ttl_secs)),
        );

        let tracker = build_tracker(&app_config)?;
        let telemetry: Arc<dyn TelemetrySink> = match &tracker {
            Some(tracker) => tracker.clone() as Arc<dyn TelemetrySink>,
            None => Arc::new(NoopSink),
        };

        let transport = Arc::new(HttpStepTransport::new(app_config.api_base_url.clone(), auth)?);
        let orchestrator = AnalysisOrchestrator::builder(transport)
            .settings(OrchestratorSettings::from(&app_config))
            .telemetry(telemetry)
            .persistence(snapshots.clone())
            .build();

        tracing::debug!(
            config = %paths.config.display(),
            database = %paths.database.display(),
            "application state initialized"
        );
        *guard = Some(Services {
            config,
            kv,
            snapshots,
            tracker,
            orchestrator,
        });
        Ok(())
    }

    pub async fn is_initialized(&self) -> bool {
        self.services.read().await.is_some()
    }

    pub async fn orchestrator(&self) -> AppResult<AnalysisOrchestrator> {
        self.with_services(|s| Ok(s.orchestrator.clone())).await
    }

    pub async fn snapshot_store(&self) -> AppResult<Arc<SnapshotStore>> {
        self.with_services(|s| Ok(s.snapshots.clone())).await
    }

    pub async fn get_config(&self) -> AppResult<AppConfig> {
        self.with_services(|s| Ok(s.config.get_config().clone())).await
    }

    /// Persist a settings update. Takes effect for the orchestrator on the
    /// next initialization.
    pub async fn update_config(&self, update: SettingsUpdate) -> AppResult<AppConfig> {
        let mut guard = self.services.write().await;
        match &mut *guard {
            Some(services) => services.config.update_config(update),
            None => Err(AppError::config("Config service not initialized")),
        }
    }

    /// Store the session token the way a login would.
    pub async fn set_auth_token(&self, token: &str) -> AppResult<()> {
        self.with_services(|s| s.kv.set(&s.config.get_config().auth_token_key, token))
            .await
    }

    /// Drop the session token. The persisted snapshot is wiped on next access.
    pub async fn clear_auth_token(&self) -> AppResult<()> {
        self.with_services(|s| s.kv.delete(&s.config.get_config().auth_token_key))
            .await
    }

    pub async fn is_database_healthy(&self) -> bool {
        self.with_services(|s| Ok(s.kv.is_healthy()))
            .await
            .unwrap_or(false)
    }

    pub async fn is_config_healthy(&self) -> bool {
        self.with_services(|s| Ok(s.config.is_healthy()))
            .await
            .unwrap_or(false)
    }

    /// Dispose the orchestrator and flush pending telemetry.
    pub async fn shutdown(&self) -> AppResult<()> {
        let tracker = {
            let guard = self.services.read().await;
            match &*guard {
                Some(services) => {
                    services.orchestrator.dispose();
                    services.tracker.clone()
                }
                None => return Ok(()),
            }
        };
        if let Some(tracker) = tracker {
            tracker.shutdown().await?;
        }
        Ok(())
    }

    async fn with_services<F, T>(&self, f: F) -> AppResult<T>
    where
        F: FnOnce(&Services) -> AppResult<T>,
    {
        let guard = self.services.read().await;
        match &*guard {
            Some(services) => f(services),
            None => Err(AppError::internal("Application state not initialized")),
        }
    }
}

fn build_tracker(config: &AppConfig) -> AppResult<Option<Arc<TelemetryTracker>>> {
    if !config.telemetry_enabled {
        return Ok(None);
    }
    let collector: Arc<dyn TelemetryCollector> = match &config.analytics_endpoint {
        Some(endpoint) => Arc::new(HttpCollector::new(endpoint.clone())?),
        None => Arc::new(LogCollector),
    };
    Ok(Some(Arc::new(TelemetryTracker::new(
        collector,
        TrackerConfig::default(),
    ))))
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
