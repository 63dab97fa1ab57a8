//! Core service façade and bootstrap helpers.
//!
//! This crate wires a validated [`CoreConfig`] into a ready-to-use push
//! engine: it resolves the access token, builds the GitHub connector with its
//! rate-limit governor, and chooses how follow-up chunks get scheduled.
//! Desktop hosts typically enable the `desktop-shims` feature (which depends
//! on `bridge-desktop`) so chunks run on an in-process Tokio timer.
//!
//! ```ignore
//! use core_runtime::CoreConfig;
//! use core_service::PushSyncService;
//!
//! let config = CoreConfig::builder()
//!     .repository("acme", "site")
//!     .token_secret_key("github_token")
//!     .sync_root("/var/www/site")
//!     .sync_path("wp-content/plugins", true)
//!     .build()?;
//!
//! let service = PushSyncService::new(config).await?;
//! let report = service.start().await?;
//! ```

pub mod error;

pub use error::{CoreError, Result};

use bridge_traits::git::GitDataProvider;
use core_runtime::CoreConfig;
use core_sync::{
    ChunkOutcome, ExecutorChunkScheduler, SettingsStateStore, SyncOrchestrator, SyncReport,
};
use provider_github::{GitHubConfig, GitHubConnector, RateLimitGovernor, TtlCache};
use std::sync::Arc;
use tracing::info;

/// Build the GitHub connector described by `config`.
///
/// The token is resolved here, once, so a missing secret fails before any run
/// is started.
pub async fn github_connector(config: &CoreConfig) -> Result<GitHubConnector> {
    let token = config.resolve_token().await?;
    let cache = TtlCache::new(config.settings_store.clone(), config.clock.clone());
    let governor = RateLimitGovernor::new(
        cache.clone(),
        config.rate_limit_threshold,
        config.max_rate_limit_wait,
    );

    Ok(GitHubConnector::new(
        config.http_client.clone(),
        GitHubConfig {
            api_base_url: config.repository.api_base_url.clone(),
            owner: config.repository.owner.clone(),
            repo: config.repository.name.clone(),
            timeout: config.http_timeout,
            retry_policy: config.retry_policy.clone(),
        },
        token,
        cache,
        governor,
    ))
}

/// Primary façade exposed to host applications.
///
/// When the config carries a host `BackgroundExecutor`, chunks are scheduled
/// on it and the host must call [`PushSyncService::run_chunk`] whenever the
/// `core_sync::CHUNK_TASK_ID` task fires. Otherwise (with `desktop-shims`)
/// an in-process executor is created and wired to `run_chunk` directly.
#[derive(Clone)]
pub struct PushSyncService {
    orchestrator: Arc<SyncOrchestrator>,
}

impl PushSyncService {
    /// Create a service that pushes through the GitHub API.
    pub async fn new(config: CoreConfig) -> Result<Self> {
        let connector = github_connector(&config).await?;
        info!(
            repository = %config.repository.full_name(),
            branch = %config.repository.branch,
            "GitHub connector ready"
        );
        Self::with_provider(config, Arc::new(connector)).await
    }

    /// Create a service on top of any [`GitDataProvider`].
    pub async fn with_provider(
        config: CoreConfig,
        git: Arc<dyn GitDataProvider>,
    ) -> Result<Self> {
        let store = Arc::new(SettingsStateStore::new(config.settings_store.clone()));

        match config.background_executor.clone() {
            Some(executor) => {
                let scheduler = Arc::new(ExecutorChunkScheduler::new(executor));
                let orchestrator = SyncOrchestrator::new(&config, git, store, scheduler)?;
                Ok(Self {
                    orchestrator: Arc::new(orchestrator),
                })
            }
            None => Self::with_default_executor(&config, git, store).await,
        }
    }

    #[cfg(all(feature = "desktop-shims", not(target_arch = "wasm32")))]
    async fn with_default_executor(
        config: &CoreConfig,
        git: Arc<dyn GitDataProvider>,
        store: Arc<SettingsStateStore>,
    ) -> Result<Self> {
        use bridge_desktop::TokioBackgroundExecutor;
        use bridge_traits::error::BridgeError;
        use core_sync::CHUNK_TASK_ID;

        let executor = Arc::new(TokioBackgroundExecutor::new());
        let scheduler = Arc::new(ExecutorChunkScheduler::new(executor.clone()));
        let orchestrator = Arc::new(SyncOrchestrator::new(config, git, store, scheduler)?);

        // The executor is owned by the orchestrator, so the handler holds it weakly.
        let weak = Arc::downgrade(&orchestrator);
        executor
            .register_task_handler(CHUNK_TASK_ID, move || {
                let weak = weak.clone();
                async move {
                    let Some(orchestrator) = weak.upgrade() else {
                        return Ok(());
                    };
                    orchestrator
                        .run_chunk()
                        .await
                        .map(|_| ())
                        .map_err(|e| BridgeError::OperationFailed(e.to_string()))
                }
            })
            .await
            .map_err(|e| CoreError::InitializationFailed(e.to_string()))?;

        Ok(Self { orchestrator })
    }

    #[cfg(not(all(feature = "desktop-shims", not(target_arch = "wasm32"))))]
    async fn with_default_executor(
        _config: &CoreConfig,
        _git: Arc<dyn GitDataProvider>,
        _store: Arc<SettingsStateStore>,
    ) -> Result<Self> {
        Err(CoreError::CapabilityMissing {
            capability: "BackgroundExecutor".to_string(),
            message: "Provide one with CoreConfigBuilder::background_executor()".to_string(),
        })
    }

    /// Begin a new push run; see [`SyncOrchestrator::start`].
    pub async fn start(&self) -> Result<SyncReport> {
        Ok(self.orchestrator.start().await?)
    }

    /// Execute one chunk of the current run.
    pub async fn run_chunk(&self) -> Result<ChunkOutcome> {
        Ok(self.orchestrator.run_chunk().await?)
    }

    pub async fn status(&self) -> Result<Option<SyncReport>> {
        Ok(self.orchestrator.status().await?)
    }

    pub async fn cancel(&self) -> Result<bool> {
        Ok(self.orchestrator.cancel().await?)
    }

    /// Crash hook for hosts that can observe a dying worker.
    pub async fn record_fatal_error(&self, message: &str) -> Result<bool> {
        Ok(self.orchestrator.record_fatal_error(message).await?)
    }
}
