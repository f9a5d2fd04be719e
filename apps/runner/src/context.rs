//! Wires the configured adapters into a sync orchestrator.

use std::sync::Arc;

use anyhow::Context;
use visitsync_analytics_client::AnalyticsApiClient;
use visitsync_core::config::SyncConfig;
use visitsync_core::sync::{SyncEngineSettings, SyncOrchestrator};
use visitsync_storage_sqlite::{
    create_pool, init, run_migrations, spawn_writer, SqlSessionSource, UserRepository,
    WatermarkRepository,
};

pub struct ServiceContext {
    pub config: SyncConfig,
    pub watermark_store: Arc<WatermarkRepository>,
    pub session_source: Arc<SqlSessionSource>,
    pub analytics_api: Arc<AnalyticsApiClient>,
    pub orchestrator: SyncOrchestrator,
}

impl ServiceContext {
    /// Opens (and migrates) the document store and builds the remaining
    /// adapters. The session source connects lazily.
    pub fn build(config: SyncConfig) -> anyhow::Result<Self> {
        let db_path = init(&config.store_database_url).context("preparing document store")?;
        run_migrations(&db_path).context("migrating document store")?;
        let pool = create_pool(&db_path).context("opening document store")?;
        let writer = spawn_writer(pool.as_ref().clone());

        let watermark_store = Arc::new(WatermarkRepository::new(pool.clone(), writer.clone()));
        let session_source = Arc::new(SqlSessionSource::new(config.source_database_url.clone()));
        let analytics_api = Arc::new(
            AnalyticsApiClient::new(
                &config.api_base_url,
                config.api_username.clone(),
                config.api_password.clone(),
            )
            .context("building analytics API client")?,
        );

        let orchestrator = SyncOrchestrator::new(
            SyncEngineSettings::from(&config),
            watermark_store.clone(),
            Arc::new(UserRepository::new(pool, writer)),
            session_source.clone(),
            analytics_api.clone(),
        );

        tracing::debug!(config = ?config, "service context ready");
        Ok(Self {
            config,
            watermark_store,
            session_source,
            analytics_api,
            orchestrator,
        })
    }
}
