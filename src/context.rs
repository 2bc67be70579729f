/// Application context and dependency injection
use crate::{
    config::ServerConfig,
    db,
    error::{VodSyncError, VodSyncResult},
    fflogs::{EncounterNameCache, FflogsApi, ReportClient, ReportSource},
    oauth::{self, TokenProviders},
    rate_limit::RateLimiter,
    reports::ReportService,
    store::{AuthStore, DocumentStore, SqliteDocumentStore},
    vod::VodClient,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Application context holding all shared services
#[derive(Clone)]
pub struct AppContext {
    pub config: Arc<ServerConfig>,
    pub db: SqlitePool,
    pub auth_store: AuthStore,
    pub report_client: ReportClient,
    pub reports: Arc<ReportService>,
    pub token_providers: Arc<TokenProviders>,
    pub vod_client: VodClient,
    pub rate_limiter: Arc<RateLimiter>,
    pub started_at: Instant,
}

impl AppContext {
    /// Create a new application context from configuration
    pub async fn new(config: ServerConfig) -> VodSyncResult<Self> {
        // Validate configuration
        config.validate()?;

        // Initialize document database
        let db_options = db::DatabaseOptions {
            max_connections: config.storage.max_connections,
            ..Default::default()
        };
        let db = db::create_pool(&config.storage.database, db_options).await?;
        db::run_migrations(&db).await?;
        db::test_connection(&db).await?;
        tracing::info!("Document database ready at {}", config.storage.database.display());

        let store: Arc<dyn DocumentStore> = Arc::new(SqliteDocumentStore::new(db.clone()));

        // One HTTP client shared by every remote integration
        let http_client = reqwest::Client::builder()
            .user_agent(concat!("vodsync/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(config.reports.http_timeout))
            .build()
            .map_err(|e| VodSyncError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        let source: Arc<dyn ReportSource> = Arc::new(FflogsApi::new(
            http_client.clone(),
            &config.fflogs.client_api_url,
            &config.fflogs.user_api_url,
        ));
        let token_providers = oauth::token_providers(&http_client, &config);

        Self::assemble(config, db, store, source, token_providers, http_client).await
    }

    /// Wire services around an existing store and report source
    pub(crate) async fn assemble(
        config: ServerConfig,
        db: SqlitePool,
        store: Arc<dyn DocumentStore>,
        source: Arc<dyn ReportSource>,
        token_providers: TokenProviders,
        http_client: reqwest::Client,
    ) -> VodSyncResult<Self> {
        let report_client = ReportClient::new(source);

        // Encounter names are loaded once and shared by every request
        let encounters = Arc::new(EncounterNameCache::get_or_init(store.clone(), report_client.clone()).await?);

        let reports = Arc::new(ReportService::new(
            store.clone(),
            report_client.clone(),
            encounters,
            config.reports.update_cadence,
        ));

        let vod_client = VodClient::new(http_client, config.twitch.clone(), config.youtube.clone());
        let rate_limiter = Arc::new(RateLimiter::new(&config.rate_limit));

        Ok(Self {
            config: Arc::new(config),
            db,
            auth_store: AuthStore::new(store),
            report_client,
            reports,
            token_providers: Arc::new(token_providers),
            vod_client,
            rate_limiter,
            started_at: Instant::now(),
        })
    }

    /// Get service URL
    pub fn service_url(&self) -> &str {
        &self.config.service.host_url
    }
}
