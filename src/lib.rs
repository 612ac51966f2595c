pub mod access;
pub mod ai;
pub mod auth;
pub mod billing;
pub mod catalog;
pub mod config;
pub mod db;
pub mod error;
pub mod favorites;
pub mod integrations;
pub mod monitoring;

use std::sync::Arc;
use std::time::Duration;
use actix_web::{web, HttpResponse};
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::warn;

pub use error::AppError;
pub type Result<T> = std::result::Result<T, AppError>;
pub use config::Settings;

pub use access::QuotaGate;
pub use ai::{DocumentGenerator, LanguageModel, OpenAiClient, SuggestionService};
pub use auth::AuthService;
pub use billing::{BillingService, StripeClient};
pub use catalog::CatalogService;
pub use favorites::FavoritesService;
pub use db::{
    CredentialStore, DbOperations, FavoriteStore, HealthCheck, PaymentStore, SessionStore,
    TemplateStore, User, UserSession, UserStore,
};
pub use integrations::{HttpExporter, IntegrationService, PlatformAuthorizer, PlatformExporter, TokenVault};

const DB_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything the services persist to. [`DbOperations`] is the production
/// implementation.
pub trait Store:
    UserStore
    + SessionStore
    + TemplateStore
    + PaymentStore
    + CredentialStore
    + FavoriteStore
    + HealthCheck
    + 'static
{
}

impl<T> Store for T where
    T: UserStore
        + SessionStore
        + TemplateStore
        + PaymentStore
        + CredentialStore
        + FavoriteStore
        + HealthCheck
        + 'static
{
}

/// Health check endpoint handler
/// Reports server status, timestamp and database reachability
pub async fn health_check(state: web::Data<AppState>) -> HttpResponse {
    let database = match state.health.ping().await {
        Ok(()) => "connected",
        Err(e) => {
            warn!(error = %e, "Health check could not reach the database");
            "unreachable"
        }
    };

    let body = serde_json::json!({
        "status": if database == "connected" { "healthy" } else { "degraded" },
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "database": database,
    });

    if database == "connected" {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

/// Application state shared across all workers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Settings>,
    pub auth_service: Arc<AuthService>,
    pub gate: Arc<QuotaGate>,
    pub catalog: Arc<CatalogService>,
    pub favorites: Arc<FavoritesService>,
    pub generator: Arc<DocumentGenerator>,
    pub suggestions: Arc<SuggestionService>,
    pub billing: Arc<BillingService>,
    pub integrations: Arc<IntegrationService>,
    pub platform_auth: Arc<PlatformAuthorizer>,
    pub health: Arc<dyn HealthCheck>,
    pub prometheus: Option<PrometheusHandle>,
    database: Option<Arc<DbOperations>>,
}

impl AppState {
    /// Connects to PostgreSQL, applies migrations and wires the services.
    pub async fn new(config: Settings) -> Result<Self> {
        let db = Arc::new(
            DbOperations::new_with_options(
                &config.database.url,
                config.database.max_connections,
                DB_ACQUIRE_TIMEOUT,
            )
            .await?,
        );
        db.run_migrations().await?;

        let model: Arc<dyn LanguageModel> = Arc::new(OpenAiClient::new(&config.ai)?);
        let mut state = Self::from_store(config, db.clone(), model)?;
        state.database = Some(db);
        Ok(state)
    }

    /// Wires the services over `store` with the HTTP platform exporter.
    pub fn from_store<S: Store>(
        config: Settings,
        store: Arc<S>,
        model: Arc<dyn LanguageModel>,
    ) -> Result<Self> {
        let exporter: Arc<dyn PlatformExporter> = Arc::new(HttpExporter::new(&config.integrations)?);
        Self::from_parts(config, store, model, exporter)
    }

    pub fn from_parts<S: Store>(
        config: Settings,
        store: Arc<S>,
        model: Arc<dyn LanguageModel>,
        exporter: Arc<dyn PlatformExporter>,
    ) -> Result<Self> {
        let auth_service = AuthService::new(store.clone(), store.clone(), &config.auth, config.oauth.clone())?;
        let gate = QuotaGate::new(store.clone());
        let catalog = CatalogService::new(store.clone(), config.catalog.files_dir.clone());
        let favorites = FavoritesService::new(store.clone(), store.clone());
        let billing = BillingService::new(
            store.clone(),
            store.clone(),
            StripeClient::new(&config.billing)?,
            config.billing.webhook_secret.clone(),
        );
        let integrations = IntegrationService::new(
            store.clone(),
            TokenVault::from_base64_key(&config.integrations.encryption_key)?,
            exporter,
        );
        let platform_auth = PlatformAuthorizer::new(
            store.clone(),
            config.integrations.oauth.clone(),
            &config.oauth,
            &config.auth.jwt_secret,
        )?;

        Ok(Self {
            config: Arc::new(config),
            auth_service: Arc::new(auth_service),
            gate: Arc::new(gate),
            catalog: Arc::new(catalog),
            favorites: Arc::new(favorites),
            generator: Arc::new(DocumentGenerator::new(model.clone())),
            suggestions: Arc::new(SuggestionService::new(model)),
            billing: Arc::new(billing),
            integrations: Arc::new(integrations),
            platform_auth: Arc::new(platform_auth),
            health: store,
            prometheus: None,
            database: None,
        })
    }

    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.prometheus = handle;
        self
    }

    pub async fn shutdown(&self) -> Result<()> {
        if let Some(db) = &self.database {
            db.close().await;
        }
        Ok(())
    }
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(1 << 20)
        .error_handler(|err, _| AppError::ValidationError(err.to_string()).into())
}

fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, _| AppError::ValidationError(err.to_string()).into())
}

fn path_config() -> web::PathConfig {
    web::PathConfig::default().error_handler(|err, _| AppError::ValidationError(err.to_string()).into())
}

/// Registers every route. Shared by `main` and the integration tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(json_config())
        .app_data(query_config())
        .app_data(path_config())
        .route("/health", web::get().to(health_check))
        .route("/metrics", web::get().to(monitoring::metrics_endpoint))
        .service(
            web::scope("/auth")
                .route("/register", web::post().to(auth::handlers::register))
                .route("/login", web::post().to(auth::handlers::login))
                .route("/logout", web::post().to(auth::handlers::logout))
                .route("/oauth/{provider}/authorize", web::get().to(auth::handlers::oauth_authorize))
                .route("/oauth/{provider}/callback", web::get().to(auth::handlers::oauth_callback)),
        )
        .service(
            web::scope("/api")
                .route("/templates", web::get().to(catalog::handlers::list_templates))
                .route("/templates/{id}", web::get().to(catalog::handlers::get_template))
                .route("/templates/{id}/download", web::get().to(catalog::handlers::download_template))
                .route("/industries", web::get().to(catalog::handlers::list_industries))
                .route("/categories", web::get().to(catalog::handlers::list_categories))
                .route("/search", web::get().to(catalog::handlers::quick_search))
                .route("/favorites", web::get().to(favorites::handlers::list_favorites))
                .route("/favorites/{id}", web::post().to(favorites::handlers::add_favorite))
                .route("/favorites/{id}", web::delete().to(favorites::handlers::remove_favorite))
                .route("/ratings/{id}", web::post().to(favorites::handlers::rate_template))
                .route("/ratings/{id}", web::get().to(favorites::handlers::template_ratings))
                .route("/user/usage", web::get().to(access::handlers::user_usage))
                .route("/ai/suggestions", web::post().to(ai::handlers::suggestions))
                .service(
                    web::scope("/ai-generator")
                        .route("/analyze", web::post().to(ai::handlers::analyze))
                        .route("/structure", web::post().to(ai::handlers::structure))
                        .route("/content", web::post().to(ai::handlers::content))
                        .route("/preview", web::post().to(ai::handlers::preview))
                        .route("/download", web::post().to(ai::handlers::download))
                        .route("/generate", web::post().to(ai::handlers::generate)),
                )
                .service(
                    web::scope("/payments")
                        .route("/plans", web::get().to(billing::handlers::plans))
                        .route("/subscribe", web::post().to(billing::handlers::subscribe))
                        .route("/cancel", web::post().to(billing::handlers::cancel))
                        .route("/history", web::get().to(billing::handlers::history))
                        .route("/webhook", web::post().to(billing::handlers::webhook)),
                )
                .route("/integrations", web::get().to(integrations::handlers::list))
                .route("/integrations/{platform}/connect", web::post().to(integrations::handlers::connect))
                .route("/integrations/{platform}/authorize", web::get().to(integrations::handlers::authorize))
                .route("/integrations/{platform}/callback", web::get().to(integrations::handlers::callback))
                .route("/integrations/{platform}/disconnect", web::post().to(integrations::handlers::disconnect))
                .route("/integrations/{platform}/export", web::post().to(integrations::handlers::export))
                .route("/admin/usage/reset", web::post().to(access::handlers::admin_reset_usage)),
        );
}
