use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use chrono::Utc;
use dotenv::dotenv;
use pmblueprints_server::config::CorsConfig;
use pmblueprints_server::{configure, monitoring, AppError, AppState, Settings};
use std::net::TcpListener;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn cors(config: &CorsConfig) -> Cors {
    if !config.enabled {
        // CORS disabled - use most restrictive settings
        return Cors::default();
    }

    let cors = if config.allow_any_origin {
        Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .expose_any_header()
    } else {
        config
            .allowed_origins
            .iter()
            .fold(Cors::default(), |cors, origin| cors.allowed_origin(origin))
            .allowed_methods(vec!["GET", "POST", "DELETE"])
            .allowed_headers(vec!["Authorization", "Content-Type", "X-Admin-Token"])
            .supports_credentials()
    };

    cors.max_age(config.max_age as usize)
}

/// Runs the idempotent monthly usage reset and expired session cleanup on
/// a fixed interval.
fn spawn_maintenance(state: web::Data<AppState>, every: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;

            if let Err(e) = state.gate.reset_monthly_usage(Utc::now()).await {
                error!(error = %e, "Scheduled usage reset failed");
            }
            match state.auth_service.cleanup_sessions().await {
                Ok(0) => {}
                Ok(removed) => info!(removed, "Expired sessions removed"),
                Err(e) => error!(error = %e, "Session cleanup failed"),
            }
        }
    });
}

#[actix_web::main]
async fn main() -> pmblueprints_server::Result<()> {
    // Load environment variables
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    let config = Settings::new()?;
    info!(environment = %config.environment, "Configuration loaded successfully");

    let prometheus = if config.monitoring.metrics_enabled {
        monitoring::install_recorder()
    } else {
        None
    };

    let state = AppState::new(config.clone()).await?.with_metrics(prometheus);
    let state = web::Data::new(state);

    spawn_maintenance(state.clone(), Duration::from_secs(config.usage.reset_interval_secs.max(1)));

    let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))?;
    info!("Starting server at {}:{}", config.server.host, config.server.port);

    let app_state = state.clone();
    let cors_config = config.cors.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(middleware::from_fn(monitoring::track_requests))
            .wrap(cors(&cors_config))
            .app_data(app_state.clone())
            .configure(configure)
    })
    .listen(listener)?
    .workers(config.server.workers as usize)
    .run()
    .await
    .map_err(|e| AppError::InternalError(e.to_string()))?;

    state.shutdown().await?;
    info!("Server stopped");
    Ok(())
}
