use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::ai::GeneratedDocument;
use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::integrations::Platform;
use crate::monitoring;
use crate::AppState;

fn platform(name: &str) -> Result<Platform, AppError> {
    Platform::parse(name).ok_or_else(|| AppError::NotFound(format!("Platform '{}'", name)))
}

pub async fn list(
    auth: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let platforms = state.integrations.status(auth.user.id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "available": auth.user.tier().capabilities().platform_integrations,
        "platforms": platforms,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ConnectRequest {
    pub access_token: String,
}

pub async fn connect(
    auth: AuthenticatedUser,
    path: web::Path<String>,
    body: web::Json<ConnectRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let platform = platform(&path)?;
    state.gate.require_integrations(&auth.user)?;

    state
        .integrations
        .connect(auth.user.id, platform, &body.access_token)
        .await?;
    Ok(HttpResponse::Ok().json(json!({ "platform": platform, "connected": true })))
}

/// Starts the consent flow for `platform` on behalf of the caller.
pub async fn authorize(
    auth: AuthenticatedUser,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let platform = platform(&path)?;
    state.gate.require_integrations(&auth.user)?;

    let url = state.platform_auth.authorize_url(auth.user.id, platform)?;
    Ok(HttpResponse::Ok().json(json!({
        "platform": platform,
        "authorization_url": url,
    })))
}

#[derive(Debug, Deserialize)]
pub struct PlatformCallback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

/// The platform redirects here after consent. The user comes from the
/// signed state, so no bearer token is expected.
pub async fn callback(
    path: web::Path<String>,
    query: web::Query<PlatformCallback>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let platform = platform(&path)?;

    if let Some(reason) = &query.error {
        info!(%platform, reason = %reason, "Platform authorization declined");
        return Err(AppError::ValidationError(format!(
            "{} authorization was declined",
            platform.display_name()
        )));
    }

    let (code, connect_state) = match (&query.code, &query.state) {
        (Some(code), Some(connect_state)) => (code, connect_state),
        _ => return Err(AppError::ValidationError("Missing code or state".into())),
    };

    let user = state.platform_auth.authorized_user(platform, connect_state).await?;
    state.gate.require_integrations(&user)?;

    let token = state.platform_auth.exchange_code(platform, code).await?;
    state.integrations.connect(user.id, platform, &token).await?;
    Ok(HttpResponse::Ok().json(json!({ "platform": platform, "connected": true })))
}

pub async fn disconnect(
    auth: AuthenticatedUser,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let platform = platform(&path)?;
    state.gate.require_integrations(&auth.user)?;

    state.integrations.disconnect(auth.user.id, platform).await?;
    Ok(HttpResponse::Ok().json(json!({ "platform": platform, "connected": false })))
}

#[derive(Debug, Deserialize)]
pub struct ExportRequest {
    pub document: GeneratedDocument,
}

pub async fn export(
    auth: AuthenticatedUser,
    path: web::Path<String>,
    body: web::Json<ExportRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let platform = platform(&path)?;
    state.gate.require_integrations(&auth.user)?;

    let result = state
        .integrations
        .export(auth.user.id, platform, &body.document)
        .await;
    monitoring::record_export(platform.as_str(), result.is_ok());

    Ok(HttpResponse::Ok().json(result?))
}
