use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use tracing::{info, warn};

use crate::auth::AuthenticatedUser;
use crate::error::{AppError, AuthError};
use crate::AppState;

pub const ADMIN_TOKEN_HEADER: &str = "X-Admin-Token";

pub async fn user_usage(
    auth: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let summary = state.gate.usage_summary(&auth.user, Utc::now());
    Ok(HttpResponse::Ok().json(summary))
}

/// Runs the monthly usage reset on demand. Safe to repeat within a period.
pub async fn admin_reset_usage(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let expected = state.config.auth.admin_token.as_str();
    let supplied = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default();

    if expected.is_empty() || supplied != expected {
        warn!("Rejected admin usage reset request");
        return Err(AuthError::Unauthorized.into());
    }

    let report = state.gate.reset_monthly_usage(Utc::now()).await?;
    info!(reset = report.reset, "Usage reset triggered by admin");
    Ok(HttpResponse::Ok().json(report))
}
