use actix_web::{web, HttpRequest, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::access::Tier;
use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::AppState;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

pub async fn plans(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({ "plans": state.billing.plans() }))
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub tier: String,
}

pub async fn subscribe(
    auth: AuthenticatedUser,
    body: web::Json<SubscribeRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let tier = Tier::parse(&body.tier)
        .ok_or_else(|| AppError::ValidationError(format!("Unknown plan: {}", body.tier)))?;

    let session = state.billing.subscribe(&auth.user, tier).await?;
    Ok(HttpResponse::Ok().json(json!({
        "session_id": session.id,
        "checkout_url": session.url,
    })))
}

pub async fn cancel(
    auth: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state.billing.cancel(&auth.user).await?;
    Ok(HttpResponse::Ok().json(json!({
        "status": "cancelled",
        "tier": auth.user.tier(),
    })))
}

pub async fn history(
    auth: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let payments = state.billing.history(auth.user.id).await?;
    Ok(HttpResponse::Ok().json(json!({ "payments": payments })))
}

/// Stripe event receiver. Needs the raw body for signature verification.
pub async fn webhook(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let signature = req
        .headers()
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state
        .billing
        .handle_webhook(&body, signature, chrono::Utc::now().timestamp())
        .await?;

    info!(event_type = %outcome.event_type, handled = outcome.handled, "Webhook processed");
    Ok(HttpResponse::Ok().json(json!({ "received": true, "handled": outcome.handled })))
}
