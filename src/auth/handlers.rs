use actix_web::{web, HttpRequest, HttpResponse};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::auth::extractor::bearer_token;
use crate::auth::service::OAuthProvider;
use crate::db::UserProfile;
use crate::error::{AppError, AuthError};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

pub async fn login(
    req: web::Json<LoginRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received login request for email: {}", req.email);
    match state.auth_service.authenticate(&req.email, &req.password).await {
        Ok((token, user)) => {
            info!(user_id = %user.id, "Login successful");
            Ok(HttpResponse::Ok().json(AuthResponse { token, user: UserProfile::from(&user) }))
        }
        Err(e) => {
            error!("Login failed for email: {}: {}", req.email, e);
            Err(e)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

pub async fn register(
    req: web::Json<RegisterRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received registration request for email: {}", req.email);

    if let Err(e) = state
        .auth_service
        .register(&req.email, &req.password, req.display_name.as_deref())
        .await
    {
        error!("Registration failed for email: {}: {}", req.email, e);
        return Err(e);
    }

    let (token, user) = state.auth_service.authenticate(&req.email, &req.password).await?;
    Ok(HttpResponse::Created().json(AuthResponse { token, user: UserProfile::from(&user) }))
}

pub async fn logout(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let token = bearer_token(&req).ok_or(AuthError::MissingToken)?;

    state.auth_service.invalidate_token(&token).await?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "message": "Successfully logged out"
    })))
}

fn provider_from_path(provider: &str) -> Result<OAuthProvider, AppError> {
    OAuthProvider::parse(provider)
        .ok_or_else(|| AppError::NotFound(format!("OAuth provider '{}'", provider)))
}

pub async fn oauth_authorize(
    provider: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let provider = provider_from_path(&provider)?;
    let url = state.auth_service.authorize_url(provider)?;

    Ok(HttpResponse::Ok().json(serde_json::json!({
        "provider": provider.as_str(),
        "authorization_url": url,
    })))
}

#[derive(Debug, Deserialize)]
pub struct OAuthCallback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

pub async fn oauth_callback(
    provider: web::Path<String>,
    query: web::Query<OAuthCallback>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let provider = provider_from_path(&provider)?;

    if let Some(reason) = &query.error {
        info!(%provider, reason = %reason, "OAuth sign-in declined");
        return Err(AuthError::InvalidCredentials.into());
    }

    let (code, oauth_state) = match (&query.code, &query.state) {
        (Some(code), Some(oauth_state)) => (code, oauth_state),
        _ => return Err(AppError::ValidationError("Missing code or state".into())),
    };

    let (token, user) = state
        .auth_service
        .authenticate_oauth(provider, code, oauth_state)
        .await?;

    Ok(HttpResponse::Ok().json(AuthResponse { token, user: UserProfile::from(&user) }))
}
