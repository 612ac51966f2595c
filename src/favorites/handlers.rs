use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::AppState;

pub async fn list_favorites(
    auth: AuthenticatedUser,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let favorites = state.favorites.list(auth.user.id).await?;
    Ok(HttpResponse::Ok().json(json!({
        "count": favorites.len(),
        "favorites": favorites,
    })))
}

pub async fn add_favorite(
    auth: AuthenticatedUser,
    id: web::Path<i64>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let action = state.favorites.add(auth.user.id, id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "action": action })))
}

pub async fn remove_favorite(
    auth: AuthenticatedUser,
    id: web::Path<i64>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let action = state.favorites.remove(auth.user.id, id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(json!({ "action": action })))
}

#[derive(Debug, Deserialize)]
pub struct RateRequest {
    pub rating: i64,
    #[serde(default)]
    pub review: Option<String>,
}

pub async fn rate_template(
    auth: AuthenticatedUser,
    id: web::Path<i64>,
    body: web::Json<RateRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let outcome = state
        .favorites
        .rate(auth.user.id, id.into_inner(), body.rating, body.review.as_deref())
        .await?;
    Ok(HttpResponse::Ok().json(outcome))
}

pub async fn template_ratings(
    id: web::Path<i64>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let ratings = state.favorites.ratings(id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ratings))
}
