use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use std::path::Path;
use tracing::{info, warn};

use crate::access::Action;
use crate::auth::AuthenticatedUser;
use crate::catalog::query::{Page, TemplateFilter};
use crate::error::AppError;
use crate::monitoring;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub industry: Option<String>,
    pub category: Option<String>,
    pub search: Option<String>,
    pub page: Option<i64>,
    pub per_page: Option<i64>,
}

pub async fn list_templates(
    params: web::Query<ListParams>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let params = params.into_inner();
    let filter = TemplateFilter {
        industry: params.industry,
        category: params.category,
        search: params.search,
    };
    let page = Page::new(params.page, params.per_page);

    let result = state.catalog.browse(&filter, page).await?;
    Ok(HttpResponse::Ok().json(result))
}

pub async fn get_template(
    id: web::Path<i64>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let detail = state.catalog.detail(id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(detail))
}

/// Streams a template file after the download quota has been charged.
pub async fn download_template(
    auth: AuthenticatedUser,
    id: web::Path<i64>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let template = state.catalog.template(id.into_inner()).await?;
    let user = &auth.user;

    state.gate.check(user, Action::Download)?;
    let bytes = state.catalog.read_file(&template).await?;
    let usage = state.gate.consume(user.id, Action::Download).await?;

    if let Err(e) = state.catalog.record_download(user.id, template.id).await {
        warn!(user_id = %user.id, template_id = template.id, error = %e, "Failed to record download");
    }
    monitoring::record_download(&template.industry, &template.file_format);
    info!(
        user_id = %user.id,
        template_id = template.id,
        downloads_this_month = usage.downloads,
        "Template downloaded"
    );

    let filename = Path::new(&template.file_path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("template")
        .to_string();

    Ok(HttpResponse::Ok()
        .content_type(template.content_type())
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(filename)],
        })
        .body(bytes))
}

pub async fn list_industries(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let industries = state.catalog.industries().await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "industries": industries })))
}

pub async fn list_categories(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let categories = state.catalog.categories().await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "categories": categories })))
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
}

pub async fn quick_search(
    params: web::Query<SearchParams>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let term = params.q.as_deref().unwrap_or_default();
    let templates = state.catalog.quick_search(term).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "query": term.trim(),
        "count": templates.len(),
        "templates": templates,
    })))
}
