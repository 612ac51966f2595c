use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::access::Action;
use crate::ai::pipeline::{Analysis, DocumentStructure, GeneratedDocument, GenerationRequest};
use crate::ai::render;
use crate::ai::suggestions::SuggestionRequest;
use crate::auth::AuthenticatedUser;
use crate::error::AppError;
use crate::monitoring;
use crate::AppState;

pub async fn suggestions(
    auth: AuthenticatedUser,
    body: web::Json<SuggestionRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state.gate.check(&auth.user, Action::AiSuggestion)?;

    let suggestions = state.suggestions.suggest(&body).await?;
    let usage = state.gate.consume(auth.user.id, Action::AiSuggestion).await?;
    monitoring::record_ai_suggestion();

    Ok(HttpResponse::Ok().json(json!({
        "suggestions": suggestions,
        "usage": usage,
    })))
}

pub async fn analyze(
    auth: AuthenticatedUser,
    body: web::Json<GenerationRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state.gate.check(&auth.user, Action::AiGeneration)?;

    let analysis = state.generator.analyze(&body).await?;
    let format = analysis.resolved_format(&body);
    Ok(HttpResponse::Ok().json(json!({ "analysis": analysis, "format": format })))
}

#[derive(Debug, Deserialize)]
pub struct StructureRequest {
    #[serde(flatten)]
    pub request: GenerationRequest,
    pub analysis: Analysis,
}

pub async fn structure(
    auth: AuthenticatedUser,
    body: web::Json<StructureRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state.gate.check(&auth.user, Action::AiGeneration)?;
    body.request.validate()?;

    let structure = state.generator.structure(&body.request, &body.analysis).await?;
    Ok(HttpResponse::Ok().json(json!({ "structure": structure })))
}

#[derive(Debug, Deserialize)]
pub struct ContentRequest {
    #[serde(flatten)]
    pub request: GenerationRequest,
    pub analysis: Analysis,
    pub structure: DocumentStructure,
}

/// Final model stage of the step-by-step flow; charges one generation.
pub async fn content(
    auth: AuthenticatedUser,
    body: web::Json<ContentRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state.gate.check(&auth.user, Action::AiGeneration)?;
    body.request.validate()?;
    if body.structure.headings.is_empty() {
        return Err(AppError::ValidationError("Structure has no headings".into()));
    }

    let ContentRequest { request, analysis, structure } = body.into_inner();
    let content = state.generator.content(&request, &analysis, &structure).await?;
    let document = state.generator.assemble(&request, analysis, structure, content);

    let usage = state.gate.consume(auth.user.id, Action::AiGeneration).await?;
    monitoring::record_ai_generation(document.format.as_str());

    Ok(HttpResponse::Ok().json(json!({
        "preview": document.preview_markdown(),
        "document": document,
        "usage": usage,
    })))
}

pub async fn preview(
    auth: AuthenticatedUser,
    body: web::Json<GeneratedDocument>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state.gate.require_capability(&auth.user, Action::AiGeneration)?;

    Ok(HttpResponse::Ok().json(json!({
        "preview": body.preview_markdown(),
        "editable": true,
    })))
}

/// Renders a confirmed document into its binary format.
pub async fn download(
    auth: AuthenticatedUser,
    body: web::Json<GeneratedDocument>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state.gate.require_capability(&auth.user, Action::AiGeneration)?;

    let file = render::render(&body)?;
    info!(user_id = %auth.user.id, filename = %file.filename, bytes = file.bytes.len(), "Generated document rendered");

    Ok(HttpResponse::Ok()
        .content_type(file.content_type)
        .insert_header(ContentDisposition {
            disposition: DispositionType::Attachment,
            parameters: vec![DispositionParam::Filename(file.filename)],
        })
        .body(file.bytes))
}

/// Runs the whole pipeline in one request.
pub async fn generate(
    auth: AuthenticatedUser,
    body: web::Json<GenerationRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    state.gate.check(&auth.user, Action::AiGeneration)?;

    let document = state.generator.run(&body).await?;
    let usage = state.gate.consume(auth.user.id, Action::AiGeneration).await?;
    monitoring::record_ai_generation(document.format.as_str());

    Ok(HttpResponse::Ok().json(json!({
        "preview": document.preview_markdown(),
        "document": document,
        "usage": usage,
    })))
}
