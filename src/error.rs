use thiserror::Error;
use actix_web::{ResponseError, HttpResponse, http::StatusCode};
use serde_json::json;

use crate::access::{Action, Tier};

/// Where users are sent when a tier or quota blocks them.
pub const UPGRADE_URL: &str = "/pricing";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Authentication error: {0}")]
    AuthError(#[from] AuthError),

    #[error("Access denied: {0}")]
    AccessError(#[from] AccessError),

    #[error("Upstream error: {0}")]
    UpstreamError(#[from] UpstreamError),

    #[error("Database error: {0}")]
    DatabaseError(#[from] DatabaseError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal server error: {0}")]
    InternalError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("{0} not found")]
    NotFound(String),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::DatabaseError(DatabaseError::NotFound),
            sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                AppError::DatabaseError(DatabaseError::Duplicate)
            }
            _ => AppError::DatabaseError(DatabaseError::QueryError(err.to_string())),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for AppError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        AppError::DatabaseError(DatabaseError::ConnectionError(err.to_string()))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(err.to_string())
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        match err.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                AppError::AuthError(AuthError::TokenExpired)
            }
            _ => AppError::AuthError(AuthError::InvalidToken),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::UpstreamError(UpstreamError::Timeout)
        } else {
            AppError::UpstreamError(UpstreamError::RequestFailed(err.to_string()))
        }
    }
}

impl From<uuid::Error> for AppError {
    fn from(_: uuid::Error) -> Self {
        AppError::AuthError(AuthError::InvalidToken)
    }
}

impl AppError {
    fn client_message(&self) -> String {
        match self {
            // Upstream details stay in the logs.
            AppError::UpstreamError(e) => e.public_message().to_string(),
            AppError::DatabaseError(DatabaseError::NotFound) => "Record not found".to_string(),
            AppError::DatabaseError(DatabaseError::Duplicate) => "Record already exists".to_string(),
            AppError::DatabaseError(DatabaseError::Conflict) => {
                "The record was modified concurrently, please retry".to_string()
            }
            AppError::DatabaseError(_) | AppError::ConfigError(_) | AppError::InternalError(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let mut error = json!({
            "status": status.as_u16(),
            "message": self.client_message(),
        });

        match self {
            AppError::AccessError(access) => {
                error["upgrade_required"] = json!(true);
                error["upgrade_url"] = json!(UPGRADE_URL);
                match access {
                    AccessError::QuotaExceeded { action, tier, used, limit } => {
                        error["action"] = json!(action);
                        error["tier"] = json!(tier);
                        error["used"] = json!(used);
                        error["limit"] = json!(limit);
                    }
                    AccessError::TierRequired { action, tier } => {
                        error["action"] = json!(action);
                        error["tier"] = json!(tier);
                    }
                }
            }
            AppError::UpstreamError(_) => {
                error["retryable"] = json!(true);
            }
            _ => {}
        }

        HttpResponse::build(status).json(json!({ "error": error }))
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::AuthError(e) => match e {
                AuthError::InvalidCredentials => StatusCode::UNAUTHORIZED,
                AuthError::MissingToken => StatusCode::UNAUTHORIZED,
                AuthError::TokenExpired => StatusCode::UNAUTHORIZED,
                AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
                AuthError::Unauthorized => StatusCode::FORBIDDEN,
            },
            AppError::AccessError(_) => StatusCode::FORBIDDEN,
            AppError::UpstreamError(UpstreamError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::UpstreamError(UpstreamError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
            AppError::UpstreamError(_) => StatusCode::BAD_GATEWAY,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::DatabaseError(DatabaseError::NotFound) => StatusCode::NOT_FOUND,
            AppError::DatabaseError(DatabaseError::Duplicate) => StatusCode::CONFLICT,
            AppError::DatabaseError(DatabaseError::Conflict) => StatusCode::CONFLICT,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("No authorization token provided")]
    MissingToken,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Unauthorized")]
    Unauthorized,
}

/// Tier and quota rejections. These are expected outcomes that the client
/// turns into an upgrade prompt.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("{action} limit reached on the {tier} plan ({used}/{limit})")]
    QuotaExceeded {
        action: Action,
        tier: Tier,
        used: i32,
        limit: i32,
    },

    #[error("{action} is not available on the {tier} plan")]
    TierRequired { action: Action, tier: Tier },
}

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limited by {0}")]
    RateLimited(String),

    #[error("{service} responded with status {status}")]
    BadStatus { service: String, status: u16 },

    #[error("Malformed model output during {stage}: {detail}")]
    MalformedOutput { stage: String, detail: String },

    #[error("{0} is not configured")]
    Unavailable(String),
}

impl UpstreamError {
    fn public_message(&self) -> &'static str {
        match self {
            UpstreamError::Unavailable(_) => "This service is currently unavailable. Please try again later.",
            UpstreamError::MalformedOutput { .. } => {
                "The AI service returned an unusable response. Please try again."
            }
            _ => "An upstream service failed. Please try again.",
        }
    }
}

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Query error: {0}")]
    QueryError(String),

    #[error("Record not found")]
    NotFound,

    #[error("Duplicate record")]
    Duplicate,

    #[error("Concurrent modification")]
    Conflict,
}
