use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    ExpiredToken,

    #[error("Signature verification failed: {0}")]
    SignatureVerification(String),

    #[error("Duplicate payment: {0}")]
    DuplicatePayment(String),

    #[error("{0} is not configured on the server")]
    NotConfigured(&'static str),

    #[error("Upstream provider error: {0}")]
    Upstream(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::Database(ref e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "An internal database error occurred".to_string(),
                )
            }
            ApiError::BadRequest(ref msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::NotFound(ref msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            ApiError::Unauthorized(ref msg) => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
            }
            ApiError::InvalidToken(ref msg) => {
                (StatusCode::UNAUTHORIZED, "INVALID_TOKEN", msg.clone())
            }
            ApiError::ExpiredToken => (
                StatusCode::UNAUTHORIZED,
                "EXPIRED_TOKEN",
                "Access token has expired".to_string(),
            ),
            ApiError::SignatureVerification(ref msg) => {
                (StatusCode::BAD_REQUEST, "INVALID_SIGNATURE", msg.clone())
            }
            ApiError::DuplicatePayment(ref msg) => {
                (StatusCode::CONFLICT, "DUPLICATE_PAYMENT", msg.clone())
            }
            ApiError::NotConfigured(provider) => {
                tracing::error!("Request hit unconfigured provider: {}", provider);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "PROVIDER_NOT_CONFIGURED",
                    format!("{} is not configured on the server", provider),
                )
            }
            ApiError::Upstream(ref msg) => {
                tracing::error!("Upstream provider error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "UPSTREAM_ERROR",
                    "Payment provider temporarily unavailable".to_string(),
                )
            }
            ApiError::RateLimitExceeded => (
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMIT_EXCEEDED",
                "Too many requests, please try again later".to_string(),
            ),
            ApiError::Internal(ref e) => {
                tracing::error!("Internal error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "success": false,
            "error": {
                "code": error_code,
                "message": message,
            }
        });

        (status, Json(body)).into_response()
    }
}

// Helper type for results
pub type Result<T> = std::result::Result<T, ApiError>;
