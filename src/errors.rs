use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::ApiResponse;

/// Unified error type for the service layer.
///
/// Every business-rule failure is expressed as one of these variants; the
/// HTTP layer maps them onto a status code and the standard response
/// envelope in exactly one place (`status_code` / `IntoResponse`).
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Webhook signature error: {0}")]
    WebhookSignatureError(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(Uuid),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal server error")]
    InternalServerError,

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InvalidOperation(_) | Self::InvalidStatus(_) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::Unauthorized(_) | Self::WebhookSignatureError(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::ConcurrentModification(_) => StatusCode::CONFLICT,
            Self::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
            Self::DatabaseError(_)
            | Self::EventError(_)
            | Self::InternalServerError
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors collapse to a generic message so no store or network
    /// detail leaks to clients.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) | Self::EventError(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            Self::InternalServerError => "Internal server error".to_string(),
            Self::ConcurrentModification(id) => {
                format!("Concurrent modification for ID {}", id)
            }
            Self::ExternalServiceError(_) => "Payment provider error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ApiResponse::<serde_json::Value>::error(self.response_message());
        (status, Json(body)).into_response()
    }
}
