use actix_web::{http::StatusCode, HttpResponse};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::errors::DomainError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,

    #[error("No order exists for merchant reference {0}")]
    OrderNotFound(Uuid),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Provider detail is logged where the failure happens, never returned.
    #[error("Payment could not be initiated. Please try again later.")]
    PaymentGateway,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<DomainError> for AppError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::OrderNotFound(id) => AppError::OrderNotFound(id),
            DomainError::InvalidInput(msg) => AppError::BadRequest(msg),
            e @ (DomainError::ReferenceMismatch { .. }
            | DomainError::TrackingHandleMismatch { .. }
            | DomainError::AlreadySubmitted { .. }) => AppError::Conflict(e.to_string()),
            DomainError::Gateway(_) => AppError::PaymentGateway,
            DomainError::Config(msg) | DomainError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

impl From<actix_web::error::BlockingError> for AppError {
    fn from(e: actix_web::error::BlockingError) -> Self {
        AppError::Internal(e.to_string())
    }
}

impl actix_web::ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound | AppError::OrderNotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::PaymentGateway => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            AppError::Internal(msg) => {
                log::error!("Internal error: {msg}");
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(serde_json::json!({ "error": message }))
    }
}
