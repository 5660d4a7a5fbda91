//! Error handling for the farm operations server
//!
//! Provides consistent JSON error responses

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use shared::DomainError;
use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Validation errors
    #[error("Validation error: {message}")]
    Validation { field: String, message: String },

    #[error("Conflict: {message}")]
    Conflict { resource: String, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    // Business logic errors
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Insufficient inventory: {0}")]
    InsufficientInventory(String),

    // Database errors
    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    // Internal errors
    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Internal server error")]
    InternalError(#[from] anyhow::Error),
}

impl AppError {
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        AppError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl From<DomainError> for AppError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::InsufficientStock { .. } => AppError::InsufficientInventory(err.to_string()),
            DomainError::InvalidQuantity { ref field, .. } | DomainError::Validation { ref field, .. } => {
                AppError::Validation {
                    field: field.clone(),
                    message: err.to_string(),
                }
            }
            DomainError::IncompatibleUnits { .. } => AppError::Validation {
                field: "unit".to_string(),
                message: err.to_string(),
            },
            DomainError::UnknownCode { kind, .. } => AppError::Validation {
                field: kind.replace(' ', "_"),
                message: err.to_string(),
            },
            DomainError::ChronologyViolation { later, .. } => AppError::Validation {
                field: later.to_string(),
                message: err.to_string(),
            },
            DomainError::InvalidStateTransition(message) => AppError::InvalidStateTransition(message),
            DomainError::FinalStage(_) => AppError::InvalidStateTransition(err.to_string()),
            DomainError::NonEmptyBatch { ref batch_number, .. } => AppError::Conflict {
                resource: batch_number.clone(),
                message: err.to_string(),
            },
        }
    }
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_detail) = match &self {
            AppError::Validation { field, message } => (
                StatusCode::BAD_REQUEST,
                ErrorDetail {
                    code: "VALIDATION_ERROR".to_string(),
                    message: message.clone(),
                    field: Some(field.clone()),
                },
            ),
            AppError::Conflict { resource, message } => (
                StatusCode::CONFLICT,
                ErrorDetail {
                    code: "CONFLICT".to_string(),
                    message: message.clone(),
                    field: Some(resource.clone()),
                },
            ),
            AppError::NotFound(resource) => (
                StatusCode::NOT_FOUND,
                ErrorDetail {
                    code: "NOT_FOUND".to_string(),
                    message: format!("{} not found", resource),
                    field: None,
                },
            ),
            AppError::InvalidStateTransition(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail {
                    code: "INVALID_STATE_TRANSITION".to_string(),
                    message: msg.clone(),
                    field: None,
                },
            ),
            AppError::InsufficientInventory(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                ErrorDetail {
                    code: "INSUFFICIENT_INVENTORY".to_string(),
                    message: msg.clone(),
                    field: None,
                },
            ),
            AppError::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "DATABASE_ERROR".to_string(),
                    message: "A database error occurred".to_string(),
                    field: None,
                },
            ),
            AppError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "INTERNAL_ERROR".to_string(),
                    message: msg.clone(),
                    field: None,
                },
            ),
            AppError::InternalError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorDetail {
                    code: "INTERNAL_ERROR".to_string(),
                    message: "An internal server error occurred".to_string(),
                    field: None,
                },
            ),
        };

        // Log the error for debugging
        tracing::error!("Error: {:?}", self);

        (status, Json(ErrorResponse { error: error_detail })).into_response()
    }
}

/// Result type alias for handlers
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn test_domain_errors_map_to_status() {
        let insufficient = AppError::from(DomainError::InsufficientStock {
            requested: Decimal::from(80),
            available: Decimal::from(70),
        });
        assert_eq!(insufficient.into_response().status(), StatusCode::UNPROCESSABLE_ENTITY);

        let chronology = AppError::from(DomainError::ChronologyViolation {
            earlier: "planting_at",
            later: "germination_at",
        });
        match &chronology {
            AppError::Validation { field, .. } => assert_eq!(field, "germination_at"),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(chronology.into_response().status(), StatusCode::BAD_REQUEST);

        let non_empty = AppError::from(DomainError::NonEmptyBatch {
            batch_number: "B-1".to_string(),
            quantity: Decimal::ONE,
            reserved: Decimal::ZERO,
        });
        assert_eq!(non_empty.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_not_found_message() {
        let err = AppError::NotFound("Crop".to_string());
        assert_eq!(err.to_string(), "Resource not found: Crop");
    }
}
