use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::models::CheckoutField;
use crate::services::state_machine::GuardViolation;
use crate::services::stock::UnavailableItem;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Bad Request",
    "message": "Please enter a valid email address",
    "field": "email",
    "details": null,
    "request_id": "req-abc123xyz",
    "timestamp": "2025-03-01T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Form field the storefront should focus, for field validation errors
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<CheckoutField>,
    /// Structured details (unavailable items, violated guard)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// RFC 3339 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("{message}")]
    FieldValidation {
        field: CheckoutField,
        message: String,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Some items are no longer available in the requested quantity")]
    StockUnavailable(Vec<UnavailableItem>),

    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    #[error("{0}")]
    GuardViolation(#[from] GuardViolation),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("External service error: {0}")]
    ExternalServiceError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    pub fn field(field: CheckoutField, message: impl Into<String>) -> Self {
        ServiceError::FieldValidation {
            field,
            message: message.into(),
        }
    }

    /// Returns the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::FieldValidation { .. } | Self::ValidationError(_) | Self::InvalidOperation(_) => {
                StatusCode::BAD_REQUEST
            }
            Self::StockUnavailable(_) | Self::GuardViolation(_) | Self::Conflict(_) => {
                StatusCode::CONFLICT
            }
            Self::PaymentFailed(_) => StatusCode::PAYMENT_REQUIRED,
            Self::ExternalServiceError(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) | Self::Other(_) => "Internal server error".to_string(),
            Self::PaymentFailed(msg) => format!(
                "Payment failed: {}. Please try again with a new card authorization.",
                msg
            ),
            _ => self.to_string(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::StockUnavailable(items) => Some(json!({ "unavailable": items })),
            Self::GuardViolation(violation) => serde_json::to_value(violation).ok(),
            Self::PaymentFailed(_) => Some(json!({ "retry_with_new_token": true })),
            _ => None,
        }
    }

    /// Stock and payment errors can be retried by the shopper.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::StockUnavailable(_) | Self::PaymentFailed(_))
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }

        let field = match &self {
            Self::FieldValidation { field, .. } => Some(*field),
            _ => None,
        };

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            field,
            details: self.details(),
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}
