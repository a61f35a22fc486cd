use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::payments::ProcessorError;

/// User-facing error messages, shared by handlers and tests.
pub mod msg {
    pub const CART_EMPTY: &str = "Cart is empty";
    pub const CART_TOO_LARGE: &str = "Cart contains too many items";
    pub const INVALID_QUANTITY: &str = "Quantity must be between 1 and 10";
    pub const NAME_REQUIRED: &str = "Name is required";
    pub const EMAIL_REQUIRED: &str = "Email is required";
    pub const INVALID_EMAIL: &str = "Email address is invalid";
    pub const PHONE_REQUIRED: &str = "Phone is required";
    pub const SESSION_ID_REQUIRED: &str = "Session ID is required";

    pub const DUPLICATE_IN_PROGRESS: &str = "Request already in progress. Please wait.";
    pub const INVALID_SESSION: &str = "Invalid session";
    pub const VERIFICATION_FAILED: &str = "Verification failed";
    pub const CHECKOUT_FAILED: &str = "Failed to create checkout session";

    pub const MISSING_SIGNATURE: &str = "Missing signature";
    pub const INVALID_SIGNATURE: &str = "Invalid signature";
    pub const INVALID_PAYLOAD: &str = "Invalid payload";
    pub const WEBHOOK_HANDLER_FAILED: &str = "Webhook handler failed";

    pub const ORDER_FAILED: &str = "Failed to create order";
    pub const INVALID_ORDER_RESPONSE: &str = "Invalid order response";
    pub const CONNECTION_ERROR: &str = "Connection error";

    pub const INTERNAL: &str = "Internal server error";
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid category: {0}")]
    InvalidCategory(String),

    #[error("Invalid price configuration for {category} in {event_type} event")]
    InvalidPriceConfiguration { category: String, event_type: String },

    #[error("Duplicate checkout request in progress")]
    DuplicateInProgress,

    #[error("Invalid session")]
    InvalidSession,

    #[error("Payment processor error: {0}")]
    Processor(ProcessorError),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ProcessorError> for AppError {
    fn from(err: ProcessorError) -> Self {
        match err {
            ProcessorError::IdempotencyKeyInUse => AppError::DuplicateInProgress,
            ProcessorError::InvalidSession => AppError::InvalidSession,
            other => AppError::Processor(other),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl AppError {
    /// HTTP status and the message shown to the caller.
    ///
    /// Internal failures are logged here and replaced by a generic message so
    /// processor responses and SQL errors never reach the client.
    pub fn status_and_message(&self) -> (StatusCode, String) {
        match self {
            AppError::Validation(message) => (StatusCode::BAD_REQUEST, message.clone()),
            AppError::InvalidCategory(name) => {
                tracing::error!(category = %name, "Cart references unknown category");
                (StatusCode::BAD_REQUEST, format!("Invalid category: {}", name))
            }
            AppError::InvalidPriceConfiguration { .. } => {
                tracing::error!("{}", self);
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            AppError::DuplicateInProgress => {
                (StatusCode::CONFLICT, msg::DUPLICATE_IN_PROGRESS.to_string())
            }
            AppError::InvalidSession => (StatusCode::BAD_REQUEST, msg::INVALID_SESSION.to_string()),
            AppError::Processor(err) if err.is_signature_error() => {
                tracing::warn!("Processor signature error: {}", err);
                (StatusCode::BAD_REQUEST, msg::INVALID_SIGNATURE.to_string())
            }
            AppError::Processor(err) => {
                tracing::error!("Payment processor error: {}", err);
                (StatusCode::BAD_GATEWAY, msg::CHECKOUT_FAILED.to_string())
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, msg::INTERNAL.to_string())
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, msg::INTERNAL.to_string())
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, msg::INTERNAL.to_string())
            }
            AppError::Internal(message) => {
                tracing::error!("Internal error: {}", message);
                (StatusCode::INTERNAL_SERVER_ERROR, msg::INTERNAL.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error) = self.status_and_message();
        let body = ErrorResponse {
            error,
            details: None,
        };
        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
