use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use crate::checkout::verify_payment;
use crate::db::AppState;
use crate::error::{AppError, msg};
use crate::extractors::{Json, Query};

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(default)]
    pub session_id: Option<String>,
}

/// `GET /api/verify-session?session_id=`
///
/// Errors carry `verified: false` so the success page can render them directly.
pub async fn verify_session(
    State(state): State<AppState>,
    Query(query): Query<VerifyQuery>,
) -> Response {
    let session_id = query.session_id.unwrap_or_default();

    match verify_payment(state.processor.as_ref(), &session_id).await {
        Ok(verification) => Json(verification).into_response(),
        Err(e) => {
            let (status, error) = match &e {
                AppError::Validation(_) | AppError::InvalidSession => e.status_and_message(),
                AppError::Processor(_) => {
                    tracing::error!("Session verification failed: {}", e);
                    (StatusCode::BAD_GATEWAY, msg::VERIFICATION_FAILED.to_string())
                }
                _ => {
                    tracing::error!("Session verification failed: {}", e);
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        msg::VERIFICATION_FAILED.to_string(),
                    )
                }
            };
            (status, Json(json!({ "error": error, "verified": false }))).into_response()
        }
    }
}
