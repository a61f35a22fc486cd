use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::db::AppState;
use crate::error::{AppError, msg};
use crate::outbox::spawn_delivery;

use super::common::{FulfillmentContext, WebhookOutcome, record_and_dispatch, verify_delivery};

fn received() -> Response {
    (StatusCode::OK, Json(json!({ "received": true }))).into_response()
}

/// `POST /api/webhooks/stripe`
///
/// Answers 200 once the event is durably recorded. Notification delivery
/// happens afterwards and never changes the response.
pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok());

    let event = match verify_delivery(state.processor.as_ref(), signature, &body) {
        Ok(event) => event,
        Err((status, error)) => return (status, Json(json!({ "error": error }))).into_response(),
    };

    let ctx = FulfillmentContext {
        site_name: &state.site_name,
    };
    let outcome = state
        .db
        .get()
        .map_err(AppError::from)
        .and_then(|mut conn| {
            record_and_dispatch(&mut conn, state.processor.provider(), &event, &ctx)
        });

    match outcome {
        Ok(WebhookOutcome::Duplicate) => received(),
        Ok(WebhookOutcome::Handled { queued, .. }) => {
            if queued > 0 {
                spawn_delivery(&state, event.id);
            }
            received()
        }
        Err(e) => {
            tracing::error!(
                event_id = %event.id,
                event_type = %event.event_type,
                "Webhook handler failed: {}",
                e
            );
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": msg::WEBHOOK_HANDLER_FAILED })),
            )
                .into_response()
        }
    }
}
