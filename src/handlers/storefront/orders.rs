use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::db::AppState;
use crate::extractors::Json;
use crate::orders::{CreateOrderInput, FailureKind};

/// `POST /api/orders`
///
/// Proxies a single-item order to the orders API. Business failures are 400,
/// an unreachable backend is 502.
pub async fn create_order(
    State(state): State<AppState>,
    Json(input): Json<CreateOrderInput>,
) -> Response {
    let result = state.orders.create_order(&input).await;

    let status = match result.failure {
        None => StatusCode::OK,
        Some(FailureKind::Business) => StatusCode::BAD_REQUEST,
        Some(FailureKind::Transport) => StatusCode::BAD_GATEWAY,
    };

    (status, Json(result)).into_response()
}
