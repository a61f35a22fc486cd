mod checkout;
mod orders;
mod verify;

pub use checkout::*;
pub use orders::*;
pub use verify::*;

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use serde::Serialize;

use crate::db::AppState;
use crate::rate_limit;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    site: String,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        site: state.site_name.clone(),
    })
}

/// Storefront API. `checkout_rpm` limits the two creation routes per IP; 0 disables it.
pub fn router(checkout_rpm: u32) -> Router<AppState> {
    let creation = Router::new()
        .route("/api/create-checkout-session", post(create_checkout))
        .route("/api/orders", post(create_order));

    let creation = match rate_limit::checkout_layer(checkout_rpm) {
        Some(layer) => creation.layer(layer),
        None => creation,
    };

    Router::new()
        .route("/health", get(health))
        .route("/api/verify-session", get(verify_session))
        .merge(creation)
}
