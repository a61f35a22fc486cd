use axum::extract::State;
use serde::Deserialize;

use crate::checkout::{CartItem, CheckoutSession, CustomerContact, create_checkout_session, validate_cart};
use crate::db::AppState;
use crate::error::Result;
use crate::extractors::Json;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    #[serde(default)]
    pub cart: Vec<CartItem>,
    pub customer_info: CustomerContact,
}

/// `POST /api/create-checkout-session`
///
/// Re-prices the cart server-side and opens one processor session for it.
pub async fn create_checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutSession>> {
    let cart = validate_cart(&request.cart, &request.customer_info)?;

    let session = create_checkout_session(
        state.processor.as_ref(),
        &state.checkout,
        state.clock.as_ref(),
        &cart,
        &request.customer_info,
    )
    .await?;

    Ok(Json(session))
}
