pub mod storefront;
pub mod webhooks;

use axum::Router;

use crate::db::AppState;

/// All routes. Tracing and state are added by the caller.
pub fn router(checkout_rpm: u32) -> Router<AppState> {
    Router::new()
        .merge(storefront::router(checkout_rpm))
        .merge(webhooks::router())
}
