//! Per-IP rate limiting for order and checkout creation.
//!
//! Each accepted request on those routes costs a processor or orders API
//! call, so they get a strict budget. Configure with `RATE_LIMIT_CHECKOUT_RPM`.

use std::sync::Arc;
use std::time::Duration;
use tower_governor::GovernorLayer;
use tower_governor::governor::GovernorConfigBuilder;

pub type RateLimitLayer = GovernorLayer<
    tower_governor::key_extractor::PeerIpKeyExtractor,
    governor::middleware::NoOpMiddleware<governor::clock::QuantaInstant>,
    axum::body::Body,
>;

/// Layer allowing `requests_per_minute` per client IP, or `None` when limiting is off.
pub fn checkout_layer(requests_per_minute: u32) -> Option<RateLimitLayer> {
    if requests_per_minute == 0 {
        return None;
    }

    let period_secs = (60 / u64::from(requests_per_minute)).max(1);
    let config = GovernorConfigBuilder::default()
        .period(Duration::from_secs(period_secs))
        .burst_size(requests_per_minute)
        .finish();

    match config {
        Some(config) => Some(GovernorLayer::new(Arc::new(config))),
        None => {
            tracing::warn!(requests_per_minute, "Invalid rate limit, limiting disabled");
            None
        }
    }
}
