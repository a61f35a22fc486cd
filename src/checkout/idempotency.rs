use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use super::ValidatedCart;

/// Time bucket a request falls into. Requests in the same bucket with the
/// same contact and cart share an idempotency key.
pub fn bucket(now: DateTime<Utc>, window_secs: u64) -> i64 {
    let window = i64::try_from(window_secs.max(1)).unwrap_or(i64::MAX);
    now.timestamp().div_euclid(window)
}

/// `checkout_<sha256 hex>` over the normalized email, the bucket and the
/// `id:category:qty` list in cart order.
pub fn idempotency_key(email: &str, cart: &ValidatedCart, bucket: i64) -> String {
    let items = cart
        .items
        .iter()
        .map(|item| format!("{}:{}:{}", item.event_id, item.category, item.quantity))
        .collect::<Vec<_>>()
        .join(",");
    let material = format!("{}|{}|{}", email.trim().to_lowercase(), bucket, items);

    format!("checkout_{}", hex::encode(Sha256::digest(material.as_bytes())))
}
