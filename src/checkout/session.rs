use std::collections::BTreeMap;

use serde::Serialize;

use super::idempotency::{bucket, idempotency_key};
use super::{CustomerContact, ValidatedCart};
use crate::clock::Clock;
use crate::config::CheckoutSettings;
use crate::error::{AppError, Result};
use crate::payments::{CreateSessionParams, PaymentProcessor, SessionLineItem};

/// Processor limit on a single metadata value.
pub const METADATA_VALUE_MAX_CHARS: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub session_id: String,
    #[serde(rename = "url")]
    pub checkout_url: String,
}

#[derive(Serialize)]
struct ManifestEntry<'a> {
    id: &'a str,
    qty: u32,
}

fn truncate_chars(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

/// Builds the processor request from a validated cart.
///
/// Amounts come only from each line's [`crate::pricing::UnitPrice`].
pub fn build_session_params(
    settings: &CheckoutSettings,
    cart: &ValidatedCart,
    contact: &CustomerContact,
) -> Result<CreateSessionParams> {
    let line_items = cart
        .items
        .iter()
        .map(|item| {
            let unit_amount_minor = item.unit_price.to_minor_units().ok_or_else(|| {
                AppError::InvalidPriceConfiguration {
                    category: item.category.to_string(),
                    event_type: item.event_type.to_string(),
                }
            })?;
            Ok(SessionLineItem {
                name: item.display_name.clone(),
                description: item.display_description.clone(),
                unit_amount_minor,
                quantity: item.quantity,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let manifest: Vec<ManifestEntry> = cart
        .items
        .iter()
        .map(|item| ManifestEntry {
            id: &item.event_id,
            qty: item.quantity,
        })
        .collect();

    let expected_amount: i64 = line_items
        .iter()
        .map(|item| item.unit_amount_minor * i64::from(item.quantity))
        .sum();

    let metadata: BTreeMap<String, String> = [
        ("customer_name", contact.name.trim().to_string()),
        ("customer_phone", contact.phone.trim().to_string()),
        (
            "customer_comments",
            contact.comments.as_deref().unwrap_or("").trim().to_string(),
        ),
        ("cart_items", serde_json::to_string(&manifest)?),
        ("site_code", settings.site_code.clone()),
        ("expected_amount_minor", expected_amount.to_string()),
        ("expected_currency", settings.currency.to_lowercase()),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), truncate_chars(&v, METADATA_VALUE_MAX_CHARS)))
    .collect();

    Ok(CreateSessionParams {
        line_items,
        currency: settings.currency.to_lowercase(),
        success_url: format!(
            "{}/checkout/success?session_id={{CHECKOUT_SESSION_ID}}",
            settings.base_url
        ),
        cancel_url: format!("{}/checkout/cancel", settings.base_url),
        customer_email: contact.email.trim().to_string(),
        metadata,
    })
}

/// Opens exactly one processor session for a validated cart.
///
/// A second submission of the same cart within the idempotency window gets
/// [`AppError::DuplicateInProgress`]. Processor failures are not retried.
pub async fn create_checkout_session(
    processor: &dyn PaymentProcessor,
    settings: &CheckoutSettings,
    clock: &dyn Clock,
    cart: &ValidatedCart,
    contact: &CustomerContact,
) -> Result<CheckoutSession> {
    let params = build_session_params(settings, cart, contact)?;
    let bucket = bucket(clock.now(), settings.idempotency_window_secs);
    let key = idempotency_key(&contact.email, cart, bucket);

    tracing::debug!(
        idempotency_key = %key,
        items = cart.items.len(),
        amount_minor = params.amount_total_minor(),
        "Creating checkout session"
    );

    let created = match processor.create_session(&params, &key).await {
        Ok(created) => created,
        Err(e) => {
            let err = AppError::from(e);
            if matches!(err, AppError::DuplicateInProgress) {
                tracing::info!(idempotency_key = %key, "Duplicate checkout request rejected");
            }
            return Err(err);
        }
    };

    tracing::info!(
        session_id = %created.id,
        amount_minor = params.amount_total_minor(),
        currency = %params.currency,
        "Checkout session created"
    );

    Ok(CheckoutSession {
        session_id: created.id,
        checkout_url: created.url,
    })
}
