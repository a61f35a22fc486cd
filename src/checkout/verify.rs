use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::Serialize;

use crate::error::{AppError, Result, msg};
use crate::payments::PaymentProcessor;
use crate::pricing::from_minor_units;

/// Processor ground truth for a checkout session, as shown to the success page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentVerification {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub customer_email: Option<String>,
    #[serde(
        with = "rust_decimal::serde::float_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub amount_total: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<BTreeMap<String, String>>,
    pub status: String,
}

/// Asks the processor whether a session was paid. Read-only.
///
/// Only `paid` counts. `unpaid` and `no_payment_required` both yield
/// `verified: false` with the raw status.
pub async fn verify_payment(
    processor: &dyn PaymentProcessor,
    session_id: &str,
) -> Result<PaymentVerification> {
    let session_id = session_id.trim();
    if session_id.is_empty() {
        return Err(AppError::Validation(msg::SESSION_ID_REQUIRED.into()));
    }

    let session = processor.retrieve_session(session_id).await?;
    let status = session.payment_status.as_str().to_string();

    if !session.payment_status.is_paid() {
        tracing::info!(session_id, status = %status, "Checkout session not paid");
        return Ok(PaymentVerification {
            verified: false,
            customer_email: None,
            amount_total: None,
            currency: None,
            metadata: None,
            status,
        });
    }

    tracing::info!(session_id, "Checkout session verified as paid");

    Ok(PaymentVerification {
        verified: true,
        customer_email: session.customer_email,
        amount_total: session.amount_total_minor.map(from_minor_units),
        currency: session.currency.map(|c| c.to_uppercase()),
        metadata: Some(session.metadata),
        status,
    })
}
