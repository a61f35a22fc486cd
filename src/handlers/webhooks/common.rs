//! Provider-independent webhook pipeline.
//!
//! `Received -> SignatureVerified -> Dispatched -> Acknowledged`, or
//! `Received -> Rejected` when the signature does not check out. The ledger
//! row and the handler's outbox rows are written in one transaction, so a
//! redelivery either finds the event fully handled or not at all.

use axum::http::StatusCode;
use rusqlite::Connection;

use crate::db::queries;
use crate::error::{Result, msg};
use crate::models::{NewNotification, WebhookStatus};
use crate::payments::{PaymentProcessor, ProcessorError, ProcessorEvent};

use super::events::handler_for;

/// Rejection sent back to the processor.
pub type WebhookRejection = (StatusCode, &'static str);

/// What a handler decided about one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disposition {
    pub status: WebhookStatus,
    pub detail: Option<String>,
    pub notifications: Vec<NewNotification>,
}

impl Disposition {
    pub fn processed() -> Self {
        Self {
            status: WebhookStatus::Processed,
            detail: None,
            notifications: Vec::new(),
        }
    }

    pub fn notify(notification: NewNotification) -> Self {
        Self {
            notifications: vec![notification],
            ..Self::processed()
        }
    }

    pub fn skipped(detail: impl Into<String>) -> Self {
        Self {
            status: WebhookStatus::Skipped,
            detail: Some(detail.into()),
            notifications: Vec::new(),
        }
    }

    /// Acknowledged but not fulfilled.
    pub fn failed(detail: impl Into<String>) -> Self {
        Self {
            status: WebhookStatus::Failed,
            detail: Some(detail.into()),
            notifications: Vec::new(),
        }
    }
}

/// Data handlers need besides the event itself.
#[derive(Debug, Clone, Copy)]
pub struct FulfillmentContext<'a> {
    pub site_name: &'a str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// Already in the ledger; nothing dispatched.
    Duplicate,
    Handled { status: WebhookStatus, queued: usize },
}

/// Checks the signature and only then parses the body.
pub fn verify_delivery(
    processor: &dyn PaymentProcessor,
    signature: Option<&str>,
    body: &[u8],
) -> std::result::Result<ProcessorEvent, WebhookRejection> {
    let signature = signature
        .filter(|s| !s.trim().is_empty())
        .ok_or((StatusCode::BAD_REQUEST, msg::MISSING_SIGNATURE))?;

    processor.verify_event(body, signature).map_err(|e| {
        tracing::warn!(
            provider = processor.provider(),
            error = %e,
            "Webhook rejected"
        );
        match e {
            ProcessorError::InvalidPayload(_) => (StatusCode::BAD_REQUEST, msg::INVALID_PAYLOAD),
            _ => (StatusCode::BAD_REQUEST, msg::INVALID_SIGNATURE),
        }
    })
}

/// Records the event in the ledger and runs its handler, atomically.
pub fn record_and_dispatch(
    conn: &mut Connection,
    provider: &str,
    event: &ProcessorEvent,
    ctx: &FulfillmentContext<'_>,
) -> Result<WebhookOutcome> {
    let tx = conn.transaction()?;

    if !queries::try_record_webhook_event(&tx, provider, &event.id, &event.event_type)? {
        tracing::info!(
            provider,
            event_id = %event.id,
            event_type = %event.event_type,
            "Duplicate webhook delivery acknowledged"
        );
        return Ok(WebhookOutcome::Duplicate);
    }

    let disposition = match handler_for(&event.event_type) {
        Some(handler) => handler(event, ctx),
        None => Disposition::skipped("unhandled event type"),
    };

    let mut queued = 0;
    for notification in &disposition.notifications {
        if queries::enqueue_notification(&tx, &event.id, notification)? {
            queued += 1;
        }
    }

    queries::finish_webhook_event(
        &tx,
        provider,
        &event.id,
        disposition.status,
        disposition.detail.as_deref(),
    )?;
    tx.commit()?;

    tracing::info!(
        provider,
        event_id = %event.id,
        event_type = %event.event_type,
        status = disposition.status.as_ref(),
        queued,
        "Webhook event handled"
    );

    Ok(WebhookOutcome::Handled {
        status: disposition.status,
        queued,
    })
}
