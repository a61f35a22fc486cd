//! Stripe event handlers.
//!
//! Handlers are pure: they read the verified event and return a
//! [`Disposition`]. Persistence and delivery are done by the caller.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;

use crate::models::{NewNotification, NotificationKind};
use crate::notify::escape_html;
use crate::payments::{
    ProcessorEvent, StripeCharge, StripeCheckoutSession, StripeDispute, StripePaymentIntent,
};
use crate::pricing::from_minor_units;

use super::common::{Disposition, FulfillmentContext};

pub type EventHandler = fn(&ProcessorEvent, &FulfillmentContext<'_>) -> Disposition;

const HANDLERS: &[(&str, EventHandler)] = &[
    ("checkout.session.completed", handle_checkout_completed),
    ("payment_intent.succeeded", handle_payment_succeeded),
    ("payment_intent.payment_failed", handle_payment_failed),
    ("charge.refunded", handle_charge_refunded),
    ("charge.dispute.created", handle_dispute_created),
];

pub fn handler_for(event_type: &str) -> Option<EventHandler> {
    HANDLERS
        .iter()
        .find(|(name, _)| *name == event_type)
        .map(|(_, handler)| *handler)
}

fn parse_object<T: DeserializeOwned>(event: &ProcessorEvent) -> Result<T, Disposition> {
    serde_json::from_value(event.object.clone()).map_err(|e| {
        tracing::error!(
            event_id = %event.id,
            event_type = %event.event_type,
            "Malformed event object: {}",
            e
        );
        Disposition::failed(format!("malformed event object: {}", e))
    })
}

fn format_amount(minor: Option<i64>, currency: Option<&str>) -> String {
    match minor {
        Some(minor) => format!(
            "{} {}",
            from_minor_units(minor),
            currency.unwrap_or("").to_uppercase()
        )
        .trim_end()
        .to_string(),
        None => "unknown".to_string(),
    }
}

/// Builds an HTML message from a title and `label: value` lines. Values are escaped.
fn render(title: &str, site_name: &str, lines: &[(&str, Option<String>)]) -> String {
    let mut message = format!("<b>{}</b> · {}\n", title, escape_html(site_name));
    for (label, value) in lines {
        if let Some(value) = value.as_deref().filter(|v| !v.trim().is_empty()) {
            message.push_str(&format!("\n<b>{}:</b> {}", label, escape_html(value)));
        }
    }
    message
}

/// Compares the paid amount with what the storefront asked for when the session was created.
fn check_expected_amount(
    session: &StripeCheckoutSession,
    metadata: &BTreeMap<String, String>,
) -> Result<(), String> {
    if let Some(expected) = metadata.get("expected_amount_minor") {
        let expected: i64 = expected
            .parse()
            .map_err(|_| format!("unparseable expected_amount_minor {:?}", expected))?;
        if session.amount_total != Some(expected) {
            return Err(format!(
                "amount mismatch: expected {} got {:?}",
                expected, session.amount_total
            ));
        }
    }

    if let Some(expected) = metadata.get("expected_currency") {
        let actual = session.currency.as_deref().unwrap_or("");
        if !expected.eq_ignore_ascii_case(actual) {
            return Err(format!(
                "currency mismatch: expected {} got {}",
                expected, actual
            ));
        }
    }

    Ok(())
}

fn handle_checkout_completed(event: &ProcessorEvent, ctx: &FulfillmentContext<'_>) -> Disposition {
    let session: StripeCheckoutSession = match parse_object(event) {
        Ok(s) => s,
        Err(d) => return d,
    };

    if !session.payment_status.is_paid() {
        tracing::info!(
            session_id = %session.id,
            status = session.payment_status.as_str(),
            "Checkout completed without payment, skipping fulfillment"
        );
        return Disposition::skipped(format!(
            "payment_status={}",
            session.payment_status.as_str()
        ));
    }

    if let Err(detail) = check_expected_amount(&session, &session.metadata) {
        tracing::error!(
            event_id = %event.id,
            session_id = %session.id,
            detail = %detail,
            "Paid session does not match expected amount, not fulfilling"
        );
        return Disposition::failed(detail);
    }

    let meta = |key: &str| session.metadata.get(key).cloned();
    let message = render(
        "New paid order",
        ctx.site_name,
        &[
            ("Customer", meta("customer_name")),
            ("Email", session.email().map(str::to_string)),
            ("Phone", meta("customer_phone")),
            ("Comments", meta("customer_comments")),
            ("Items", meta("cart_items")),
            (
                "Total",
                Some(format_amount(session.amount_total, session.currency.as_deref())),
            ),
            ("Session", Some(session.id.clone())),
            ("Payment", session.payment_intent.clone()),
        ],
    );

    Disposition::notify(NewNotification {
        kind: NotificationKind::OrderPaid,
        message,
    })
}

fn handle_payment_succeeded(event: &ProcessorEvent, _ctx: &FulfillmentContext<'_>) -> Disposition {
    let intent: StripePaymentIntent = match parse_object(event) {
        Ok(i) => i,
        Err(d) => return d,
    };
    tracing::info!(
        payment_intent = %intent.id,
        amount = ?intent.amount,
        "Payment intent succeeded"
    );
    Disposition::processed()
}

fn handle_payment_failed(event: &ProcessorEvent, ctx: &FulfillmentContext<'_>) -> Disposition {
    let intent: StripePaymentIntent = match parse_object(event) {
        Ok(i) => i,
        Err(d) => return d,
    };
    let reason = intent
        .last_payment_error
        .as_ref()
        .and_then(|e| e.message.clone().or_else(|| e.code.clone()));

    tracing::warn!(
        payment_intent = %intent.id,
        reason = reason.as_deref().unwrap_or("unknown"),
        "Payment failed"
    );

    let message = render(
        "Payment failed",
        ctx.site_name,
        &[
            ("Email", intent.receipt_email.clone()),
            (
                "Amount",
                Some(format_amount(intent.amount, intent.currency.as_deref())),
            ),
            ("Reason", reason),
            ("Payment", Some(intent.id.clone())),
        ],
    );

    Disposition::notify(NewNotification {
        kind: NotificationKind::PaymentFailed,
        message,
    })
}

fn handle_charge_refunded(event: &ProcessorEvent, ctx: &FulfillmentContext<'_>) -> Disposition {
    let charge: StripeCharge = match parse_object(event) {
        Ok(c) => c,
        Err(d) => return d,
    };

    tracing::info!(charge = %charge.id, refunded = ?charge.amount_refunded, "Charge refunded");

    let message = render(
        "Order refunded",
        ctx.site_name,
        &[
            ("Email", charge.receipt_email.clone()),
            (
                "Refunded",
                Some(format_amount(charge.amount_refunded, charge.currency.as_deref())),
            ),
            ("Charge", Some(charge.id.clone())),
            ("Payment", charge.payment_intent.clone()),
        ],
    );

    Disposition::notify(NewNotification {
        kind: NotificationKind::OrderRefunded,
        message,
    })
}

fn handle_dispute_created(event: &ProcessorEvent, ctx: &FulfillmentContext<'_>) -> Disposition {
    let dispute: StripeDispute = match parse_object(event) {
        Ok(d) => d,
        Err(d) => return d,
    };

    tracing::warn!(
        dispute = %dispute.id,
        charge = dispute.charge.as_deref().unwrap_or(""),
        reason = dispute.reason.as_deref().unwrap_or(""),
        "Dispute opened"
    );

    let message = render(
        "Dispute opened",
        ctx.site_name,
        &[
            (
                "Amount",
                Some(format_amount(dispute.amount, dispute.currency.as_deref())),
            ),
            ("Reason", dispute.reason.clone()),
            ("Charge", dispute.charge.clone()),
            ("Dispute", Some(dispute.id.clone())),
        ],
    );

    Disposition::notify(NewNotification {
        kind: NotificationKind::DisputeOpened,
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WebhookStatus;
    use serde_json::json;

    const CTX: FulfillmentContext<'static> = FulfillmentContext {
        site_name: "Finals <Tickets>",
    };

    fn event(event_type: &str, object: serde_json::Value) -> ProcessorEvent {
        ProcessorEvent {
            id: "evt_1".to_string(),
            event_type: event_type.to_string(),
            created: None,
            object,
        }
    }

    fn completed(payment_status: &str, amount_total: i64, currency: &str) -> ProcessorEvent {
        event(
            "checkout.session.completed",
            json!({
                "id": "cs_test_1",
                "payment_status": payment_status,
                "customer_details": {"email": "ann@example.com"},
                "amount_total": amount_total,
                "currency": currency,
                "payment_intent": "pi_1",
                "metadata": {
                    "customer_name": "Ann <script>",
                    "customer_phone": "+1 555",
                    "cart_items": "[{\"id\":\"7\",\"qty\":2}]",
                    "expected_amount_minor": "50000",
                    "expected_currency": "usd"
                }
            }),
        )
    }

    fn dispatch(event: &ProcessorEvent) -> Disposition {
        handler_for(&event.event_type).expect("handler registered")(event, &CTX)
    }

    #[test]
    fn paid_checkout_queues_escaped_order_notification() {
        let d = dispatch(&completed("paid", 50000, "usd"));
        assert_eq!(d.status, WebhookStatus::Processed);
        assert_eq!(d.notifications.len(), 1);

        let message = &d.notifications[0].message;
        assert_eq!(d.notifications[0].kind, NotificationKind::OrderPaid);
        assert!(message.contains("Finals &lt;Tickets&gt;"));
        assert!(message.contains("Ann &lt;script&gt;"));
        assert!(message.contains("500.00 USD"));
        assert!(message.contains("ann@example.com"));
    }

    #[test]
    fn unpaid_checkout_is_skipped() {
        let d = dispatch(&completed("unpaid", 50000, "usd"));
        assert_eq!(d.status, WebhookStatus::Skipped);
        assert!(d.notifications.is_empty());
    }

    #[test]
    fn amount_or_currency_mismatch_fails_without_fulfillment() {
        let d = dispatch(&completed("paid", 100, "usd"));
        assert_eq!(d.status, WebhookStatus::Failed);
        assert!(d.notifications.is_empty());

        let d = dispatch(&completed("paid", 50000, "eur"));
        assert_eq!(d.status, WebhookStatus::Failed);
    }

    #[test]
    fn malformed_object_fails_instead_of_panicking() {
        let d = dispatch(&event("charge.refunded", json!({"amount_refunded": 5})));
        assert_eq!(d.status, WebhookStatus::Failed);
    }

    #[test]
    fn payment_failure_includes_reason() {
        let d = dispatch(&event(
            "payment_intent.payment_failed",
            json!({
                "id": "pi_9",
                "amount": 25000,
                "currency": "usd",
                "last_payment_error": {"message": "Your card was declined."}
            }),
        ));
        assert_eq!(d.notifications[0].kind, NotificationKind::PaymentFailed);
        assert!(d.notifications[0].message.contains("Your card was declined."));
    }

    #[test]
    fn unknown_types_have_no_handler() {
        assert!(handler_for("customer.created").is_none());
        assert!(handler_for("payment_intent.succeeded").is_some());
    }
}
