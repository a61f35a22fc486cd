use std::collections::BTreeMap;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::{
    CreateSessionParams, CreatedSession, PaymentProcessor, PaymentStatus, ProcessorError,
    ProcessorEvent, SessionDetails,
};
use crate::config::StripeSettings;
use crate::error::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a webhook timestamp before it's rejected (in seconds).
const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;
/// Allowed clock skew for timestamps from the future.
const WEBHOOK_FUTURE_SKEW_SECS: i64 = 60;

#[derive(Debug, Deserialize)]
struct CreateCheckoutSessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeApiError,
}

#[derive(Debug, Deserialize)]
struct StripeApiError {
    #[serde(rename = "type")]
    kind: Option<String>,
    code: Option<String>,
    message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct StripeCustomerDetails {
    email: Option<String>,
}

/// `checkout.session` object as returned by the sessions API and embedded in events.
#[derive(Debug, Clone, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub payment_status: PaymentStatus,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    customer_details: Option<StripeCustomerDetails>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default, deserialize_with = "metadata_or_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl StripeCheckoutSession {
    /// Email typed on the hosted page, falling back to the pre-filled one.
    pub fn email(&self) -> Option<&str> {
        self.customer_details
            .as_ref()
            .and_then(|d| d.email.as_deref())
            .or(self.customer_email.as_deref())
    }
}

impl From<StripeCheckoutSession> for SessionDetails {
    fn from(session: StripeCheckoutSession) -> Self {
        let customer_email = session.email().map(str::to_string);
        SessionDetails {
            id: session.id,
            payment_status: session.payment_status,
            customer_email,
            amount_total_minor: session.amount_total,
            currency: session.currency,
            metadata: session.metadata,
        }
    }
}

fn metadata_or_empty<'de, D>(deserializer: D) -> std::result::Result<BTreeMap<String, String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<BTreeMap<String, String>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Deserialize)]
struct StripeEventEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    created: Option<i64>,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: serde_json::Value,
}

// ============ payment_intent.* ============

#[derive(Debug, Deserialize)]
pub struct StripePaymentIntent {
    pub id: String,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub receipt_email: Option<String>,
    #[serde(default)]
    pub last_payment_error: Option<StripePaymentError>,
    #[serde(default, deserialize_with = "metadata_or_empty")]
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct StripePaymentError {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
}

// ============ charge.refunded ============

#[derive(Debug, Deserialize)]
pub struct StripeCharge {
    pub id: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub amount_refunded: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub receipt_email: Option<String>,
}

// ============ charge.dispute.created ============

#[derive(Debug, Deserialize)]
pub struct StripeDispute {
    pub id: String,
    #[serde(default)]
    pub charge: Option<String>,
    #[serde(default)]
    pub amount: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    api_base: String,
    secret_key: String,
    webhook_secret: String,
}

impl StripeClient {
    pub fn new(settings: &StripeSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build Stripe client: {}", e)))?;

        Ok(Self {
            client,
            api_base: settings.api_base.trim_end_matches('/').to_string(),
            secret_key: settings.secret_key.clone(),
            webhook_secret: settings.webhook_secret.clone(),
        })
    }

    fn form_fields(params: &CreateSessionParams) -> Vec<(String, String)> {
        let mut fields = vec![
            ("mode".to_string(), "payment".to_string()),
            ("payment_method_types[0]".to_string(), "card".to_string()),
            ("success_url".to_string(), params.success_url.clone()),
            ("cancel_url".to_string(), params.cancel_url.clone()),
            ("customer_email".to_string(), params.customer_email.clone()),
        ];

        for (i, item) in params.line_items.iter().enumerate() {
            let prefix = format!("line_items[{}]", i);
            fields.push((
                format!("{}[price_data][currency]", prefix),
                params.currency.clone(),
            ));
            fields.push((
                format!("{}[price_data][unit_amount]", prefix),
                item.unit_amount_minor.to_string(),
            ));
            fields.push((
                format!("{}[price_data][product_data][name]", prefix),
                item.name.clone(),
            ));
            if let Some(description) = item.description.as_deref().filter(|d| !d.is_empty()) {
                fields.push((
                    format!("{}[price_data][product_data][description]", prefix),
                    description.to_string(),
                ));
            }
            fields.push((format!("{}[quantity]", prefix), item.quantity.to_string()));
        }

        for (key, value) in &params.metadata {
            fields.push((format!("metadata[{}]", key), value.clone()));
        }

        fields
    }

    async fn error_from_response(response: Response) -> ProcessorError {
        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        let api_error = serde_json::from_str::<StripeErrorBody>(&text)
            .ok()
            .map(|body| body.error);

        let code = api_error.as_ref().and_then(|e| e.code.clone());
        let kind = api_error.as_ref().and_then(|e| e.kind.clone());

        if code.as_deref() == Some("idempotency_key_in_use")
            || kind.as_deref() == Some("idempotency_error")
        {
            return ProcessorError::IdempotencyKeyInUse;
        }
        if status == StatusCode::NOT_FOUND || code.as_deref() == Some("resource_missing") {
            return ProcessorError::InvalidSession;
        }

        ProcessorError::Rejected {
            status: status.as_u16(),
            code,
            message: api_error
                .and_then(|e| e.message)
                .unwrap_or_else(|| text.chars().take(200).collect()),
        }
    }

    /// Checks a `stripe-signature` header (`t=...,v1=...`) against the raw body.
    ///
    /// Returns `Ok(false)` for a stale timestamp or a signature mismatch and
    /// `Err` when the header cannot be parsed.
    pub fn verify_webhook_signature(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> std::result::Result<bool, ProcessorError> {
        let mut timestamp = None;
        let mut candidates = Vec::new();

        for part in signature.split(',') {
            let part = part.trim();
            if let Some(t) = part.strip_prefix("t=") {
                timestamp = Some(t);
            } else if let Some(s) = part.strip_prefix("v1=") {
                candidates.push(s);
            }
        }

        let timestamp_str = timestamp.ok_or(ProcessorError::MalformedSignature)?;
        if candidates.is_empty() {
            return Err(ProcessorError::MalformedSignature);
        }
        let timestamp: i64 = timestamp_str
            .parse()
            .map_err(|_| ProcessorError::MalformedSignature)?;

        let age = chrono::Utc::now().timestamp() - timestamp;
        if age > WEBHOOK_TIMESTAMP_TOLERANCE_SECS {
            tracing::warn!(
                age_secs = age,
                max_secs = WEBHOOK_TIMESTAMP_TOLERANCE_SECS,
                "Stripe webhook rejected: timestamp too old"
            );
            return Ok(false);
        }
        if age < -WEBHOOK_FUTURE_SKEW_SECS {
            tracing::warn!(age_secs = age, "Stripe webhook rejected: timestamp in the future");
            return Ok(false);
        }

        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| ProcessorError::InvalidSignature)?;
        mac.update(timestamp_str.as_bytes());
        mac.update(b".");
        mac.update(payload);
        let expected = hex::encode(mac.finalize().into_bytes());
        let expected_bytes = expected.as_bytes();

        // Signature length is public (64 hex chars), only the content is compared in constant time.
        Ok(candidates.iter().any(|candidate| {
            let provided = candidate.as_bytes();
            provided.len() == expected_bytes.len() && bool::from(expected_bytes.ct_eq(provided))
        }))
    }
}

/// Stripe ids are ASCII alphanumerics and underscores.
fn is_plausible_session_id(id: &str) -> bool {
    !id.is_empty() && id.len() <= 255 && id.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    fn provider(&self) -> &'static str {
        "stripe"
    }

    async fn create_session(
        &self,
        params: &CreateSessionParams,
        idempotency_key: &str,
    ) -> std::result::Result<CreatedSession, ProcessorError> {
        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .basic_auth(&self.secret_key, None::<&str>)
            .header("Idempotency-Key", idempotency_key)
            .form(&Self::form_fields(params))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        // A replayed response means an earlier request with this key already
        // produced a session; that one belongs to the first caller.
        let replayed = response
            .headers()
            .get("idempotent-replayed")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.eq_ignore_ascii_case("true"));
        if replayed {
            tracing::info!(idempotency_key, "Stripe replayed an idempotent checkout request");
            return Err(ProcessorError::IdempotencyKeyInUse);
        }

        let session: CreateCheckoutSessionResponse = response
            .json()
            .await
            .map_err(|e| ProcessorError::InvalidPayload(e.to_string()))?;
        let url = session.url.ok_or_else(|| {
            ProcessorError::InvalidPayload("checkout session has no url".to_string())
        })?;

        Ok(CreatedSession { id: session.id, url })
    }

    async fn retrieve_session(
        &self,
        session_id: &str,
    ) -> std::result::Result<SessionDetails, ProcessorError> {
        if !is_plausible_session_id(session_id) {
            return Err(ProcessorError::InvalidSession);
        }

        let response = self
            .client
            .get(format!(
                "{}/v1/checkout/sessions/{}",
                self.api_base,
                urlencoding::encode(session_id)
            ))
            .basic_auth(&self.secret_key, None::<&str>)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::error_from_response(response).await);
        }

        let session: StripeCheckoutSession = response
            .json()
            .await
            .map_err(|e| ProcessorError::InvalidPayload(e.to_string()))?;
        Ok(session.into())
    }

    fn verify_event(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> std::result::Result<ProcessorEvent, ProcessorError> {
        if !self.verify_webhook_signature(payload, signature)? {
            return Err(ProcessorError::InvalidSignature);
        }

        let envelope: StripeEventEnvelope = serde_json::from_slice(payload)
            .map_err(|e| ProcessorError::InvalidPayload(e.to_string()))?;

        Ok(ProcessorEvent {
            id: envelope.id,
            event_type: envelope.event_type,
            created: envelope.created,
            object: envelope.data.object,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn client() -> StripeClient {
        StripeClient::new(&StripeSettings {
            secret_key: "sk_test".to_string(),
            webhook_secret: "whsec_test".to_string(),
            api_base: "http://127.0.0.1:9".to_string(),
            timeout: Duration::from_secs(1),
        })
        .unwrap()
    }

    fn sign(secret: &str, timestamp: i64, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{}.", timestamp).as_bytes());
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }

    #[test]
    fn form_fields_carry_server_amounts_and_metadata() {
        let params = CreateSessionParams {
            line_items: vec![super::super::SessionLineItem {
                name: "WTA Finals - Grandstand".to_string(),
                description: None,
                unit_amount_minor: 25000,
                quantity: 2,
            }],
            currency: "usd".to_string(),
            success_url: "https://shop.test/checkout/success?session_id={CHECKOUT_SESSION_ID}"
                .to_string(),
            cancel_url: "https://shop.test/checkout/cancel".to_string(),
            customer_email: "a@b.co".to_string(),
            metadata: BTreeMap::from([("customer_name".to_string(), "Ann".to_string())]),
        };

        let fields = StripeClient::form_fields(&params);
        let get = |k: &str| {
            fields
                .iter()
                .find(|(key, _)| key == k)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("line_items[0][price_data][unit_amount]"), Some("25000"));
        assert_eq!(get("line_items[0][quantity]"), Some("2"));
        assert_eq!(get("line_items[0][price_data][currency]"), Some("usd"));
        assert_eq!(get("metadata[customer_name]"), Some("Ann"));
        assert_eq!(
            get("line_items[0][price_data][product_data][description]"),
            None,
            "empty descriptions are omitted"
        );
    }

    #[test]
    fn accepts_any_matching_v1_entry() {
        let payload = br#"{"id":"evt_1"}"#;
        let now = chrono::Utc::now().timestamp();
        let good = sign("whsec_test", now, payload);
        let header = format!("t={},v1={},v1={}", now, "0".repeat(64), good);
        assert!(client().verify_webhook_signature(payload, &header).unwrap());
    }

    #[test]
    fn rejects_future_timestamps_beyond_skew() {
        let payload = br#"{"id":"evt_1"}"#;
        let future = chrono::Utc::now().timestamp() + 120;
        let header = format!("t={},v1={}", future, sign("whsec_test", future, payload));
        assert!(!client().verify_webhook_signature(payload, &header).unwrap());
    }

    #[test]
    fn header_without_v1_is_malformed() {
        let result = client().verify_webhook_signature(b"{}", "t=123");
        assert!(matches!(result, Err(ProcessorError::MalformedSignature)));
    }

    #[test]
    fn session_id_shape_is_checked_before_any_request() {
        assert!(is_plausible_session_id("cs_test_a1B2c3"));
        assert!(!is_plausible_session_id(""));
        assert!(!is_plausible_session_id("../../v1/customers"));
        assert!(!is_plausible_session_id("cs test"));
    }
}
