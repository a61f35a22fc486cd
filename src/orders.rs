//! Client for the external orders API.
//!
//! Single-item orders are created by the CRM backend, which re-validates the
//! price server-side and opens its own checkout session. This module only
//! forwards the request and turns the backend's error shapes into one message.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::config::OrdersSettings;
use crate::error::{AppError, Result, msg};

use crate::checkout::{CustomerContact, MAX_QUANTITY};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderInput {
    pub event_id: i64,
    pub category_id: i64,
    pub quantity: u32,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub comments: Option<String>,
}

/// Why an order attempt failed, so the HTTP layer can pick 400 or 502.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Business,
    Transport,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderActionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub failure: Option<FailureKind>,
}

impl OrderActionResult {
    fn failed(kind: FailureKind, error: impl Into<String>) -> Self {
        Self {
            success: false,
            order_id: None,
            order_number: None,
            checkout_url: None,
            error: Some(error.into()),
            failure: Some(kind),
        }
    }
}

/// Backend placeholder for wrapped field errors; never shown on its own.
const GENERIC_VALIDATION_MESSAGE: &str = "Validation error";

/// Strings held by a field error value, either a list or a single string.
fn error_strings(value: &Value) -> Vec<&str> {
    match value {
        Value::String(s) => vec![s.as_str()],
        Value::Array(list) => list.iter().filter_map(Value::as_str).collect(),
        _ => Vec::new(),
    }
}

/// Picks the most specific message out of a backend error body.
///
/// The backend wraps validation failures as `{error, message, details}`.
/// Errors under `details` win, then top-level field errors (every
/// list-of-strings field except `non_field_errors`), both joined with
/// `". "`. After that `non_field_errors[0]`, `message` (unless it is the
/// generic validation placeholder), `detail`, and finally the `error` code.
pub fn extract_error_message(body: &Value) -> String {
    let Some(object) = body.as_object() else {
        return msg::ORDER_FAILED.to_string();
    };

    if let Some(details) = object.get("details").and_then(Value::as_object) {
        let detail_errors: Vec<&str> = details.values().flat_map(error_strings).collect();
        if !detail_errors.is_empty() {
            return detail_errors.join(". ");
        }
    }

    let field_errors: Vec<&str> = object
        .iter()
        .filter(|(key, _)| key.as_str() != "non_field_errors")
        .filter_map(|(_, value)| value.as_array())
        .flat_map(|list| list.iter().filter_map(Value::as_str))
        .collect();
    if !field_errors.is_empty() {
        return field_errors.join(". ");
    }

    if let Some(first) = object
        .get("non_field_errors")
        .and_then(Value::as_array)
        .and_then(|list| list.first())
        .and_then(Value::as_str)
    {
        return first.to_string();
    }

    let message = object
        .get("message")
        .and_then(Value::as_str)
        .filter(|m| *m != GENERIC_VALIDATION_MESSAGE);

    message
        .or_else(|| object.get("detail").and_then(Value::as_str))
        .or_else(|| object.get("error").and_then(Value::as_str))
        .filter(|m| !m.trim().is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| msg::ORDER_FAILED.to_string())
}

/// Ids may come back as strings or numbers.
fn value_to_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[derive(Debug, Clone)]
pub struct OrdersApiClient {
    client: Client,
    base_url: String,
}

impl OrdersApiClient {
    pub fn new(settings: &OrdersSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build orders client: {}", e)))?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn pre_validate(input: &CreateOrderInput) -> std::result::Result<(), String> {
        if input.quantity == 0 || input.quantity > MAX_QUANTITY {
            return Err(msg::INVALID_QUANTITY.to_string());
        }
        CustomerContact {
            name: input.name.clone(),
            email: input.email.clone(),
            phone: input.phone.clone(),
            comments: None,
        }
        .validate()
        .map_err(|e| match e {
            AppError::Validation(m) => m,
            other => other.to_string(),
        })
    }

    /// Creates a single-item order. Never returns `Err`: every outcome is an
    /// [`OrderActionResult`] the storefront can show.
    pub async fn create_order(&self, input: &CreateOrderInput) -> OrderActionResult {
        if let Err(message) = Self::pre_validate(input) {
            return OrderActionResult::failed(FailureKind::Business, message);
        }

        let payload = json!({
            "name": input.name.trim(),
            "email": input.email.trim(),
            "phone": input.phone.trim(),
            "comments": input.comments.as_deref().unwrap_or(""),
            "items": [{
                "event_id": input.event_id,
                "category_id": input.category_id,
                "quantity": input.quantity,
            }],
        });

        let response = match self
            .client
            .post(format!("{}/api/checkout/create-session/", self.base_url))
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::error!(
                    event_id = input.event_id,
                    timeout = e.is_timeout(),
                    "Orders API unreachable: {}",
                    e
                );
                return OrderActionResult::failed(FailureKind::Transport, msg::CONNECTION_ERROR);
            }
        };

        let status = response.status();
        let body: Value = match response.json().await {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(status = status.as_u16(), "Orders API returned non-JSON body: {}", e);
                Value::Null
            }
        };

        if !status.is_success() {
            let error = extract_error_message(&body);
            tracing::warn!(
                status = status.as_u16(),
                event_id = input.event_id,
                category_id = input.category_id,
                error = %error,
                "Order creation rejected"
            );
            return OrderActionResult::failed(FailureKind::Business, error);
        }

        let order = body.get("order");
        let order_id = value_to_string(body.get("order_id"))
            .or_else(|| value_to_string(order.and_then(|o| o.get("id"))));
        let Some(order_id) = order_id else {
            tracing::warn!(status = status.as_u16(), "Order response missing order_id");
            return OrderActionResult::failed(FailureKind::Business, msg::INVALID_ORDER_RESPONSE);
        };

        let order_number = value_to_string(body.get("order_number"))
            .or_else(|| value_to_string(order.and_then(|o| o.get("order_number"))));
        let checkout_url = value_to_string(body.get("checkout_url"));

        tracing::info!(order_id = %order_id, "Order created");

        OrderActionResult {
            success: true,
            order_id: Some(order_id),
            order_number,
            checkout_url,
            error: None,
            failure: None,
        }
    }
}
