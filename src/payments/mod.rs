//! Payment processor capability.
//!
//! The storefront talks to its processor only through [`PaymentProcessor`],
//! so the checkout orchestrator, verification gateway and webhook consumer
//! can be exercised against a fake in tests.

mod stripe;

pub use stripe::*;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The idempotency key was already used for an in-flight or completed request.
    #[error("idempotency key already in use")]
    IdempotencyKeyInUse,

    #[error("no such checkout session")]
    InvalidSession,

    #[error("missing or malformed signature header")]
    MalformedSignature,

    #[error("webhook signature mismatch or stale timestamp")]
    InvalidSignature,

    #[error("invalid event payload: {0}")]
    InvalidPayload(String),

    #[error("processor request timed out")]
    Timeout,

    #[error("processor unreachable: {0}")]
    Transport(String),

    #[error("processor rejected request ({status}): {message}")]
    Rejected {
        status: u16,
        code: Option<String>,
        message: String,
    },
}

impl ProcessorError {
    pub fn is_signature_error(&self) -> bool {
        matches!(
            self,
            ProcessorError::MalformedSignature | ProcessorError::InvalidSignature
        )
    }
}

impl From<reqwest::Error> for ProcessorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProcessorError::Timeout
        } else {
            ProcessorError::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLineItem {
    pub name: String,
    pub description: Option<String>,
    pub unit_amount_minor: i64,
    pub quantity: u32,
}

/// Everything needed to open a hosted checkout page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateSessionParams {
    pub line_items: Vec<SessionLineItem>,
    pub currency: String,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: String,
    pub metadata: BTreeMap<String, String>,
}

impl CreateSessionParams {
    pub fn amount_total_minor(&self) -> i64 {
        self.line_items
            .iter()
            .map(|item| item.unit_amount_minor * i64::from(item.quantity))
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedSession {
    pub id: String,
    pub url: String,
}

/// Payment status as reported by the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
    Other(String),
}

impl PaymentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            PaymentStatus::Paid => "paid",
            PaymentStatus::Unpaid => "unpaid",
            PaymentStatus::NoPaymentRequired => "no_payment_required",
            PaymentStatus::Other(s) => s,
        }
    }

    pub fn is_paid(&self) -> bool {
        *self == PaymentStatus::Paid
    }
}

impl From<String> for PaymentStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "paid" => PaymentStatus::Paid,
            "unpaid" => PaymentStatus::Unpaid,
            "no_payment_required" => PaymentStatus::NoPaymentRequired,
            _ => PaymentStatus::Other(s),
        }
    }
}

impl From<PaymentStatus> for String {
    fn from(status: PaymentStatus) -> Self {
        status.as_str().to_string()
    }
}

/// Processor-side view of a checkout session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDetails {
    pub id: String,
    pub payment_status: PaymentStatus,
    pub customer_email: Option<String>,
    pub amount_total_minor: Option<i64>,
    pub currency: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

/// A processor event whose signature has been verified.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorEvent {
    pub id: String,
    pub event_type: String,
    pub created: Option<i64>,
    pub object: serde_json::Value,
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Ledger key for events from this processor.
    fn provider(&self) -> &'static str;

    /// Opens a checkout session. Reusing `idempotency_key` yields
    /// [`ProcessorError::IdempotencyKeyInUse`] instead of a second session.
    async fn create_session(
        &self,
        params: &CreateSessionParams,
        idempotency_key: &str,
    ) -> Result<CreatedSession, ProcessorError>;

    async fn retrieve_session(&self, session_id: &str) -> Result<SessionDetails, ProcessorError>;

    /// Verifies the signature over the raw body and only then parses it.
    fn verify_event(&self, payload: &[u8], signature: &str)
    -> Result<ProcessorEvent, ProcessorError>;
}
