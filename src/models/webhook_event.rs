use serde::Serialize;
use strum::{AsRefStr, EnumString};

/// Outcome recorded in the webhook ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WebhookStatus {
    /// Row inserted, handler not finished. Only visible inside the transaction.
    Received,
    Processed,
    Skipped,
    /// Handled and acknowledged, but the event did not pass checks (e.g. amount mismatch).
    Failed,
}

/// Ledger entry that makes webhook handling idempotent per `(provider, event_id)`.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEventRecord {
    pub provider: String,
    pub event_id: String,
    pub event_type: String,
    pub status: WebhookStatus,
    pub detail: Option<String>,
    pub received_at: i64,
    pub processed_at: Option<i64>,
}
