use serde::Serialize;
use strum::{AsRefStr, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, AsRefStr, EnumString)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    OrderPaid,
    PaymentFailed,
    OrderRefunded,
    DisputeOpened,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    /// Claimed by a deliverer. Reclaimable once the claim goes stale.
    Sending,
    Sent,
    Failed,
}

/// Operator notification waiting in (or delivered from) the outbox.
#[derive(Debug, Clone, Serialize)]
pub struct OutboxNotification {
    pub id: String,
    pub event_id: String,
    pub kind: NotificationKind,
    pub message: String,
    pub status: NotificationStatus,
    pub attempt_count: i64,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub claimed_at: Option<i64>,
    pub sent_at: Option<i64>,
}

/// A notification to enqueue alongside a webhook ledger row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub kind: NotificationKind,
    pub message: String,
}
