use chrono::Utc;
use rusqlite::{Connection, params};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

use super::from_row::{NOTIFICATION_COLS, WEBHOOK_EVENT_COLS, query_all, query_one};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

// ============ Webhook Ledger ============

/// Record a webhook event as received. Returns `false` if it was already recorded.
pub fn try_record_webhook_event(
    conn: &Connection,
    provider: &str,
    event_id: &str,
    event_type: &str,
) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO webhook_events (provider, event_id, event_type, status, received_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            provider,
            event_id,
            event_type,
            WebhookStatus::Received.as_ref(),
            now()
        ],
    )?;
    Ok(affected > 0)
}

pub fn finish_webhook_event(
    conn: &Connection,
    provider: &str,
    event_id: &str,
    status: WebhookStatus,
    detail: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE webhook_events SET status = ?1, detail = ?2, processed_at = ?3
         WHERE provider = ?4 AND event_id = ?5",
        params![status.as_ref(), detail, now(), provider, event_id],
    )?;
    Ok(())
}

pub fn get_webhook_event(
    conn: &Connection,
    provider: &str,
    event_id: &str,
) -> Result<Option<WebhookEventRecord>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM webhook_events WHERE provider = ?1 AND event_id = ?2",
            WEBHOOK_EVENT_COLS
        ),
        &[&provider, &event_id],
    )
}

pub fn count_webhook_events(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM webhook_events", [], |row| row.get(0))?)
}

/// Purge ledger rows beyond the retention period.
/// Processors stop redelivering after a few days, so old rows no longer guard anything.
pub fn purge_old_webhook_events(conn: &Connection, retention_days: i64) -> Result<usize> {
    let cutoff = now() - (retention_days * 86400);
    let deleted = conn.execute(
        "DELETE FROM webhook_events WHERE received_at < ?1",
        params![cutoff],
    )?;
    Ok(deleted)
}

// ============ Notification Outbox ============

/// Queue a notification. At most one per `(event_id, kind)`; returns `false` for a duplicate.
pub fn enqueue_notification(
    conn: &Connection,
    event_id: &str,
    notification: &NewNotification,
) -> Result<bool> {
    let affected = conn.execute(
        "INSERT OR IGNORE INTO notification_outbox (id, event_id, kind, message, status, attempt_count, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6)",
        params![
            gen_id(),
            event_id,
            notification.kind.as_ref(),
            &notification.message,
            NotificationStatus::Pending.as_ref(),
            now()
        ],
    )?;
    Ok(affected > 0)
}

/// Pending notifications (and stale claims), oldest first.
pub fn list_deliverable_notifications(
    conn: &Connection,
    event_id: Option<&str>,
    stale_before: i64,
    limit: i64,
) -> Result<Vec<OutboxNotification>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM notification_outbox
             WHERE (status = 'pending' OR (status = 'sending' AND claimed_at < ?1))
               AND (?2 IS NULL OR event_id = ?2)
             ORDER BY created_at, rowid
             LIMIT ?3",
            NOTIFICATION_COLS
        ),
        &[&stale_before, &event_id, &limit],
    )
}

/// Claim a notification for delivery. Returns `false` if another deliverer holds it.
pub fn try_claim_notification(conn: &Connection, id: &str, stale_before: i64) -> Result<bool> {
    let affected = conn.execute(
        "UPDATE notification_outbox SET status = 'sending', claimed_at = ?1
         WHERE id = ?2 AND (status = 'pending' OR (status = 'sending' AND claimed_at < ?3))",
        params![now(), id, stale_before],
    )?;
    Ok(affected > 0)
}

pub fn mark_notification_sent(conn: &Connection, id: &str) -> Result<()> {
    conn.execute(
        "UPDATE notification_outbox
         SET status = 'sent', attempt_count = attempt_count + 1, last_error = NULL, sent_at = ?1
         WHERE id = ?2",
        params![now(), id],
    )?;
    Ok(())
}

/// Record a failed attempt. Returns the resulting status (`pending` or `failed`).
pub fn mark_notification_attempt_failed(
    conn: &Connection,
    id: &str,
    error: &str,
    max_attempts: i64,
) -> Result<NotificationStatus> {
    conn.execute(
        "UPDATE notification_outbox
         SET attempt_count = attempt_count + 1,
             last_error = ?1,
             claimed_at = NULL,
             status = CASE WHEN attempt_count + 1 >= ?2 THEN 'failed' ELSE 'pending' END
         WHERE id = ?3",
        params![error, max_attempts, id],
    )?;
    let status: String = conn.query_row(
        "SELECT status FROM notification_outbox WHERE id = ?1",
        params![id],
        |row| row.get(0),
    )?;
    Ok(status.parse().unwrap_or(NotificationStatus::Failed))
}

pub fn list_notifications_for_event(
    conn: &Connection,
    event_id: &str,
) -> Result<Vec<OutboxNotification>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM notification_outbox WHERE event_id = ?1 ORDER BY created_at, rowid",
            NOTIFICATION_COLS
        ),
        &[&event_id],
    )
}

pub fn count_notifications(conn: &Connection) -> Result<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM notification_outbox", [], |row| {
        row.get(0)
    })?)
}
