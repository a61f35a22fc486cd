//! Delivery of queued operator notifications.
//!
//! Rows are claimed before sending so the post-commit delivery and the
//! periodic retry task never send the same row twice. A claim left behind by
//! a crashed deliverer becomes reclaimable after [`CLAIM_STALE_SECS`].

use std::time::Duration;

use chrono::Utc;

use crate::db::{AppState, DbPool, queries};
use crate::error::Result;
use crate::models::NotificationStatus;
use crate::notify::Notifier;

pub const MAX_DELIVERY_ATTEMPTS: i64 = 5;
pub const CLAIM_STALE_SECS: i64 = 300;
const BATCH_SIZE: i64 = 100;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub sent: usize,
    /// Failed this time, will be retried
    pub retrying: usize,
    /// Gave up after `max_attempts`
    pub failed: usize,
    /// Claimed by another deliverer
    pub skipped: usize,
}

/// Delivers pending notifications oldest first, optionally only those of one event.
pub async fn deliver_pending(
    pool: &DbPool,
    notifier: &dyn Notifier,
    event_id: Option<&str>,
    max_attempts: i64,
) -> Result<DeliveryReport> {
    let stale_before = Utc::now().timestamp() - CLAIM_STALE_SECS;
    let pending = {
        let conn = pool.get()?;
        queries::list_deliverable_notifications(&conn, event_id, stale_before, BATCH_SIZE)?
    };

    let mut report = DeliveryReport::default();

    for notification in pending {
        let claimed = {
            let conn = pool.get()?;
            queries::try_claim_notification(&conn, &notification.id, stale_before)?
        };
        if !claimed {
            report.skipped += 1;
            continue;
        }

        let outcome = notifier.send(&notification.message).await;

        let conn = pool.get()?;
        match outcome {
            Ok(()) => {
                // The message is out; a failed status write must not stop the pass.
                // The row stays claimed and is resent once the claim goes stale.
                if let Err(e) = queries::mark_notification_sent(&conn, &notification.id) {
                    tracing::error!(
                        notification_id = %notification.id,
                        event_id = %notification.event_id,
                        error = %e,
                        "Notification delivered but not marked sent"
                    );
                    report.sent += 1;
                    continue;
                }
                tracing::info!(
                    notification_id = %notification.id,
                    event_id = %notification.event_id,
                    kind = notification.kind.as_ref(),
                    notifier = notifier.name(),
                    "Notification delivered"
                );
                report.sent += 1;
            }
            Err(e) => {
                let status = queries::mark_notification_attempt_failed(
                    &conn,
                    &notification.id,
                    &e.to_string(),
                    max_attempts,
                )?;
                if status == NotificationStatus::Failed {
                    tracing::error!(
                        notification_id = %notification.id,
                        event_id = %notification.event_id,
                        attempts = notification.attempt_count + 1,
                        error = %e,
                        "Notification abandoned after max attempts"
                    );
                    report.failed += 1;
                } else {
                    tracing::warn!(
                        notification_id = %notification.id,
                        event_id = %notification.event_id,
                        attempt = notification.attempt_count + 1,
                        error = %e,
                        "Notification delivery failed, will retry"
                    );
                    report.retrying += 1;
                }
            }
        }
    }

    Ok(report)
}

/// Delivers one event's notifications in the background, after its webhook committed.
pub fn spawn_delivery(state: &AppState, event_id: String) {
    let db = state.db.clone();
    let notifier = state.notifier.clone();

    tokio::spawn(async move {
        match deliver_pending(&db, notifier.as_ref(), Some(&event_id), MAX_DELIVERY_ATTEMPTS).await
        {
            Ok(report) => {
                tracing::debug!(event_id = %event_id, ?report, "Post-webhook delivery finished")
            }
            Err(e) => tracing::warn!(event_id = %event_id, "Post-webhook delivery failed: {}", e),
        }
    });
}

/// Spawns a background task that periodically retries pending notifications.
pub fn spawn_retry_task(state: AppState, interval: Duration) {
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;

            match deliver_pending(&state.db, state.notifier.as_ref(), None, MAX_DELIVERY_ATTEMPTS)
                .await
            {
                Ok(report) if report.sent + report.retrying + report.failed > 0 => {
                    tracing::info!(?report, "Outbox retry pass");
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Outbox retry pass failed: {}", e),
            }
        }
    });

    tracing::info!(
        interval_secs = interval.as_secs(),
        "Background outbox retry task started"
    );
}
