use rusqlite::Connection;

/// Initialize the schema: webhook ledger and notification outbox.
///
/// There is no order table. Orders live in the external orders API.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;

        -- One row per processor event ever accepted. The unique key is what
        -- makes at-least-once delivery safe.
        CREATE TABLE IF NOT EXISTS webhook_events (
            provider TEXT NOT NULL,
            event_id TEXT NOT NULL,
            event_type TEXT NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('received', 'processed', 'skipped', 'failed')),
            detail TEXT,
            received_at INTEGER NOT NULL,
            processed_at INTEGER,
            PRIMARY KEY (provider, event_id)
        );
        CREATE INDEX IF NOT EXISTS idx_webhook_events_received ON webhook_events(received_at);

        -- Operator notifications produced by webhook handlers, delivered after commit.
        CREATE TABLE IF NOT EXISTS notification_outbox (
            id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL,
            kind TEXT NOT NULL CHECK (kind IN ('order_paid', 'payment_failed', 'order_refunded', 'dispute_opened')),
            message TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending' CHECK (status IN ('pending', 'sending', 'sent', 'failed')),
            attempt_count INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            created_at INTEGER NOT NULL,
            claimed_at INTEGER,
            sent_at INTEGER,
            UNIQUE(event_id, kind)
        );
        CREATE INDEX IF NOT EXISTS idx_outbox_deliverable ON notification_outbox(status, created_at);
        "#,
    )?;
    Ok(())
}
