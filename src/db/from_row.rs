//! Row mapping for the ledger and outbox tables.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::{OutboxNotification, WebhookEventRecord};

/// Parse a text column into an enum, surfacing bad values as a column type error.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub const WEBHOOK_EVENT_COLS: &str =
    "provider, event_id, event_type, status, detail, received_at, processed_at";

pub const NOTIFICATION_COLS: &str = "id, event_id, kind, message, status, attempt_count, last_error, created_at, claimed_at, sent_at";

impl FromRow for WebhookEventRecord {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(WebhookEventRecord {
            provider: row.get(0)?,
            event_id: row.get(1)?,
            event_type: row.get(2)?,
            status: parse_enum(row, 3, "status")?,
            detail: row.get(4)?,
            received_at: row.get(5)?,
            processed_at: row.get(6)?,
        })
    }
}

impl FromRow for OutboxNotification {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(OutboxNotification {
            id: row.get(0)?,
            event_id: row.get(1)?,
            kind: parse_enum(row, 2, "kind")?,
            message: row.get(3)?,
            status: parse_enum(row, 4, "status")?,
            attempt_count: row.get(5)?,
            last_error: row.get(6)?,
            created_at: row.get(7)?,
            claimed_at: row.get(8)?,
            sent_at: row.get(9)?,
        })
    }
}
