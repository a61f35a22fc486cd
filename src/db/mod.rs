mod from_row;
mod schema;
pub mod queries;

pub use schema::init_db;

use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::clock::Clock;
use crate::config::CheckoutSettings;
use crate::notify::Notifier;
use crate::orders::OrdersApiClient;
use crate::payments::PaymentProcessor;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Shared state for every handler.
#[derive(Clone)]
pub struct AppState {
    /// Webhook ledger and notification outbox
    pub db: DbPool,
    pub processor: Arc<dyn PaymentProcessor>,
    pub orders: Arc<OrdersApiClient>,
    pub notifier: Arc<dyn Notifier>,
    pub clock: Arc<dyn Clock>,
    pub checkout: CheckoutSettings,
    /// Shown in operator notifications and `/health`
    pub site_name: String,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    let manager = SqliteConnectionManager::file(database_path)
        .with_init(|conn| conn.execute_batch("PRAGMA busy_timeout = 5000;"));
    Pool::builder().max_size(10).build(manager)
}
