//! boxoffice - checkout core for a ticket storefront
//!
//! Server-side ticket pricing, idempotent payment-session creation, payment
//! verification, and signed webhook handling with a notification outbox.

pub mod checkout;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod models;
pub mod notify;
pub mod orders;
pub mod outbox;
pub mod payments;
pub mod pricing;
pub mod rate_limit;
