use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use boxoffice::clock::SystemClock;
use boxoffice::config::Config;
use boxoffice::db::{AppState, create_pool, init_db, queries};
use boxoffice::handlers;
use boxoffice::notify::notifier_from_settings;
use boxoffice::orders::OrdersApiClient;
use boxoffice::outbox::{self, MAX_DELIVERY_ATTEMPTS};
use boxoffice::payments::StripeClient;

#[derive(Parser, Debug)]
#[command(name = "boxoffice")]
#[command(about = "Checkout core for a ticket storefront")]
struct Cli {
    /// Deliver pending operator notifications once and exit
    #[arg(long)]
    retry_notifications: bool,

    /// Delete webhook ledger rows older than WEBHOOK_EVENT_RETENTION_DAYS and exit
    #[arg(long)]
    purge_webhook_events: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "boxoffice=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }
    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {}", e);
        std::process::exit(1);
    }

    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let processor = StripeClient::new(&config.stripe).expect("Failed to create Stripe client");
    let orders = OrdersApiClient::new(&config.orders).expect("Failed to create orders client");
    let notifier = notifier_from_settings(&config.notify).expect("Failed to create notifier");

    let state = AppState {
        db: db_pool,
        processor: Arc::new(processor),
        orders: Arc::new(orders),
        notifier,
        clock: Arc::new(SystemClock),
        checkout: config.checkout.clone(),
        site_name: config.site_name.clone(),
    };

    if cli.purge_webhook_events {
        let conn = state.db.get().expect("Failed to get connection for purge");
        match queries::purge_old_webhook_events(&conn, config.webhook_event_retention_days) {
            Ok(count) => println!(
                "Purged {} webhook events older than {} days",
                count, config.webhook_event_retention_days
            ),
            Err(e) => {
                eprintln!("Failed to purge webhook events: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    if cli.retry_notifications {
        match outbox::deliver_pending(
            &state.db,
            state.notifier.as_ref(),
            None,
            MAX_DELIVERY_ATTEMPTS,
        )
        .await
        {
            Ok(report) => println!(
                "Notifications: {} sent, {} will retry, {} failed, {} skipped",
                report.sent, report.retrying, report.failed, report.skipped
            ),
            Err(e) => {
                eprintln!("Notification delivery failed: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    if config.outbox_retry_interval_secs > 0 {
        outbox::spawn_retry_task(
            state.clone(),
            Duration::from_secs(config.outbox_retry_interval_secs),
        );
    }

    let app = Router::new()
        .merge(handlers::router(config.checkout_rate_limit_rpm))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!(
        site = %config.site_name,
        base_url = %config.checkout.base_url,
        "boxoffice listening on {}",
        addr
    );

    // Connect info is required for per-IP rate limiting
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
