use axum::Router;
use clap::Parser;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use std::sync::Arc;
use std::time::Duration;

use auditflow::config::Config;
use auditflow::db::{create_pool, init_db, queries, AppState};
use auditflow::handlers;
use auditflow::payments::StripeClient;

#[derive(Parser, Debug)]
#[command(name = "auditflow")]
#[command(about = "Audit purchase and payment reconciliation service")]
struct Cli {
    /// Delete the database on exit (dev mode only, useful for fresh starts)
    #[arg(long)]
    ephemeral: bool,
}

/// Spawns a background task that periodically purges old webhook events.
/// These rows only exist for replay prevention; the gateway stops retrying
/// after a few days, so anything past the retention window is dead weight.
fn spawn_cleanup_task(state: AppState, retention_days: i64) {
    tokio::spawn(async move {
        let interval = Duration::from_secs(60 * 60); // hourly

        loop {
            tokio::time::sleep(interval).await;

            match state.db.get() {
                Ok(conn) => match queries::purge_old_webhook_events(&conn, retention_days) {
                    Ok(count) => {
                        if count > 0 {
                            tracing::debug!("Purged {} old webhook events", count);
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to purge webhook events: {}", e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to get db connection for cleanup: {}", e);
                }
            }
        }
    });

    tracing::info!("Background webhook-event purge task started (runs hourly)");
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "auditflow=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();

    if config.dev_mode {
        tracing::info!("Running in DEVELOPMENT mode");
    }
    if config.stripe.secret_key.is_empty() {
        tracing::warn!("STRIPE_SECRET_KEY is not set; checkout initiation will fail");
    }
    if config.stripe.webhook_secret.is_empty() {
        tracing::warn!("STRIPE_WEBHOOK_SECRET is not set; all webhooks will be rejected");
    }

    // Create database connection pool and initialize the schema
    let db_pool = create_pool(&config.database_path).expect("Failed to create database pool");
    {
        let conn = db_pool.get().expect("Failed to get connection");
        init_db(&conn).expect("Failed to initialize database");
    }

    let state = AppState {
        db: db_pool,
        gateway: Arc::new(StripeClient::new(&config.stripe)),
        base_url: config.base_url.clone(),
        home_url: config.home_url.clone(),
        audit_price_cents: config.audit_price_cents,
        currency: config.currency.clone(),
        confirm_recheck: Duration::from_millis(config.confirm_recheck_ms),
        admin_api_key: config.admin_api_key.clone(),
    };

    // Start background purge of the webhook replay-prevention table
    if config.webhook_event_retention_days > 0 {
        spawn_cleanup_task(state.clone(), config.webhook_event_retention_days);
    }

    // Build the application router
    let mut app = Router::new()
        // Public endpoints (no auth)
        .merge(handlers::public::router(config.rate_limit))
        // Webhook endpoints (signature auth)
        .merge(handlers::webhooks::router());

    // Internal dashboard API (admin key auth), only when a key is configured
    if state.admin_api_key.is_some() {
        app = app.merge(handlers::internal::router(state.clone()));
        tracing::info!("Internal dashboard API enabled");
    }

    let app = app.layer(TraceLayer::new_for_http()).with_state(state);

    // Start the server
    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    let cleanup_on_exit = cli.ephemeral && config.dev_mode;
    let db_path = config.database_path.clone();

    if cleanup_on_exit {
        tracing::info!("EPHEMERAL MODE: database will be deleted on exit");
    }

    tracing::info!("auditflow server listening on {}", addr);

    // Run server with graceful shutdown.
    // connect_info enables IP-based rate limiting.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .expect("Failed to start server");

    // Cleanup on exit if ephemeral mode
    if cleanup_on_exit {
        tracing::info!("Cleaning up ephemeral database...");
        if let Err(e) = std::fs::remove_file(&db_path) {
            tracing::warn!("Failed to remove {}: {}", db_path, e);
        } else {
            tracing::info!("Removed {}", db_path);
        }
        // Also remove WAL and SHM files if they exist
        let _ = std::fs::remove_file(format!("{}-wal", db_path));
        let _ = std::fs::remove_file(format!("{}-shm", db_path));
    }
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("Shutdown signal received, stopping server...");
}
