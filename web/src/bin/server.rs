//! Reservation Core server process.
//!
//! Brings up the HTTP surface (`reservation_web::handlers::router`), the
//! Outbox Dispatcher and lease sweeper (`reservation_runtime::spawn`), and
//! runs until `SIGINT`/`SIGTERM`, then drains in-flight work before exiting.
//!
//! Exit codes follow `spec.md` §6: 0 normal shutdown, 1 configuration error,
//! 2 database unreachable at startup.

use std::sync::Arc;
use std::time::Duration;

use reservation_core::outbox::OutboxEventType;
use reservation_runtime::{DispatcherConfig, HandlerError, HandlerRegistry, OutboxHandler, RetryPolicy};
use reservation_web::{AppState, Config};
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Logs an outbox payload and reports success. The actual notification/SMS/
/// payment-webhook sinks are out-of-scope external collaborators
/// (`spec.md` §1); this handler is the boundary stub that stands in for them
/// so the dispatcher has something to deliver to and `outbox_events` rows
/// still reach `completed` rather than dead-lettering with `NO_HANDLER`.
struct LoggingHandler {
    event_type: OutboxEventType,
}

#[async_trait::async_trait]
impl OutboxHandler for LoggingHandler {
    async fn handle(&self, payload: &serde_json::Value) -> Result<(), HandlerError> {
        tracing::info!(event_type = self.event_type.as_str(), %payload, "dispatched outbox event");
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,reservation_web=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            tracing::error!(error = %err, "failed to load configuration");
            std::process::exit(1);
        }
    };

    let pool = match PgPoolOptions::new()
        .min_connections(config.db_pool_min)
        .max_connections(config.db_pool_max)
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => pool,
        Err(err) => {
            tracing::error!(error = %err, "database unreachable at startup");
            std::process::exit(2);
        }
    };

    if let Err(err) = sqlx::migrate!("../migrations").run(&pool).await {
        tracing::error!(error = %err, "failed to run migrations");
        std::process::exit(2);
    }

    let state = AppState::new(pool.clone(), &config);

    let handlers = HandlerRegistry::new()
        .with_handler(OutboxEventType::BookingCreated, Arc::new(LoggingHandler { event_type: OutboxEventType::BookingCreated }))
        .with_handler(OutboxEventType::BookingCancelled, Arc::new(LoggingHandler { event_type: OutboxEventType::BookingCancelled }))
        .with_handler(OutboxEventType::PaymentCompleted, Arc::new(LoggingHandler { event_type: OutboxEventType::PaymentCompleted }))
        .with_handler(OutboxEventType::NotificationRequested, Arc::new(LoggingHandler { event_type: OutboxEventType::NotificationRequested }));

    let dispatcher_config = DispatcherConfig {
        poll_interval: Duration::from_millis(config.outbox_poll_ms),
        batch_size: i64::from(config.outbox_batch),
        handler_timeout: Duration::from_secs(10),
        retry_policy: RetryPolicy { max_attempts: i32::try_from(config.outbox_max_attempts).unwrap_or(8), ..RetryPolicy::default() },
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let (dispatcher_task, sweeper_task) = reservation_runtime::spawn(
        pool,
        handlers,
        dispatcher_config,
        Duration::from_secs(30),
        Duration::from_secs(10),
        shutdown_rx,
    );

    let app = reservation_web::router(state);
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err) => {
            tracing::error!(error = %err, addr, "failed to bind HTTP listener");
            std::process::exit(1);
        }
    };

    tracing::info!(addr, "reservation-server listening");

    let server = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    if let Err(err) = server.await {
        tracing::error!(error = %err, "HTTP server exited with an error");
    }

    let _ = shutdown_tx.send(true);
    let _ = dispatcher_task.await;
    let _ = sweeper_task.await;

    tracing::info!("shutdown complete");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let Ok(mut signal) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) else {
            return;
        };
        signal.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
