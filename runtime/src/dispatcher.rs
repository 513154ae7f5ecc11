//! Outbox Dispatcher (`spec.md` §4.4): the claim-and-deliver loop that turns
//! durable `outbox_events` rows into actual side effects.
//!
//! Grounded on the teacher's `Store::retry_operation` poll-and-retry shape
//! (`runtime/src/lib.rs`) and `postgres/src/dead_letter_queue.rs`'s
//! terminal-state handling, adapted from a single in-process effect queue to
//! a horizontally-scalable, `SKIP LOCKED`-backed claim loop over a shared
//! Postgres table. Any number of dispatcher processes can run
//! [`Dispatcher::run_forever`] concurrently against the same database.

use std::sync::Arc;
use std::time::Duration;

use reservation_core::ids::OutboxEventId;
use reservation_core::outbox::OutboxEvent;
use reservation_postgres::outbox_store;
use sqlx::PgPool;

use crate::handler::HandlerRegistry;
use crate::retry::RetryPolicy;

/// Tunables for [`Dispatcher::run_forever`].
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// How often to poll for newly-claimable events when the last poll found
    /// nothing (`spec.md` §4.4 default 1s).
    pub poll_interval: Duration,
    /// Maximum number of events claimed per poll.
    pub batch_size: i64,
    /// Wall-clock budget given to a single handler invocation before it is
    /// treated as a failure (`spec.md` §4.4 default 10s).
    pub handler_timeout: Duration,
    /// Retry/backoff policy applied to failed deliveries.
    pub retry_policy: RetryPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            batch_size: 50,
            handler_timeout: Duration::from_secs(10),
            retry_policy: RetryPolicy::default(),
        }
    }
}

/// The claim-and-deliver loop.
pub struct Dispatcher {
    pool: PgPool,
    handlers: HandlerRegistry,
    config: DispatcherConfig,
}

impl Dispatcher {
    /// Build a dispatcher over `pool`, routing events through `handlers`.
    #[must_use]
    pub const fn new(pool: PgPool, handlers: HandlerRegistry, config: DispatcherConfig) -> Self {
        Self { pool, handlers, config }
    }

    /// Run the claim-and-deliver loop until `shutdown` resolves.
    ///
    /// Each iteration claims up to `config.batch_size` pending events
    /// (`reservation_postgres::outbox_store::claim_batch`, which uses
    /// `SKIP LOCKED` so multiple dispatcher instances never contend on the
    /// same row), dispatches each to its registered handler with a timeout,
    /// and records the outcome. When a poll claims nothing, it sleeps for
    /// `config.poll_interval` before trying again.
    pub async fn run_forever(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                return;
            }

            let claimed = match outbox_store::claim_batch(&self.pool, self.config.batch_size).await
            {
                Ok(events) => events,
                Err(err) => {
                    tracing::error!(error = %err, "failed to claim outbox events");
                    metrics::counter!("outbox.claim_error").increment(1);
                    Vec::new()
                }
            };

            if claimed.is_empty() {
                tokio::select! {
                    () = tokio::time::sleep(self.config.poll_interval) => {},
                    _ = shutdown.changed() => {},
                }
                continue;
            }

            for event in claimed {
                self.dispatch_one(event).await;
            }
        }
    }

    /// Deliver a single claimed event and record the outcome.
    async fn dispatch_one(&self, event: OutboxEvent) {
        let Some(handler) = self.handlers.get(event.event_type) else {
            if let Err(err) = outbox_store::mark_no_handler(&self.pool, event.id).await {
                tracing::error!(error = %err, outbox_id = %event.id, "failed to mark NO_HANDLER");
            }
            return;
        };

        let outcome = tokio::time::timeout(
            self.config.handler_timeout,
            handler.handle(&event.payload),
        )
        .await;

        match outcome {
            Ok(Ok(())) => {
                if let Err(err) = outbox_store::mark_completed(&self.pool, event.id).await {
                    tracing::error!(error = %err, outbox_id = %event.id, "failed to mark completed");
                }
                metrics::counter!(
                    "outbox.delivered",
                    "event_type" => event.event_type.as_str()
                )
                .increment(1);
            }
            Ok(Err(handler_err)) => {
                self.record_failure(event.id, event.attempts, &handler_err.to_string())
                    .await;
            }
            Err(_elapsed) => {
                self.record_failure(
                    event.id,
                    event.attempts,
                    &format!(
                        "handler exceeded {}s timeout",
                        self.config.handler_timeout.as_secs()
                    ),
                )
                .await;
            }
        }
    }

    async fn record_failure(&self, id: OutboxEventId, attempts_before: i32, error: &str) {
        let backoff = self.config.retry_policy.delay_for_attempt(attempts_before);
        match outbox_store::record_failure(
            &self.pool,
            id,
            attempts_before,
            self.config.retry_policy.max_attempts,
            backoff,
            error,
        )
        .await
        {
            Ok(status) => {
                tracing::warn!(outbox_id = %id, ?status, error, "outbox delivery failed");
            }
            Err(err) => {
                tracing::error!(error = %err, outbox_id = %id, "failed to record delivery failure");
            }
        }
    }
}

/// Run the lease-timeout sweeper until `shutdown` resolves, reclaiming
/// events stuck in `processing` (a dispatcher crashed mid-delivery) back to
/// `pending` (`spec.md` §4.4).
pub async fn run_lease_sweeper(
    pool: PgPool,
    lease: Duration,
    interval: Duration,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            return;
        }

        if let Err(err) = outbox_store::sweep_expired_leases(&pool, lease).await {
            tracing::error!(error = %err, "lease sweeper failed");
        }

        tokio::select! {
            () = tokio::time::sleep(interval) => {},
            _ = shutdown.changed() => {},
        }
    }
}

/// Convenience constructor bundling a dispatcher and its sweeper under one
/// `Arc`, for callers that want to spawn both from `main`.
#[must_use]
pub fn spawn(
    pool: PgPool,
    handlers: HandlerRegistry,
    config: DispatcherConfig,
    lease_timeout: Duration,
    sweep_interval: Duration,
    shutdown: tokio::sync::watch::Receiver<bool>,
) -> (tokio::task::JoinHandle<()>, tokio::task::JoinHandle<()>) {
    let dispatcher = Arc::new(Dispatcher::new(pool.clone(), handlers, config));
    let dispatcher_shutdown = shutdown.clone();
    let dispatcher_task = tokio::spawn(async move {
        dispatcher.run_forever(dispatcher_shutdown).await;
    });

    let sweeper_task = tokio::spawn(async move {
        run_lease_sweeper(pool, lease_timeout, sweep_interval, shutdown).await;
    });

    (dispatcher_task, sweeper_task)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let config = DispatcherConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(1));
        assert_eq!(config.handler_timeout, Duration::from_secs(10));
    }
}
