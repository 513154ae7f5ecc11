//! Outbox Store — the persistence half of the Outbox Dispatcher
//! (`spec.md` §4.4). The claim-and-dispatch loop itself lives in
//! `reservation-runtime`; this module only knows how to talk to
//! `outbox_events`.

use reservation_core::ids::{BookingId, OutboxEventId, TenantId};
use reservation_core::outbox::{OutboxEvent, OutboxEventType, OutboxStatus};
use sqlx::{PgPool, Postgres, Row, Transaction};

/// Append one outbox event within the caller's transaction. Called from the
/// Booking Coordinator so the event becomes visible to the dispatcher only
/// after (and if) the enclosing transaction commits (`spec.md` §5 ordering
/// guarantee (b)).
///
/// # Errors
///
/// Returns a `sqlx::Error` if the insert fails.
pub async fn append(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: TenantId,
    aggregate_id: BookingId,
    event_type: OutboxEventType,
    payload: &serde_json::Value,
    trace_id: Option<&str>,
) -> Result<OutboxEventId, sqlx::Error> {
    let id = OutboxEventId::new();
    sqlx::query(
        r"
        INSERT INTO outbox_events
            (id, tenant_id, aggregate_id, event_type, payload, status, attempts, next_attempt_at, trace_id, created_at)
        VALUES ($1, $2, $3, $4, $5, 'pending', 0, NOW(), $6, NOW())
        ",
    )
    .bind(id.0)
    .bind(tenant_id.0)
    .bind(aggregate_id.0)
    .bind(event_type.as_str())
    .bind(payload)
    .bind(trace_id)
    .execute(&mut **tx)
    .await?;

    Ok(id)
}

/// Claim up to `batch` pending events whose `next_attempt_at <= now`, skipping
/// rows locked by other workers (`spec.md` §4.4: `SKIP LOCKED`), and at most
/// one in-flight event per `(tenant, aggregate_id)` to preserve per-aggregate
/// ordering.
///
/// # Errors
///
/// Returns a `sqlx::Error` if the query fails.
pub async fn claim_batch(pool: &PgPool, batch: i64) -> Result<Vec<OutboxEvent>, sqlx::Error> {
    let rows = sqlx::query(
        r"
        WITH candidates AS (
            SELECT DISTINCT ON (tenant_id, aggregate_id) id
            FROM outbox_events
            WHERE status = 'pending' AND next_attempt_at <= NOW()
            ORDER BY tenant_id, aggregate_id, next_attempt_at ASC
        )
        UPDATE outbox_events
        SET status = 'processing', claimed_at = NOW()
        WHERE id IN (
            SELECT id FROM outbox_events
            WHERE id IN (SELECT id FROM candidates)
            ORDER BY next_attempt_at ASC
            LIMIT $1
            FOR UPDATE SKIP LOCKED
        )
        RETURNING id, tenant_id, aggregate_id, event_type, payload, status, attempts,
                  next_attempt_at, last_error, trace_id, created_at
        ",
    )
    .bind(batch)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_event).collect())
}

/// Mark an event delivered successfully.
///
/// # Errors
///
/// Returns a `sqlx::Error` if the update fails.
pub async fn mark_completed(pool: &PgPool, id: OutboxEventId) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE outbox_events SET status = 'completed', processed_at = NOW() WHERE id = $1")
        .bind(id.0)
        .execute(pool)
        .await?;
    Ok(())
}

/// Record a failed delivery attempt. If `attempts + 1 < max_attempts`, the
/// event returns to `pending` at `now + backoff`; otherwise it moves to
/// `dead_letter` (`spec.md` §4.4).
///
/// # Errors
///
/// Returns a `sqlx::Error` if the update fails.
pub async fn record_failure(
    pool: &PgPool,
    id: OutboxEventId,
    attempts_before: i32,
    max_attempts: i32,
    backoff: std::time::Duration,
    error: &str,
) -> Result<OutboxStatus, sqlx::Error> {
    let attempts_after = attempts_before + 1;
    let status = if attempts_after >= max_attempts {
        OutboxStatus::DeadLetter
    } else {
        OutboxStatus::Failed
    };

    match status {
        OutboxStatus::DeadLetter => {
            sqlx::query(
                r"
                UPDATE outbox_events
                SET status = 'dead_letter', attempts = $2, last_error = $3
                WHERE id = $1
                ",
            )
            .bind(id.0)
            .bind(attempts_after)
            .bind(error)
            .execute(pool)
            .await?;

            tracing::warn!(
                outbox_id = %id,
                attempts = attempts_after,
                error = error,
                "outbox event moved to dead letter"
            );
            metrics::counter!("outbox.dead_letter").increment(1);
        }
        _ => {
            sqlx::query(
                r"
                UPDATE outbox_events
                SET status = 'pending', attempts = $2, next_attempt_at = NOW() + $3::interval, last_error = $4
                WHERE id = $1
                ",
            )
            .bind(id.0)
            .bind(attempts_after)
            .bind(format!("{} milliseconds", backoff.as_millis()))
            .bind(error)
            .execute(pool)
            .await?;

            metrics::counter!("outbox.retry").increment(1);
        }
    }

    Ok(status)
}

/// Mark an event `dead_letter` immediately because no handler is registered
/// for its type (`spec.md` §4.4: "mark `dead_letter` with reason
/// `NO_HANDLER`... never silently drop").
///
/// # Errors
///
/// Returns a `sqlx::Error` if the update fails.
pub async fn mark_no_handler(pool: &PgPool, id: OutboxEventId) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"
        UPDATE outbox_events
        SET status = 'dead_letter', last_error = 'NO_HANDLER'
        WHERE id = $1
        ",
    )
    .bind(id.0)
    .execute(pool)
    .await?;

    tracing::warn!(outbox_id = %id, "outbox event dead-lettered: no handler registered");
    metrics::counter!("outbox.no_handler").increment(1);
    Ok(())
}

/// Reclaim events stuck in `processing` longer than `lease`, returning them
/// to `pending` (`spec.md` §4.4 "lease-timeout sweeper ... crash recovery").
/// Returns the number of events reclaimed.
///
/// # Errors
///
/// Returns a `sqlx::Error` if the update fails.
pub async fn sweep_expired_leases(
    pool: &PgPool,
    lease: std::time::Duration,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r"
        UPDATE outbox_events
        SET status = 'pending'
        WHERE status = 'processing' AND claimed_at <= NOW() - $1::interval
        ",
    )
    .bind(format!("{} milliseconds", lease.as_millis()))
    .execute(pool)
    .await?;

    let count = result.rows_affected();
    if count > 0 {
        tracing::info!(reclaimed = count, "outbox lease sweeper reclaimed stuck events");
    }
    Ok(count)
}

/// Fetch a single event by id (used by handler dispatch and tests).
///
/// # Errors
///
/// Returns a `sqlx::Error` if the query fails.
pub async fn get(pool: &PgPool, id: OutboxEventId) -> Result<Option<OutboxEvent>, sqlx::Error> {
    let row = sqlx::query(
        r"
        SELECT id, tenant_id, aggregate_id, event_type, payload, status, attempts,
               next_attempt_at, last_error, trace_id, created_at
        FROM outbox_events WHERE id = $1
        ",
    )
    .bind(id.0)
    .fetch_optional(pool)
    .await?;

    Ok(row.as_ref().map(row_to_event))
}

/// List events currently in `dead_letter`, oldest first, for operator review.
///
/// # Errors
///
/// Returns a `sqlx::Error` if the query fails.
pub async fn list_dead_letter(pool: &PgPool, limit: i64) -> Result<Vec<OutboxEvent>, sqlx::Error> {
    let rows = sqlx::query(
        r"
        SELECT id, tenant_id, aggregate_id, event_type, payload, status, attempts,
               next_attempt_at, last_error, trace_id, created_at
        FROM outbox_events
        WHERE status = 'dead_letter'
        ORDER BY created_at ASC
        LIMIT $1
        ",
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows.iter().map(row_to_event).collect())
}

fn row_to_event(row: &sqlx::postgres::PgRow) -> OutboxEvent {
    let event_type_str: String = row.get("event_type");
    let status_str: String = row.get("status");
    OutboxEvent {
        id: OutboxEventId(row.get("id")),
        tenant_id: TenantId(row.get::<i64, _>("tenant_id")),
        aggregate_id: BookingId(row.get("aggregate_id")),
        event_type: OutboxEventType::parse(&event_type_str)
            .unwrap_or(OutboxEventType::NotificationRequested),
        payload: row.get("payload"),
        status: OutboxStatus::parse(&status_str).unwrap_or(OutboxStatus::Failed),
        attempts: row.get("attempts"),
        next_attempt_at: row.get("next_attempt_at"),
        last_error: row.get("last_error"),
        trace_id: row.get("trace_id"),
        created_at: row.get("created_at"),
    }
}
