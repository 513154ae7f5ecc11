//! Idempotency Store (`spec.md` §4, component 3).
//!
//! The `(tenant, key)` unique constraint is the serialization mechanism
//! (`spec.md` §9 "Idempotency as a primary key"): the first `INSERT` into
//! `idempotency_keys` wins, and every concurrent caller with the same key
//! becomes an observer of that row's eventual outcome rather than racing to
//! decide it themselves.

use chrono::{DateTime, Duration, Utc};
use reservation_core::ids::TenantId;
use reservation_core::idempotency::IdempotencyStatus;
use sqlx::{Postgres, Row, Transaction};

/// Outcome of the idempotency probe (`spec.md` §4.3 step 1).
#[derive(Debug, Clone)]
pub enum ProbeOutcome {
    /// No row existed; this transaction now owns the `in_progress` row it
    /// just inserted and should proceed with booking logic.
    Claimed,
    /// A row existed with the same fingerprint and `status = succeeded`;
    /// replay the stored response.
    ReplaySucceeded(serde_json::Value),
    /// A row existed with the same fingerprint and `status = failed`; replay
    /// the stored error code.
    ReplayFailed(String),
    /// A row existed with the same fingerprint and `status = in_progress`;
    /// the caller must retry later.
    InProgress,
    /// A row existed with a *different* fingerprint.
    Conflict,
}

/// Probe-and-claim an idempotency key within `tx`.
///
/// # Errors
///
/// Returns a `sqlx::Error` if either query fails.
pub async fn probe(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: TenantId,
    key: &str,
    request_sha256: &str,
    ttl: Duration,
) -> Result<ProbeOutcome, sqlx::Error> {
    let inserted = sqlx::query(
        r"
        INSERT INTO idempotency_keys (tenant_id, key, request_sha256, status, created_at, expires_at)
        VALUES ($1, $2, $3, 'in_progress', NOW(), NOW() + $4::interval)
        ON CONFLICT (tenant_id, key) DO NOTHING
        RETURNING tenant_id
        ",
    )
    .bind(tenant_id.0)
    .bind(key)
    .bind(request_sha256)
    .bind(format!("{} seconds", ttl.num_seconds()))
    .fetch_optional(&mut **tx)
    .await?;

    if inserted.is_some() {
        return Ok(ProbeOutcome::Claimed);
    }

    // Someone else's row already exists; inspect it.
    let row = sqlx::query(
        r"
        SELECT request_sha256, status, response_json, error_code
        FROM idempotency_keys
        WHERE tenant_id = $1 AND key = $2
        FOR UPDATE
        ",
    )
    .bind(tenant_id.0)
    .bind(key)
    .fetch_one(&mut **tx)
    .await?;

    let existing_fingerprint: String = row.get("request_sha256");
    if existing_fingerprint != request_sha256 {
        return Ok(ProbeOutcome::Conflict);
    }

    let status_str: String = row.get("status");
    match IdempotencyStatus::parse(&status_str) {
        IdempotencyStatus::InProgress => Ok(ProbeOutcome::InProgress),
        IdempotencyStatus::Succeeded => {
            let response: serde_json::Value = row
                .get::<Option<serde_json::Value>, _>("response_json")
                .unwrap_or(serde_json::Value::Null);
            Ok(ProbeOutcome::ReplaySucceeded(response))
        }
        IdempotencyStatus::Failed => {
            let code: String = row
                .get::<Option<String>, _>("error_code")
                .unwrap_or_else(|| "internal".to_string());
            Ok(ProbeOutcome::ReplayFailed(code))
        }
    }
}

/// Finalize a claimed key as `succeeded`, storing the replayable response
/// (`spec.md` §4.3 step 8: `expires_at = now + 24h`, configurable via
/// `IDEMPOTENCY_TTL_SECONDS`).
///
/// # Errors
///
/// Returns a `sqlx::Error` if the update fails.
pub async fn finalize_succeeded(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: TenantId,
    key: &str,
    response: &serde_json::Value,
    ttl: Duration,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"
        UPDATE idempotency_keys
        SET status = 'succeeded', response_json = $3, expires_at = NOW() + $4::interval
        WHERE tenant_id = $1 AND key = $2
        ",
    )
    .bind(tenant_id.0)
    .bind(key)
    .bind(response)
    .bind(format!("{} seconds", ttl.num_seconds()))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Finalize a claimed key as `failed`, storing the stable error code so
/// replays observe the same outcome until `expires_at` (`spec.md` §7).
///
/// # Errors
///
/// Returns a `sqlx::Error` if the update fails.
pub async fn finalize_failed(
    tx: &mut Transaction<'_, Postgres>,
    tenant_id: TenantId,
    key: &str,
    error_code: &str,
    ttl: Duration,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"
        UPDATE idempotency_keys
        SET status = 'failed', error_code = $3, expires_at = NOW() + $4::interval
        WHERE tenant_id = $1 AND key = $2
        ",
    )
    .bind(tenant_id.0)
    .bind(key)
    .bind(error_code)
    .bind(format!("{} seconds", ttl.num_seconds()))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

/// Purge expired idempotency records. Intended to run on a periodic
/// housekeeping interval, separate from the request path.
///
/// # Errors
///
/// Returns a `sqlx::Error` if the delete fails.
pub async fn purge_expired(pool: &sqlx::PgPool, now: DateTime<Utc>) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM idempotency_keys WHERE expires_at <= $1")
        .bind(now)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
