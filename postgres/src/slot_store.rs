//! Slot Store (`spec.md` §4, component 1): durable per-(tenant, resource,
//! start_at) rows with an integer `available_capacity`, the unit of atomicity
//! for the whole engine.

use chrono::{DateTime, Utc};
use reservation_core::ids::{ResourceId, SlotId, TenantId};
use reservation_core::slot::Slot;
use sqlx::{PgPool, Postgres, Row, Transaction};

/// Thin wrapper around a `PgPool` exposing only the Slot Store's contract.
/// Locked reads take an explicit transaction handle (see
/// [`SlotStore::lock_range_for_update`]) because they must participate in the
/// caller's booking transaction; everything else may run against the pool.
#[derive(Clone)]
pub struct SlotStore {
    pool: PgPool,
}

impl SlotStore {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Access the underlying pool (health checks, migrations).
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Non-locking read of slots in `[from, to)` for one resource, used by
    /// resource selection (`spec.md` §4.3 step 3) and the Availability Query.
    /// Never authoritative by itself — the locked read in
    /// [`Self::lock_range_for_update`] is what the Coordinator actually
    /// commits against.
    ///
    /// # Errors
    ///
    /// Returns a `sqlx::Error` if the query fails.
    pub async fn read_range(
        &self,
        tenant_id: TenantId,
        resource_id: ResourceId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Slot>, sqlx::Error> {
        let rows = sqlx::query(
            r"
            SELECT id, tenant_id, resource_id, start_at, end_at, available_capacity
            FROM timeslots
            WHERE tenant_id = $1 AND resource_id = $2 AND start_at >= $3 AND start_at < $4
            ORDER BY start_at ASC
            ",
        )
        .bind(tenant_id.0)
        .bind(resource_id.0)
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_slot).collect())
    }

    /// Non-locking read of slots by id, used to resolve an explicit
    /// `timeslot_ids` selector to a resource and a `start_at` sequence before
    /// the Coordinator opens its write transaction.
    ///
    /// # Errors
    ///
    /// Returns a `sqlx::Error` if the query fails.
    pub async fn read_by_ids(&self, ids: &[SlotId]) -> Result<Vec<Slot>, sqlx::Error> {
        let raw_ids: Vec<i64> = ids.iter().map(|id| id.0).collect();
        let rows = sqlx::query(
            r"
            SELECT id, tenant_id, resource_id, start_at, end_at, available_capacity
            FROM timeslots
            WHERE id = ANY($1)
            ORDER BY start_at ASC
            ",
        )
        .bind(&raw_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(row_to_slot).collect())
    }

    /// Lock the slots at the given `start_at` instants for one resource, in
    /// ascending `start_at` order, within `tx`.
    ///
    /// The deterministic `ORDER BY start_at ASC` lock order (`spec.md` §4.3
    /// step 4, §9 "Deterministic lock order") is what prevents an ABBA
    /// deadlock between two overlapping multi-slot bookings: every caller
    /// acquires row locks in the same global order, so no cycle can form.
    ///
    /// # Errors
    ///
    /// Returns a `sqlx::Error` if the query fails (including a serialization
    /// failure or deadlock, which the caller retries per `spec.md` §4.3 step
    /// 10).
    pub async fn lock_range_for_update(
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: TenantId,
        resource_id: ResourceId,
        starts: &[DateTime<Utc>],
    ) -> Result<Vec<Slot>, sqlx::Error> {
        let rows = sqlx::query(
            r"
            SELECT id, tenant_id, resource_id, start_at, end_at, available_capacity
            FROM timeslots
            WHERE tenant_id = $1 AND resource_id = $2 AND start_at = ANY($3)
            ORDER BY start_at ASC
            FOR UPDATE
            ",
        )
        .bind(tenant_id.0)
        .bind(resource_id.0)
        .bind(starts)
        .fetch_all(&mut **tx)
        .await?;

        Ok(rows.iter().map(row_to_slot).collect())
    }

    /// Decrement `available_capacity` by 1 for every id in `ids`, but only for
    /// rows that still have capacity. Returns the number of rows actually
    /// updated; the caller must assert this equals `ids.len()` (`spec.md`
    /// §4.3 step 5).
    ///
    /// # Errors
    ///
    /// Returns a `sqlx::Error` if the query fails.
    pub async fn decrement_capacity(
        tx: &mut Transaction<'_, Postgres>,
        ids: &[SlotId],
    ) -> Result<u64, sqlx::Error> {
        let raw_ids: Vec<i64> = ids.iter().map(|id| id.0).collect();
        let result = sqlx::query(
            r"
            UPDATE timeslots
            SET available_capacity = available_capacity - 1
            WHERE id = ANY($1) AND available_capacity >= 1
            ",
        )
        .bind(&raw_ids)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected())
    }

    /// Increment `available_capacity` by 1 for every id in `ids` (cancellation
    /// path, `spec.md` §4.3 "Cancellation").
    ///
    /// # Errors
    ///
    /// Returns a `sqlx::Error` if the query fails.
    pub async fn increment_capacity(
        tx: &mut Transaction<'_, Postgres>,
        ids: &[SlotId],
    ) -> Result<u64, sqlx::Error> {
        let raw_ids: Vec<i64> = ids.iter().map(|id| id.0).collect();
        let result = sqlx::query(
            r"
            UPDATE timeslots
            SET available_capacity = available_capacity + 1
            WHERE id = ANY($1)
            ",
        )
        .bind(&raw_ids)
        .execute(&mut **tx)
        .await?;

        Ok(result.rows_affected())
    }

    /// Insert a freshly compiled slot. Used only by the Schedule Compiler.
    /// Returns `None` if a slot at the same `(tenant, resource, start_at)`
    /// already existed (no-op, not an error).
    ///
    /// # Errors
    ///
    /// Returns a `sqlx::Error` if the insert fails.
    pub async fn insert(
        tx: &mut Transaction<'_, Postgres>,
        slot: &Slot,
    ) -> Result<Option<SlotId>, sqlx::Error> {
        let row = sqlx::query(
            r"
            INSERT INTO timeslots (tenant_id, resource_id, start_at, end_at, available_capacity)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (tenant_id, resource_id, start_at) DO NOTHING
            RETURNING id
            ",
        )
        .bind(slot.tenant_id.0)
        .bind(slot.resource_id.0)
        .bind(slot.start_at)
        .bind(slot.end_at)
        .bind(slot.available_capacity)
        .fetch_optional(&mut **tx)
        .await?;

        Ok(row.map(|r| SlotId(r.get::<i64, _>("id"))))
    }

    /// Delete a slot by id. The Schedule Compiler only ever calls this for
    /// slots whose `available_capacity == resource.capacity` (`spec.md`
    /// §4.1 step 3); booked inventory is never destroyed here.
    ///
    /// # Errors
    ///
    /// Returns a `sqlx::Error` if the delete fails.
    pub async fn delete(tx: &mut Transaction<'_, Postgres>, id: SlotId) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM timeslots WHERE id = $1")
            .bind(id.0)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }

    /// Update only the capacity column of an existing slot (e.g. a resource's
    /// configured capacity changed).
    ///
    /// # Errors
    ///
    /// Returns a `sqlx::Error` if the update fails.
    pub async fn update_capacity(
        tx: &mut Transaction<'_, Postgres>,
        id: SlotId,
        available_capacity: i32,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE timeslots SET available_capacity = $1 WHERE id = $2")
            .bind(available_capacity)
            .bind(id.0)
            .execute(&mut **tx)
            .await?;
        Ok(())
    }
}

fn row_to_slot(row: &sqlx::postgres::PgRow) -> Slot {
    Slot {
        id: Some(SlotId(row.get::<i64, _>("id"))),
        tenant_id: TenantId(row.get::<i64, _>("tenant_id")),
        resource_id: ResourceId(row.get::<i64, _>("resource_id")),
        start_at: row.get("start_at"),
        end_at: row.get("end_at"),
        available_capacity: row.get("available_capacity"),
    }
}
