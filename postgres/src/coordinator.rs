//! Booking Coordinator (`spec.md` §4.3) — the transactional heart of the
//! engine. `create_booking` runs the full ten-step protocol in one database
//! transaction per attempt, retrying the whole attempt end-to-end on a
//! serialization failure or deadlock (`spec.md` §4.3 step 10).

use crate::error::map_sqlx_error;
use crate::idempotency_store::{self, ProbeOutcome};
use crate::outbox_store;
use crate::slot_store::SlotStore;
use chrono::{DateTime, Duration, Utc};
use reservation_core::alignment;
use reservation_core::booking::{
    Booking, BookingItem, BookingResponse, BookingStatus, CreateBookingRequest, SlotSelector,
};
use reservation_core::customer::CustomerFields;
use reservation_core::error::CoreError;
use reservation_core::ids::{BookingId, CustomerId, SlotId, TenantId};
use reservation_core::outbox::{
    confirmation_code, reminder_schedule, BookingEventPayload, OutboxEventType,
};
use reservation_core::resource::Resource;
use reservation_core::service::Service;
use reservation_core::slot::is_contiguous;
use reservation_core::tenant::Tenant;
use sqlx::PgPool;
use std::time::Duration as StdDuration;

/// Maximum number of end-to-end retries for serialization failures/deadlocks
/// (`spec.md` §4.3 step 10: "up to 3 times").
pub const MAX_RETRIES: u32 = 3;
/// Base delay for the exponential backoff between end-to-end retries
/// (`spec.md` §4.3 step 10: "100 ms × 2ⁿ").
pub const RETRY_BASE_DELAY: StdDuration = StdDuration::from_millis(100);

/// The transactional heart of the engine.
pub struct BookingCoordinator {
    pool: PgPool,
    idempotency_ttl: Duration,
}

/// Everything the Coordinator needs about the target tenant/service/resources
/// to process one request, resolved by the caller (typically the web layer,
/// from its own read models) before invoking [`BookingCoordinator::create_booking`].
pub struct BookingContext<'a> {
    /// The tenant the request is scoped to.
    pub tenant: &'a Tenant,
    /// The service being booked.
    pub service: &'a Service,
    /// Resources capable of performing `service`, active and linked, ordered
    /// however the caller likes (the Coordinator re-sorts by id for
    /// deterministic selection).
    pub eligible_resources: &'a [Resource],
}

impl BookingCoordinator {
    /// Construct a coordinator over a connection pool.
    #[must_use]
    pub const fn new(pool: PgPool, idempotency_ttl: Duration) -> Self {
        Self { pool, idempotency_ttl }
    }

    /// Create a booking per the ten-step protocol in `spec.md` §4.3.
    ///
    /// # Errors
    ///
    /// Returns a business [`CoreError`] (surfaced verbatim to the caller) or
    /// an infrastructure [`CoreError`] after retries are exhausted.
    pub async fn create_booking(
        &self,
        ctx: &BookingContext<'_>,
        request: &CreateBookingRequest,
        idempotency_key: &str,
        request_body_json: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<BookingResponse, CoreError> {
        if !reservation_core::idempotency::is_valid_key(idempotency_key) {
            return Err(CoreError::InvalidRequest(
                "Idempotency-Key must be 8-128 characters".to_string(),
            ));
        }

        let fingerprint = reservation_core::idempotency::request_fingerprint(request_body_json);

        let mut attempt = 0u32;
        loop {
            match self
                .try_once(ctx, request, idempotency_key, &fingerprint, now)
                .await
            {
                Ok(outcome) => return outcome,
                Err(sqlx_err) if crate::error::is_retryable(&sqlx_err) && attempt < MAX_RETRIES => {
                    attempt += 1;
                    let delay = RETRY_BASE_DELAY * 2u32.pow(attempt - 1);
                    tracing::warn!(attempt, ?delay, "retrying booking attempt after transient conflict");
                    tokio::time::sleep(delay).await;
                }
                Err(sqlx_err) if crate::error::is_retryable(&sqlx_err) => {
                    return Err(CoreError::ConflictRetryExhausted);
                }
                Err(sqlx_err) => return Err(map_sqlx_error(sqlx_err)),
            }
        }
    }

    /// One attempt of the protocol, inside one transaction. Returns the outer
    /// `Result<BookingResponse, CoreError>` (already finalized/committed) on
    /// success, or a raw `sqlx::Error` if the transaction itself failed
    /// (serialization failure, deadlock, connectivity) and should be retried
    /// or mapped by the caller.
    async fn try_once(
        &self,
        ctx: &BookingContext<'_>,
        request: &CreateBookingRequest,
        idempotency_key: &str,
        fingerprint: &str,
        now: DateTime<Utc>,
    ) -> Result<Result<BookingResponse, CoreError>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // Step 1: idempotency probe.
        match idempotency_store::probe(
            &mut tx,
            request.tenant_id,
            idempotency_key,
            fingerprint,
            self.idempotency_ttl,
        )
        .await?
        {
            ProbeOutcome::ReplaySucceeded(response_json) => {
                tx.commit().await?;
                return Ok(match serde_json::from_value(response_json) {
                    Ok(response) => Ok(response),
                    Err(e) => {
                        tracing::error!(error = %e, "corrupt idempotency replay response");
                        Err(CoreError::Internal(format!("corrupt replay response: {e}")))
                    }
                });
            }
            ProbeOutcome::ReplayFailed(code) => {
                tx.commit().await?;
                return Ok(Err(code_to_error(&code, now)));
            }
            ProbeOutcome::InProgress => {
                tx.rollback().await?;
                return Ok(Err(CoreError::IdempotencyInProgress));
            }
            ProbeOutcome::Conflict => {
                tx.rollback().await?;
                return Ok(Err(CoreError::IdempotencyConflict));
            }
            ProbeOutcome::Claimed => {}
        }

        // From here on, any business-rule failure must still be recorded
        // against the idempotency key and committed, so a replay observes
        // the identical outcome (`spec.md` §7).
        let outcome = self
            .book_slots(&mut tx, ctx, request, idempotency_key, now)
            .await?;

        match outcome {
            Ok(response) => {
                let response_json = serde_json::to_value(&response).unwrap_or(serde_json::Value::Null);
                idempotency_store::finalize_succeeded(
                    &mut tx,
                    request.tenant_id,
                    idempotency_key,
                    &response_json,
                    self.idempotency_ttl,
                )
                .await?;
                tx.commit().await?;
                Ok(Ok(response))
            }
            Err(business_error) => {
                idempotency_store::finalize_failed(
                    &mut tx,
                    request.tenant_id,
                    idempotency_key,
                    business_error.code(),
                    self.idempotency_ttl,
                )
                .await?;
                tx.commit().await?;
                Ok(Err(business_error))
            }
        }
    }

    /// Steps 2-7 of the protocol: align, select resource, lock slots, check
    /// and decrement capacity, persist the booking, emit the outbox event.
    async fn book_slots(
        &self,
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        ctx: &BookingContext<'_>,
        request: &CreateBookingRequest,
        idempotency_key: &str,
        now: DateTime<Utc>,
    ) -> Result<Result<BookingResponse, CoreError>, sqlx::Error> {
        // Step 2/3 combined: resolve the candidate resource and slot starts.
        let resolved = match self.resolve_target(ctx, request).await {
            Ok(resolved) => resolved,
            Err(e) => return Ok(Err(e)),
        };

        let ResolvedTarget { resource, starts, required_slots } = resolved;

        // Step 4: lock the slots in deterministic (start_at ASC) order.
        let locked =
            SlotStore::lock_range_for_update(tx, request.tenant_id, resource.id, &starts).await?;

        if locked.len() != required_slots as usize {
            let missing_start = starts
                .iter()
                .find(|s| !locked.iter().any(|slot| slot.start_at == **s))
                .copied()
                .unwrap_or(starts[0]);
            return Ok(Err(CoreError::SlotNotFound { start_at: missing_start }));
        }
        if !is_contiguous(&locked) {
            return Ok(Err(CoreError::SlotDiscontinuous));
        }

        // Step 5: capacity check & decrement, with one in-transaction retry
        // to disambiguate a stale read from a true sellout (`spec.md` §4.3
        // step 9). Under `SELECT ... FOR UPDATE`, once locked, no concurrent
        // writer can have changed capacity underneath us; this loop runs at
        // most twice in practice.
        for attempt in 0..2 {
            if let Some(sold_out_at) = locked.iter().find(|s| !s.has_capacity()).map(|s| s.start_at) {
                return Ok(Err(CoreError::TimeslotSoldOut { start_at: sold_out_at }));
            }

            let ids: Vec<SlotId> = locked.iter().filter_map(|s| s.id).collect();
            let rows_affected = SlotStore::decrement_capacity(tx, &ids).await?;
            if rows_affected == u64::from(required_slots) {
                break;
            }
            if attempt == 1 {
                return Ok(Err(CoreError::TimeslotSoldOut { start_at: locked[0].start_at }));
            }
        }

        // Step 6: persist booking + items.
        let slot_ids: Vec<SlotId> = locked.iter().filter_map(|s| s.id).collect();
        let customer_id = upsert_customer(tx, request.tenant_id, &request.customer).await?;

        let booking = Booking {
            id: BookingId::new(),
            tenant_id: request.tenant_id,
            customer_id,
            service_id: request.service_id,
            resource_id: resource.id,
            start_at: locked[0].start_at,
            end_at: locked[locked.len() - 1].end_at,
            status: BookingStatus::Confirmed,
            total_price_minor_units: ctx.service.price_minor_units,
            idempotency_key: idempotency_key.to_string(),
            notes: request.notes.clone(),
            created_at: now,
            updated_at: now,
        };
        insert_booking(tx, &booking).await?;

        let items: Vec<BookingItem> = locked
            .iter()
            .zip(slot_ids.iter())
            .map(|(slot, slot_id)| BookingItem {
                booking_id: booking.id,
                slot_id: *slot_id,
                resource_id: resource.id,
                slot_start_at: slot.start_at,
            })
            .collect();
        insert_booking_items(tx, &items).await?;

        // Step 7: emit the outbox event within the same transaction.
        let code = confirmation_code(booking.id, booking.created_at);
        let reminders = reminder_schedule(booking.start_at, &ctx.tenant.reminder_offsets_min, now);
        let payload = BookingEventPayload {
            booking_id: booking.id,
            customer: request.customer.clone(),
            confirmation_code: code,
            reminder_at: reminders,
        };
        let payload_json = serde_json::to_value(&payload).unwrap_or(serde_json::Value::Null);
        outbox_store::append(
            tx,
            request.tenant_id,
            booking.id,
            OutboxEventType::BookingCreated,
            &payload_json,
            None,
        )
        .await?;

        Ok(Ok(BookingResponse { booking, items }))
    }

    /// Resolve the request to a single target resource and the ordered list
    /// of slot starts it needs, per `spec.md` §4.3 step 3 and the §9 Open
    /// Question resolution: an unresolved `resource_hint` is a validation
    /// error, never a silent fallback.
    async fn resolve_target(
        &self,
        ctx: &BookingContext<'_>,
        request: &CreateBookingRequest,
    ) -> Result<ResolvedTarget, CoreError> {
        if !ctx.service.active {
            return Err(CoreError::ServiceInactive);
        }

        match &request.slots {
            SlotSelector::TimeslotIds(ids) => {
                if ids.is_empty() {
                    return Err(CoreError::InvalidRequest("timeslot_ids must not be empty".into()));
                }
                let store = SlotStore::new(self.pool.clone());
                let mut slots = store
                    .read_by_ids(ids)
                    .await
                    .map_err(map_sqlx_error)?;
                slots.sort_by_key(|s| s.start_at);
                // `read_by_ids` silently drops ids with no matching row; a short
                // result means at least one requested slot doesn't exist, which
                // `required_slots` below must never silently shrink around.
                if slots.len() != ids.len() {
                    return Err(CoreError::SlotNotFound {
                        start_at: slots.first().map_or_else(Utc::now, |s| s.start_at),
                    });
                }
                let resource_id = slots.first().map(|s| s.resource_id).ok_or_else(|| {
                    CoreError::InvalidRequest("one or more timeslot_ids do not exist".to_string())
                })?;
                if slots.iter().any(|s| s.resource_id != resource_id) {
                    return Err(CoreError::DoubleBooking);
                }
                if let Some(hint) = request.resource_hint {
                    if hint != resource_id {
                        return Err(CoreError::ValidationFailed(
                            "resource_hint does not match timeslot_ids".to_string(),
                        ));
                    }
                }
                let resource = ctx
                    .eligible_resources
                    .iter()
                    .find(|r| r.id == resource_id && r.is_bookable())
                    .cloned()
                    .ok_or(CoreError::ServiceInactive)?;
                let starts: Vec<DateTime<Utc>> = slots.iter().map(|s| s.start_at).collect();
                let required_slots = u32::try_from(starts.len())
                    .map_err(|_| CoreError::ValidationFailed("too many slots requested".to_string()))?;
                Ok(ResolvedTarget { resource, starts, required_slots })
            }
            SlotSelector::StartAt(start_at) => {
                let duration = ctx.service.total_duration_min();
                let alignment = alignment::align(*start_at, duration, ctx.tenant.slot_granularity_min)?;
                if alignment.aligned_end - alignment.aligned_start
                    > Duration::minutes(ctx.tenant.max_booking_duration_min)
                {
                    return Err(CoreError::ValidationFailed(
                        "booking duration exceeds tenant maximum".to_string(),
                    ));
                }
                let starts: Vec<DateTime<Utc>> = (0..alignment.required_slots)
                    .map(|i| {
                        alignment.aligned_start
                            + Duration::minutes(i64::from(i) * ctx.tenant.slot_granularity_min)
                    })
                    .collect();

                let resource = match request.resource_hint {
                    Some(hint) => ctx
                        .eligible_resources
                        .iter()
                        .find(|r| r.id == hint && r.is_bookable())
                        .cloned()
                        .ok_or_else(|| {
                            CoreError::ValidationFailed(format!(
                                "resource_hint {hint} does not resolve to an active, linked resource"
                            ))
                        })?,
                    None => self
                        .select_resource(ctx, request.tenant_id, &starts)
                        .await
                        .map_err(map_sqlx_error)?
                        .ok_or(CoreError::TimeslotSoldOut { start_at: alignment.aligned_start })?,
                };

                Ok(ResolvedTarget { resource, starts, required_slots: alignment.required_slots })
            }
        }
    }

    /// Deterministic automatic resource selection (`spec.md` §4.3 step 3):
    /// tie-break by resource id ascending, first resource whose non-locking
    /// read shows capacity across the whole candidate sequence.
    async fn select_resource(
        &self,
        ctx: &BookingContext<'_>,
        tenant_id: TenantId,
        starts: &[DateTime<Utc>],
    ) -> Result<Option<Resource>, sqlx::Error> {
        let store = SlotStore::new(self.pool.clone());
        let mut candidates: Vec<&Resource> =
            ctx.eligible_resources.iter().filter(|r| r.is_bookable()).collect();
        candidates.sort_by_key(|r| r.id);

        let from = *starts.first().expect("caller guarantees non-empty starts");
        let to = *starts.last().expect("caller guarantees non-empty starts") + Duration::minutes(1);

        for resource in candidates {
            let slots = store.read_range(tenant_id, resource.id, from, to).await?;
            if starts
                .iter()
                .all(|start| slots.iter().any(|s| s.start_at == *start && s.has_capacity()))
            {
                return Ok(Some(resource.clone()));
            }
        }
        Ok(None)
    }

    /// Cancel a booking: lock it and its items' slots in the same
    /// deterministic order, mark it cancelled, and increment each slot's
    /// capacity back by one (`spec.md` §4.3 "Cancellation").
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::CancelCutoffElapsed`] if `now` is past
    /// `booking.start_at - tenant.cancellation_cutoff_min`, or an
    /// infrastructure error on database failure.
    pub async fn cancel_booking(
        &self,
        tenant: &Tenant,
        booking_id: BookingId,
        now: DateTime<Utc>,
    ) -> Result<(), CoreError> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let row = sqlx::query("SELECT start_at FROM bookings WHERE id = $1 FOR UPDATE")
            .bind(booking_id.0)
            .fetch_optional(&mut *tx)
            .await
            .map_err(map_sqlx_error)?
            .ok_or_else(|| CoreError::ValidationFailed("booking not found".to_string()))?;

        let start_at: DateTime<Utc> = sqlx::Row::get(&row, "start_at");
        let cutoff = start_at - Duration::minutes(tenant.cancellation_cutoff_min);
        if now > cutoff {
            return Err(CoreError::CancelCutoffElapsed);
        }

        let item_rows = sqlx::query("SELECT slot_id FROM booking_items WHERE booking_id = $1 ORDER BY slot_start_at ASC")
            .bind(booking_id.0)
            .fetch_all(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        let slot_ids: Vec<SlotId> = item_rows
            .iter()
            .map(|r| SlotId(sqlx::Row::get(r, "slot_id")))
            .collect();

        SlotStore::increment_capacity(&mut tx, &slot_ids)
            .await
            .map_err(map_sqlx_error)?;

        sqlx::query("UPDATE bookings SET status = 'cancelled', updated_at = $2 WHERE id = $1")
            .bind(booking_id.0)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        sqlx::query(
            r"
            INSERT INTO booking_cancellations (booking_id, cancelled_at, reason)
            VALUES ($1, $2, NULL)
            ",
        )
        .bind(booking_id.0)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        outbox_store::append(
            &mut tx,
            tenant.id,
            booking_id,
            OutboxEventType::BookingCancelled,
            &serde_json::json!({ "booking_id": booking_id.to_string() }),
            None,
        )
        .await
        .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(())
    }
}

struct ResolvedTarget {
    resource: Resource,
    starts: Vec<DateTime<Utc>>,
    required_slots: u32,
}

/// Reconstruct a [`CoreError`] from the stable code stored against a
/// finalized-failed idempotency key (`spec.md` §7). Variants that normally
/// carry a `start_at` lose that detail on replay — only the stable code
/// survives in `idempotency_keys.error_code` — so `now` stands in as the
/// closest available instant rather than inventing one.
fn code_to_error(code: &str, now: DateTime<Utc>) -> CoreError {
    match code {
        "validation_failed" => CoreError::ValidationFailed("replayed failure".to_string()),
        "timeslot_sold_out" => CoreError::TimeslotSoldOut { start_at: now },
        "slot_not_found" => CoreError::SlotNotFound { start_at: now },
        "slot_discontinuous" => CoreError::SlotDiscontinuous,
        "double_booking" => CoreError::DoubleBooking,
        "cancel_cutoff_elapsed" => CoreError::CancelCutoffElapsed,
        "service_inactive" => CoreError::ServiceInactive,
        "idempotency_conflict" => CoreError::IdempotencyConflict,
        "idempotency_in_progress" => CoreError::IdempotencyInProgress,
        "conflict_retry_exhausted" => CoreError::ConflictRetryExhausted,
        "rate_limited" => CoreError::RateLimited,
        other => CoreError::Internal(format!("replayed unknown error code: {other}")),
    }
}

async fn upsert_customer(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    tenant_id: TenantId,
    fields: &CustomerFields,
) -> Result<CustomerId, sqlx::Error> {
    let id = CustomerId::new();
    let row = sqlx::query(
        r"
        INSERT INTO customers (id, tenant_id, name, phone, email, chat_user_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (tenant_id, chat_user_id) WHERE chat_user_id IS NOT NULL DO UPDATE
            SET name = EXCLUDED.name, phone = EXCLUDED.phone, email = EXCLUDED.email
        RETURNING id
        ",
    )
    .bind(id.0)
    .bind(tenant_id.0)
    .bind(&fields.name)
    .bind(&fields.phone)
    .bind(&fields.email)
    .bind(&fields.chat_user_id)
    .fetch_one(&mut **tx)
    .await?;

    Ok(CustomerId(sqlx::Row::get(&row, "id")))
}

async fn insert_booking(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    booking: &Booking,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r"
        INSERT INTO bookings
            (id, tenant_id, customer_id, service_id, resource_id, start_at, end_at,
             status, total_price_minor_units, idempotency_key, notes, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, 'confirmed', $8, $9, $10, $11, $11)
        ",
    )
    .bind(booking.id.0)
    .bind(booking.tenant_id.0)
    .bind(booking.customer_id.0)
    .bind(booking.service_id.0)
    .bind(booking.resource_id.0)
    .bind(booking.start_at)
    .bind(booking.end_at)
    .bind(booking.total_price_minor_units)
    .bind(&booking.idempotency_key)
    .bind(&booking.notes)
    .bind(booking.created_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn insert_booking_items(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    items: &[BookingItem],
) -> Result<(), sqlx::Error> {
    for item in items {
        sqlx::query(
            r"
            INSERT INTO booking_items (booking_id, slot_id, resource_id, slot_start_at)
            VALUES ($1, $2, $3, $4)
            ",
        )
        .bind(item.booking_id.0)
        .bind(item.slot_id.0)
        .bind(item.resource_id.0)
        .bind(item.slot_start_at)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_to_error_roundtrips_known_codes() {
        let now = Utc::now();
        assert_eq!(code_to_error("service_inactive", now), CoreError::ServiceInactive);
        assert_eq!(code_to_error("slot_discontinuous", now), CoreError::SlotDiscontinuous);
    }

    #[test]
    fn code_to_error_maps_unknown_to_internal() {
        assert!(matches!(code_to_error("something_new", Utc::now()), CoreError::Internal(_)));
    }
}
