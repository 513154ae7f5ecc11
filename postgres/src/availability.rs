//! Availability Query (`spec.md` §4.5): a fast, advisory scan over the Slot
//! Store. Never authoritative — the Booking Coordinator's locked read is the
//! only thing that actually reserves capacity. Callers should treat a result
//! as a hint that may have gone stale by the time they act on it.

use chrono::{DateTime, Utc};
use reservation_core::alignment;
use reservation_core::ids::ResourceId;
use reservation_core::resource::Resource;
use reservation_core::service::Service;
use reservation_core::tenant::Tenant;
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

use crate::error::map_sqlx_error;
use crate::slot_store::SlotStore;
use reservation_core::error::CoreError;

/// One candidate booking start time, and which resources can currently serve
/// it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableSlot {
    /// The aligned candidate start time.
    pub start_at: DateTime<Utc>,
    /// Resources observed with at least one unit of capacity at `start_at`.
    pub resource_ids: Vec<ResourceId>,
}

/// Read-only view over slot availability.
pub struct AvailabilityQuery {
    pool: PgPool,
}

impl AvailabilityQuery {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// List aligned candidate start times in `[from, to)` across `resources`
    /// for which a *contiguous* `required_slots`-long window (derived from
    /// `service`'s total duration and `tenant`'s slot granularity, exactly as
    /// the Booking Coordinator's `StartAt` resolution derives it) has
    /// `available_capacity >= 1` on every slot in the window, per `spec.md`
    /// §4.5.
    ///
    /// Results are ordered by `start_at` ascending. The caller is expected to
    /// cache this for no longer than the tenant's configured TTL
    /// (`spec.md` §4.5: "cached for at most 30 seconds"), invalidated on any
    /// commit that touches the same `(tenant, resource)` pair.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ValidationFailed`] if `service`'s duration or
    /// `tenant`'s granularity is invalid, or a database error wrapped via
    /// [`crate::error::map_sqlx_error`].
    pub async fn list_available(
        &self,
        tenant: &Tenant,
        service: &Service,
        resources: &[Resource],
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<AvailableSlot>, CoreError> {
        let store = SlotStore::new(self.pool.clone());
        let granularity = tenant.slot_granularity_min;
        let required_slots = alignment::required_slots(service.total_duration_min(), granularity)?;

        // Slots starting up to `required_slots - 1` intervals before `to` can
        // still anchor a window that ends before `to`, so the read has to
        // extend past `to` far enough to see every slot such a window needs.
        let extended_to =
            to + chrono::Duration::minutes(i64::from(required_slots.saturating_sub(1)) * granularity);

        let mut by_start: std::collections::BTreeMap<DateTime<Utc>, Vec<ResourceId>> =
            std::collections::BTreeMap::new();

        for resource in resources.iter().filter(|r| r.is_bookable()) {
            let slots = store
                .read_range(tenant.id, resource.id, from, extended_to)
                .await
                .map_err(map_sqlx_error)?;
            let by_slot_start: std::collections::HashMap<DateTime<Utc>, &reservation_core::slot::Slot> =
                slots.iter().map(|s| (s.start_at, s)).collect();

            for slot in slots.iter().filter(|s| s.start_at < to) {
                let window_has_capacity = (0..required_slots).all(|i| {
                    let window_start = slot.start_at + chrono::Duration::minutes(i64::from(i) * granularity);
                    by_slot_start.get(&window_start).is_some_and(|s| s.has_capacity())
                });
                if window_has_capacity {
                    by_start.entry(slot.start_at).or_default().push(resource.id);
                }
            }
        }

        Ok(by_start
            .into_iter()
            .map(|(start_at, resource_ids)| AvailableSlot { start_at, resource_ids })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn available_slot_carries_every_resource_with_capacity() {
        let slot = AvailableSlot {
            start_at: Utc::now(),
            resource_ids: vec![ResourceId(1), ResourceId(2)],
        };
        assert_eq!(slot.resource_ids.len(), 2);
    }
}
