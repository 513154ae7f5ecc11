//! Slot — the unit of atomicity in the reservation engine (`spec.md` §3).

use crate::ids::{ResourceId, SlotId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A durable `[start_at, end_at)` interval owned by `(tenant, resource)`,
/// carrying an integer remaining capacity.
///
/// Invariants (enforced by the Slot Store, not this struct):
/// - `end_at - start_at == granularity`
/// - `start_at` is an integer multiple of `granularity` past the tenant's epoch
/// - `0 <= available_capacity <= resource.capacity`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Primary key, `None` for a slot not yet persisted.
    pub id: Option<SlotId>,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Owning resource.
    pub resource_id: ResourceId,
    /// Inclusive start of the interval.
    pub start_at: DateTime<Utc>,
    /// Exclusive end of the interval.
    pub end_at: DateTime<Utc>,
    /// Remaining capacity; never negative, never exceeds the owning resource's
    /// configured capacity.
    pub available_capacity: i32,
}

impl Slot {
    /// Whether this slot currently has at least one unit of free capacity.
    #[must_use]
    pub const fn has_capacity(&self) -> bool {
        self.available_capacity >= 1
    }
}

/// A contiguous run of slots considered together as one candidate booking
/// window. Contiguity means each slot's `start_at` equals the previous slot's
/// `end_at`, with no gaps (`spec.md` §8 Continuity property).
#[must_use]
pub fn is_contiguous(slots: &[Slot]) -> bool {
    slots
        .windows(2)
        .all(|pair| pair[0].end_at == pair[1].start_at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn slot(start_min: i64, granularity_min: i64, capacity: i32) -> Slot {
        let start = Utc.timestamp_opt(start_min * 60, 0).single().unwrap();
        Slot {
            id: None,
            tenant_id: TenantId(1),
            resource_id: ResourceId(1),
            start_at: start,
            end_at: start + chrono::Duration::minutes(granularity_min),
            available_capacity: capacity,
        }
    }

    #[test]
    fn contiguous_run_is_detected() {
        let slots = vec![slot(0, 15, 1), slot(15, 15, 1), slot(30, 15, 1)];
        assert!(is_contiguous(&slots));
    }

    #[test]
    fn gap_breaks_contiguity() {
        let slots = vec![slot(0, 15, 1), slot(30, 15, 1)];
        assert!(!is_contiguous(&slots));
    }

    #[test]
    fn single_slot_is_trivially_contiguous() {
        assert!(is_contiguous(&[slot(0, 15, 1)]));
        assert!(is_contiguous(&[]));
    }

    #[test]
    fn zero_capacity_has_no_capacity() {
        assert!(!slot(0, 15, 0).has_capacity());
        assert!(slot(0, 15, 1).has_capacity());
    }
}
