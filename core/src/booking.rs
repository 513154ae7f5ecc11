//! Booking + `BookingItem` — the aggregate the Booking Coordinator writes
//! (`spec.md` §3, §4.3).

use crate::customer::CustomerFields;
use crate::ids::{BookingId, CustomerId, ResourceId, ServiceId, SlotId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a booking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Held but not yet finalized (two-phase holds; unused by the single-phase
    /// flow this crate implements, kept for forward compatibility with tenants
    /// that opt into holds).
    Tentative,
    /// Finalized; slots are decremented.
    Confirmed,
    /// Cancelled by customer or admin; slots were released.
    Cancelled,
    /// Customer did not show up.
    NoShow,
    /// Service was rendered.
    Completed,
}

/// A confirmed (or tentative) reservation of one or more contiguous slots on a
/// single resource.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Booking {
    /// Primary key.
    pub id: BookingId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// The customer who made the booking.
    pub customer_id: CustomerId,
    /// The service being performed.
    pub service_id: ServiceId,
    /// The resource performing it.
    pub resource_id: ResourceId,
    /// Start of the booking window (== first booking item's slot start).
    pub start_at: DateTime<Utc>,
    /// End of the booking window (== last booking item's slot end).
    pub end_at: DateTime<Utc>,
    /// Current lifecycle state.
    pub status: BookingStatus,
    /// Total price charged, in the tenant currency's minor units.
    pub total_price_minor_units: i64,
    /// Caller-supplied idempotency key, unique per tenant.
    pub idempotency_key: String,
    /// Free-text notes from the customer.
    pub notes: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// `start_at < end_at`, required by `spec.md` §3.
    #[must_use]
    pub const fn has_valid_window(&self) -> bool {
        self.start_at.timestamp() < self.end_at.timestamp()
    }
}

/// Linking record between a `Booking` and the `Slot` it occupies.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BookingItem {
    /// Owning booking.
    pub booking_id: BookingId,
    /// The slot this item occupies.
    pub slot_id: SlotId,
    /// The resource the slot belongs to (denormalized; must match every other
    /// item's resource for the same booking, per `spec.md` §3 invariant).
    pub resource_id: ResourceId,
    /// The slot's start time (denormalized for ordering without a join).
    pub slot_start_at: DateTime<Utc>,
}

/// Either an explicit set of timeslot ids, or a bare start time the Coordinator
/// aligns and expands into contiguous slots (`spec.md` §6: "Either `timeslot_ids`
/// ... or `start_at` ... must be present; not both").
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotSelector {
    /// Explicit slot ids chosen by the caller (e.g. from an availability
    /// response).
    TimeslotIds(Vec<SlotId>),
    /// A bare start time; the Coordinator aligns it and derives the required
    /// contiguous run from the service duration.
    StartAt(DateTime<Utc>),
}

/// The public create-booking request body (`spec.md` §6).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CreateBookingRequest {
    /// Tenant making the request.
    pub tenant_id: TenantId,
    /// Service being booked.
    pub service_id: ServiceId,
    /// Caller's preferred resource, if any. When present and it fails to
    /// resolve to an active, linked resource, the Coordinator raises
    /// `validation_failed` rather than silently falling back to automatic
    /// selection (`spec.md` §9 Open Question).
    #[serde(default)]
    pub resource_hint: Option<ResourceId>,
    /// Which slot(s) to book.
    #[serde(flatten)]
    pub slots: SlotSelector,
    /// Contact details for the customer placing the booking.
    pub customer: CustomerFields,
    /// Free-text notes.
    #[serde(default)]
    pub notes: Option<String>,
    /// Consent version the customer accepted, if tracked.
    #[serde(default)]
    pub consent_version: Option<String>,
}

/// The response returned on successful creation, and replayed verbatim from
/// the `IdempotencyRecord` on retry (`spec.md` §8 Idempotency property).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BookingResponse {
    /// The created (or replayed) booking.
    pub booking: Booking,
    /// The booking items, ordered by `slot_start_at` ascending.
    pub items: Vec<BookingItem>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn valid_window_requires_start_before_end() {
        let mut b = sample();
        assert!(b.has_valid_window());
        b.end_at = b.start_at;
        assert!(!b.has_valid_window());
    }

    fn sample() -> Booking {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        Booking {
            id: BookingId::new(),
            tenant_id: TenantId(1),
            customer_id: CustomerId::new(),
            service_id: ServiceId(1),
            resource_id: ResourceId(1),
            start_at: start,
            end_at: start + chrono::Duration::minutes(30),
            status: BookingStatus::Confirmed,
            total_price_minor_units: 50000,
            idempotency_key: "abc-123-key-00000001".into(),
            notes: None,
            created_at: start,
            updated_at: start,
        }
    }
}
