//! Service — a named, priced, bookable offering.

use crate::ids::{ServiceId, TenantId};
use serde::{Deserialize, Serialize};

/// A bookable offering. `Service` <-> `Resource` is many-to-many, tracked by the
/// `service_resources` join table at the persistence layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Service {
    /// Primary key.
    pub id: ServiceId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Display name.
    pub name: String,
    /// How long performing this service takes, excluding buffers.
    pub duration_min: i64,
    /// Minutes of resource time blocked immediately before the service.
    pub buffer_before_min: i64,
    /// Minutes of resource time blocked immediately after the service.
    pub buffer_after_min: i64,
    /// Price in the tenant's currency's minor unit (e.g. cents).
    pub price_minor_units: i64,
    /// Whether this service currently accepts new bookings.
    pub active: bool,
}

impl Service {
    /// Total minutes of resource time a booking of this service consumes,
    /// including both buffers. This is the duration the Booking Coordinator
    /// aligns via [`crate::alignment::align`].
    #[must_use]
    pub const fn total_duration_min(&self) -> i64 {
        self.duration_min + self.buffer_before_min + self.buffer_after_min
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_duration_includes_both_buffers() {
        let s = Service {
            id: ServiceId(1),
            tenant_id: TenantId(1),
            name: "Haircut".into(),
            duration_min: 30,
            buffer_before_min: 5,
            buffer_after_min: 10,
            price_minor_units: 50000,
            active: true,
        };
        assert_eq!(s.total_duration_min(), 45);
    }
}
