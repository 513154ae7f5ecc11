//! Resource — a finite-capacity bookable thing (staff member, seat, room, table).

use crate::ids::{ResourceId, TenantId};
use serde::{Deserialize, Serialize};

/// The kind of capacity a resource represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    /// A staff member performing the service.
    Staff,
    /// A physical seat.
    Seat,
    /// A private room.
    Room,
    /// A table (e.g. restaurant booking).
    Table,
}

/// A bookable capacity source.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Resource {
    /// Primary key.
    pub id: ResourceId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// What this resource represents.
    pub kind: ResourceKind,
    /// Display name.
    pub name: String,
    /// Units of concurrent capacity this resource offers (>= 1).
    pub capacity: i32,
    /// Whether this resource currently accepts new bookings.
    pub active: bool,
}

impl Resource {
    /// A resource is eligible to receive new bookings only when active and
    /// carrying at least one unit of capacity.
    #[must_use]
    pub const fn is_bookable(&self) -> bool {
        self.active && self.capacity >= 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Resource {
        Resource {
            id: ResourceId(1),
            tenant_id: TenantId(1),
            kind: ResourceKind::Staff,
            name: "Alex".into(),
            capacity: 1,
            active: true,
        }
    }

    #[test]
    fn inactive_resource_is_not_bookable() {
        let mut r = sample();
        r.active = false;
        assert!(!r.is_bookable());
    }

    #[test]
    fn zero_capacity_is_not_bookable() {
        let mut r = sample();
        r.capacity = 0;
        assert!(!r.is_bookable());
    }
}
