//! `ScheduleRule` — the union of business hours, holidays, and resource
//! time-offs the Schedule Compiler projects into the Slot Store (`spec.md` §3, §4.1).

use crate::ids::{ResourceId, TenantId};
use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// A recurring weekly open/close window.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BusinessHours {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// Day of week this window applies to.
    pub day_of_week: Weekday,
    /// Opening time, in the tenant's local time zone.
    pub open: NaiveTime,
    /// Closing time, in the tenant's local time zone. Must be after `open`.
    pub close: NaiveTime,
    /// This rule only applies to dates on/after this instant, if set.
    pub effective_from: Option<DateTime<Utc>>,
    /// This rule stops applying to dates on/after this instant, if set.
    pub effective_until: Option<DateTime<Utc>>,
}

impl BusinessHours {
    /// Whether this rule is in effect on the given date.
    #[must_use]
    pub fn covers(&self, date: DateTime<Utc>) -> bool {
        self.effective_from.is_none_or(|from| date >= from)
            && self.effective_until.is_none_or(|until| date < until)
    }
}

/// A whole-day closure for a tenant (all resources).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Holiday {
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// The closed calendar date, in the tenant's local time zone.
    pub date: chrono::NaiveDate,
    /// Admin-facing label (e.g. "New Year's Day").
    pub reason: String,
}

/// A sub-day closure for a single resource (vacation, sick day, maintenance).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceTimeOff {
    /// The affected resource.
    pub resource_id: ResourceId,
    /// Owning tenant (denormalized for query convenience).
    pub tenant_id: TenantId,
    /// Start of the unavailable window.
    pub start_at: DateTime<Utc>,
    /// End of the unavailable window. Must be after `start_at`.
    pub end_at: DateTime<Utc>,
    /// Admin-facing label.
    pub reason: String,
}

/// Union of all schedule inputs for a single (tenant, resource) pair, as handed
/// to the Schedule Compiler for one compilation pass.
#[derive(Clone, Debug, Default)]
pub struct ScheduleRules {
    /// Weekly recurring windows.
    pub business_hours: Vec<BusinessHours>,
    /// Whole-day closures.
    pub holidays: Vec<Holiday>,
    /// Sub-day closures for this resource.
    pub time_offs: Vec<ResourceTimeOff>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn business_hours_respects_effective_window() {
        let bh = BusinessHours {
            tenant_id: TenantId(1),
            day_of_week: Weekday::Mon,
            open: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            close: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            effective_from: Some(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()),
            effective_until: None,
        };
        assert!(!bh.covers(Utc.with_ymd_and_hms(2025, 5, 1, 0, 0, 0).unwrap()));
        assert!(bh.covers(Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()));
        assert!(bh.covers(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap()));
    }
}
