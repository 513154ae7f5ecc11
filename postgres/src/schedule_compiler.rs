//! Schedule Compiler (`spec.md` §4.1): reconciles business hours, holidays,
//! and resource time-offs into durable `timeslots` rows.
//!
//! The compiler never destroys booked inventory. A slot whose
//! `available_capacity` has already dropped below the resource's full
//! capacity means at least one booking references it; if the new schedule no
//! longer wants that slot, the compiler leaves it in place and reports a
//! conflict for an operator to resolve instead of deleting it out from under
//! a confirmed booking.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use reservation_core::alignment::VALID_GRANULARITIES_MIN;
use reservation_core::error::CoreError;
use reservation_core::resource::Resource;
use reservation_core::schedule_rule::ScheduleRules;
use reservation_core::slot::Slot;
use reservation_core::tenant::Tenant;
use sqlx::PgPool;

use crate::error::map_sqlx_error;
use crate::slot_store::SlotStore;

/// A slot the new schedule no longer wants, but which the compiler refused to
/// delete because it still carries booked capacity.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompileConflict {
    /// The slot's start time.
    pub start_at: DateTime<Utc>,
    /// Why this slot was left in place.
    pub reason: String,
}

/// Outcome of one [`ScheduleCompiler::compile_range`] call.
#[derive(Clone, Debug, Default)]
pub struct CompileReport {
    /// Number of new slot rows inserted.
    pub inserted: usize,
    /// Number of stale, unbooked slot rows deleted.
    pub deleted: usize,
    /// Slots the new schedule dropped but that still carry bookings.
    pub conflicts: Vec<CompileConflict>,
}

/// Projects [`ScheduleRules`] into `timeslots` rows for one resource.
pub struct ScheduleCompiler {
    pool: PgPool,
}

impl ScheduleCompiler {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Reconcile `resource`'s `timeslots` against `rules` for every calendar
    /// day in `[from, to)`, in the tenant's local time zone.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::ValidationFailed`] if the tenant's timezone is
    /// invalid or a business-hours window is malformed, or a database error
    /// wrapped via [`crate::error::map_sqlx_error`].
    pub async fn compile_range(
        &self,
        tenant: &Tenant,
        resource: &Resource,
        rules: &ScheduleRules,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<CompileReport, CoreError> {
        let tz = tenant.tz().map_err(CoreError::ValidationFailed)?;

        let desired = self.desired_starts(tenant, tz, rules, from, to)?;

        let range_start = local_instant(tz, from, NaiveTime::MIN)?;
        let range_end = local_instant(tz, to, NaiveTime::MIN)?;

        let store = SlotStore::new(self.pool.clone());
        let existing = store
            .read_range(tenant.id, resource.id, range_start, range_end)
            .await
            .map_err(map_sqlx_error)?;

        self.reconcile(tenant, resource, &desired, &existing).await
    }

    /// Compute every slot start the schedule wants in `[from, to)`, after
    /// subtracting holidays and resource time-offs from business hours.
    fn desired_starts(
        &self,
        tenant: &Tenant,
        tz: chrono_tz::Tz,
        rules: &ScheduleRules,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<DateTime<Utc>>, CoreError> {
        if !VALID_GRANULARITIES_MIN.contains(&tenant.slot_granularity_min) {
            return Err(CoreError::ValidationFailed(format!(
                "tenant slot_granularity_min {} is not one of {VALID_GRANULARITIES_MIN:?}",
                tenant.slot_granularity_min
            )));
        }

        let mut starts = Vec::new();
        let mut date = from;
        while date < to {
            if rules.holidays.iter().any(|h| h.date == date) {
                date = date.succ_opt().unwrap_or(to);
                continue;
            }

            let weekday = date.weekday();
            let date_instant = local_instant(tz, date, NaiveTime::MIN)?;

            for bh in &rules.business_hours {
                if bh.day_of_week != weekday || !bh.covers(date_instant) {
                    continue;
                }
                if bh.open >= bh.close {
                    return Err(CoreError::ValidationFailed(format!(
                        "business hours window has open >= close on {date}"
                    )));
                }

                let window_start = local_instant(tz, date, bh.open)?;
                let window_end = local_instant(tz, date, bh.close)?;

                for (open, close) in subtract_time_offs(
                    (window_start, window_end),
                    tenant.id,
                    &rules.time_offs,
                ) {
                    starts.extend(slot_starts(
                        open,
                        close,
                        tenant.slot_granularity_min,
                    ));
                }
            }

            date = date.succ_opt().unwrap_or(to);
        }

        starts.sort_unstable();
        starts.dedup();
        Ok(starts)
    }

    /// Insert newly-desired slots, delete stale-and-unbooked slots, and
    /// report stale-but-booked slots as conflicts (`spec.md` §4.1 step 3).
    async fn reconcile(
        &self,
        tenant: &Tenant,
        resource: &Resource,
        desired: &[DateTime<Utc>],
        existing: &[Slot],
    ) -> Result<CompileReport, CoreError> {
        let mut report = CompileReport::default();
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        for &start_at in desired {
            if existing.iter().any(|s| s.start_at == start_at) {
                continue;
            }
            let slot = Slot {
                id: None,
                tenant_id: tenant.id,
                resource_id: resource.id,
                start_at,
                end_at: start_at + Duration::minutes(tenant.slot_granularity_min),
                available_capacity: resource.capacity,
            };
            if SlotStore::insert(&mut tx, &slot).await.map_err(map_sqlx_error)?.is_some() {
                report.inserted += 1;
            }
        }

        for slot in existing {
            if desired.contains(&slot.start_at) {
                continue;
            }
            let Some(id) = slot.id else { continue };
            if slot.available_capacity == resource.capacity {
                SlotStore::delete(&mut tx, id).await.map_err(map_sqlx_error)?;
                report.deleted += 1;
            } else {
                report.conflicts.push(CompileConflict {
                    start_at: slot.start_at,
                    reason: format!(
                        "slot has {} of {} capacity booked but is no longer in the schedule",
                        resource.capacity - slot.available_capacity,
                        resource.capacity
                    ),
                });
            }
        }

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(report)
    }
}

fn local_instant(
    tz: chrono_tz::Tz,
    date: NaiveDate,
    time: NaiveTime,
) -> Result<DateTime<Utc>, CoreError> {
    let naive = NaiveDateTime::new(date, time);
    tz.from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| {
            CoreError::ValidationFailed(format!(
                "local time {naive} is ambiguous or nonexistent in {tz}"
            ))
        })
}

/// Subtract every resource time-off overlapping `window` from it, returning
/// the remaining open sub-intervals in ascending order.
fn subtract_time_offs(
    window: (DateTime<Utc>, DateTime<Utc>),
    tenant_id: reservation_core::ids::TenantId,
    time_offs: &[reservation_core::schedule_rule::ResourceTimeOff],
) -> Vec<(DateTime<Utc>, DateTime<Utc>)> {
    let mut open = vec![window];
    for off in time_offs {
        if off.tenant_id != tenant_id || off.end_at <= window.0 || off.start_at >= window.1 {
            continue;
        }
        let mut next = Vec::new();
        for (start, end) in open {
            if off.end_at <= start || off.start_at >= end {
                next.push((start, end));
                continue;
            }
            if off.start_at > start {
                next.push((start, off.start_at));
            }
            if off.end_at < end {
                next.push((off.end_at, end));
            }
        }
        open = next;
    }
    open
}

/// Every slot start in `[open, close)` at `granularity_min` spacing, only
/// including slots that fit entirely before `close`.
fn slot_starts(
    open: DateTime<Utc>,
    close: DateTime<Utc>,
    granularity_min: i64,
) -> Vec<DateTime<Utc>> {
    let mut starts = Vec::new();
    let mut cursor = open;
    let step = Duration::minutes(granularity_min);
    while cursor + step <= close {
        starts.push(cursor);
        cursor += step;
    }
    starts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn slot_starts_covers_whole_window_at_granularity() {
        let starts = slot_starts(t(2025, 3, 1, 9, 0), t(2025, 3, 1, 10, 0), 15);
        assert_eq!(starts.len(), 4);
        assert_eq!(starts[0], t(2025, 3, 1, 9, 0));
        assert_eq!(starts[3], t(2025, 3, 1, 9, 45));
    }

    #[test]
    fn slot_starts_drops_partial_trailing_slot() {
        let starts = slot_starts(t(2025, 3, 1, 9, 0), t(2025, 3, 1, 9, 50), 15);
        assert_eq!(starts.len(), 3);
    }

    #[test]
    fn time_off_splits_window_in_two() {
        let tenant_id = reservation_core::ids::TenantId(1);
        let off = reservation_core::schedule_rule::ResourceTimeOff {
            resource_id: reservation_core::ids::ResourceId(1),
            tenant_id,
            start_at: t(2025, 3, 1, 12, 0),
            end_at: t(2025, 3, 1, 13, 0),
            reason: "lunch".into(),
        };
        let remaining = subtract_time_offs(
            (t(2025, 3, 1, 9, 0), t(2025, 3, 1, 17, 0)),
            tenant_id,
            &[off],
        );
        assert_eq!(remaining, vec![
            (t(2025, 3, 1, 9, 0), t(2025, 3, 1, 12, 0)),
            (t(2025, 3, 1, 13, 0), t(2025, 3, 1, 17, 0)),
        ]);
    }

    #[test]
    fn time_off_covering_whole_window_empties_it() {
        let tenant_id = reservation_core::ids::TenantId(1);
        let off = reservation_core::schedule_rule::ResourceTimeOff {
            resource_id: reservation_core::ids::ResourceId(1),
            tenant_id,
            start_at: t(2025, 3, 1, 8, 0),
            end_at: t(2025, 3, 1, 18, 0),
            reason: "vacation".into(),
        };
        let remaining = subtract_time_offs(
            (t(2025, 3, 1, 9, 0), t(2025, 3, 1, 17, 0)),
            tenant_id,
            &[off],
        );
        assert!(remaining.is_empty());
    }
}
