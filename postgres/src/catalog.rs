//! Catalog reads: `tenants`, `services`, `resources`, the `service_resources`
//! eligibility join, and the `business_hours`/`holidays`/`resource_time_offs`
//! rows the Schedule Compiler consumes as a [`ScheduleRules`].
//!
//! Every other module in this crate (`coordinator`, `schedule_compiler`,
//! `availability`) takes these domain entities as already-resolved in-memory
//! parameters. This module is what resolves them from Postgres in the first
//! place, so a caller (the web layer) can assemble a `BookingContext` or a
//! compilation request from nothing but a tenant/service/resource id.

use chrono::{NaiveTime, Weekday};
use reservation_core::ids::{ResourceId, ServiceId, TenantId};
use reservation_core::resource::{Resource, ResourceKind};
use reservation_core::schedule_rule::{BusinessHours, Holiday, ResourceTimeOff};
use reservation_core::service::Service;
use reservation_core::tenant::Tenant;
use sqlx::{PgPool, Row};

/// Read-only view over the tenant/service/resource catalog.
pub struct Catalog {
    pool: PgPool,
}

impl Catalog {
    /// Wrap an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Fetch a tenant by id.
    ///
    /// # Errors
    ///
    /// Returns a `sqlx::Error` if the query fails.
    pub async fn tenant(&self, id: TenantId) -> Result<Option<Tenant>, sqlx::Error> {
        let row = sqlx::query(
            r"
            SELECT id, name, timezone, slot_granularity_min, currency,
                   cancellation_cutoff_min, reminder_offsets_min, max_booking_duration_min
            FROM tenants
            WHERE id = $1
            ",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Tenant {
            id: TenantId(r.get("id")),
            name: r.get("name"),
            timezone: r.get("timezone"),
            slot_granularity_min: r.get("slot_granularity_min"),
            currency: r.get("currency"),
            cancellation_cutoff_min: r.get("cancellation_cutoff_min"),
            reminder_offsets_min: r.get("reminder_offsets_min"),
            max_booking_duration_min: r.get("max_booking_duration_min"),
        }))
    }

    /// Fetch a service by id, scoped to `tenant_id` so a caller can never be
    /// handed another tenant's service by guessing an id.
    ///
    /// # Errors
    ///
    /// Returns a `sqlx::Error` if the query fails.
    pub async fn service(
        &self,
        tenant_id: TenantId,
        id: ServiceId,
    ) -> Result<Option<Service>, sqlx::Error> {
        let row = sqlx::query(
            r"
            SELECT id, tenant_id, name, duration_min, buffer_before_min, buffer_after_min,
                   price_minor_units, active
            FROM services
            WHERE tenant_id = $1 AND id = $2
            ",
        )
        .bind(tenant_id.0)
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| Service {
            id: ServiceId(r.get("id")),
            tenant_id: TenantId(r.get("tenant_id")),
            name: r.get("name"),
            duration_min: r.get("duration_min"),
            buffer_before_min: r.get("buffer_before_min"),
            buffer_after_min: r.get("buffer_after_min"),
            price_minor_units: r.get("price_minor_units"),
            active: r.get("active"),
        }))
    }

    /// Fetch a single resource by id, scoped to `tenant_id`.
    ///
    /// # Errors
    ///
    /// Returns a `sqlx::Error` if the query fails.
    pub async fn resource(
        &self,
        tenant_id: TenantId,
        id: ResourceId,
    ) -> Result<Option<Resource>, sqlx::Error> {
        let row = sqlx::query(
            r"
            SELECT id, tenant_id, kind, name, capacity, active
            FROM resources
            WHERE tenant_id = $1 AND id = $2
            ",
        )
        .bind(tenant_id.0)
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_resource).transpose()
    }

    /// The resources linked to `service_id` via `service_resources`
    /// (`spec.md` §6's eligible-resource join), regardless of active/capacity
    /// state; callers filter with [`Resource::is_bookable`] where that
    /// matters.
    ///
    /// # Errors
    ///
    /// Returns a `sqlx::Error` if the query fails.
    pub async fn eligible_resources(
        &self,
        tenant_id: TenantId,
        service_id: ServiceId,
    ) -> Result<Vec<Resource>, sqlx::Error> {
        let rows = sqlx::query(
            r"
            SELECT r.id, r.tenant_id, r.kind, r.name, r.capacity, r.active
            FROM resources r
            INNER JOIN service_resources sr ON sr.resource_id = r.id
            WHERE r.tenant_id = $1 AND sr.service_id = $2
            ORDER BY r.id ASC
            ",
        )
        .bind(tenant_id.0)
        .bind(service_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_resource).collect()
    }

    /// Assemble the [`ScheduleRules`] the Schedule Compiler needs for one
    /// `(tenant, resource)` pair: every business-hours rule for the tenant,
    /// every tenant-wide holiday, and every time-off recorded against that
    /// resource.
    ///
    /// # Errors
    ///
    /// Returns a `sqlx::Error` if any of the three reads fails.
    pub async fn schedule_rules(
        &self,
        tenant_id: TenantId,
        resource_id: ResourceId,
    ) -> Result<reservation_core::schedule_rule::ScheduleRules, sqlx::Error> {
        let business_hours = self.business_hours(tenant_id).await?;
        let holidays = self.holidays(tenant_id).await?;
        let time_offs = self.resource_time_offs(tenant_id, resource_id).await?;
        Ok(reservation_core::schedule_rule::ScheduleRules { business_hours, holidays, time_offs })
    }

    async fn business_hours(&self, tenant_id: TenantId) -> Result<Vec<BusinessHours>, sqlx::Error> {
        let rows = sqlx::query(
            r"
            SELECT tenant_id, day_of_week, open_time, close_time, effective_from, effective_until
            FROM business_hours
            WHERE tenant_id = $1
            ",
        )
        .bind(tenant_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|r| {
                Ok(BusinessHours {
                    tenant_id: TenantId(r.get("tenant_id")),
                    day_of_week: parse_weekday(r.get("day_of_week")),
                    open: r.get::<NaiveTime, _>("open_time"),
                    close: r.get::<NaiveTime, _>("close_time"),
                    effective_from: r.get("effective_from"),
                    effective_until: r.get("effective_until"),
                })
            })
            .collect()
    }

    async fn holidays(&self, tenant_id: TenantId) -> Result<Vec<Holiday>, sqlx::Error> {
        let rows = sqlx::query(
            r"
            SELECT tenant_id, holiday_date, reason
            FROM holidays
            WHERE tenant_id = $1
            ",
        )
        .bind(tenant_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| Holiday {
                tenant_id: TenantId(r.get("tenant_id")),
                date: r.get("holiday_date"),
                reason: r.get("reason"),
            })
            .collect())
    }

    async fn resource_time_offs(
        &self,
        tenant_id: TenantId,
        resource_id: ResourceId,
    ) -> Result<Vec<ResourceTimeOff>, sqlx::Error> {
        let rows = sqlx::query(
            r"
            SELECT resource_id, tenant_id, start_at, end_at, reason
            FROM resource_time_offs
            WHERE tenant_id = $1 AND resource_id = $2
            ",
        )
        .bind(tenant_id.0)
        .bind(resource_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|r| ResourceTimeOff {
                resource_id: ResourceId(r.get("resource_id")),
                tenant_id: TenantId(r.get("tenant_id")),
                start_at: r.get("start_at"),
                end_at: r.get("end_at"),
                reason: r.get("reason"),
            })
            .collect())
    }
}

fn row_to_resource(row: &sqlx::postgres::PgRow) -> Result<Resource, sqlx::Error> {
    Ok(Resource {
        id: ResourceId(row.get("id")),
        tenant_id: TenantId(row.get("tenant_id")),
        kind: parse_resource_kind(row.get("kind"))?,
        name: row.get("name"),
        capacity: row.get("capacity"),
        active: row.get("active"),
    })
}

fn parse_resource_kind(raw: &str) -> Result<ResourceKind, sqlx::Error> {
    match raw {
        "staff" => Ok(ResourceKind::Staff),
        "seat" => Ok(ResourceKind::Seat),
        "room" => Ok(ResourceKind::Room),
        "table" => Ok(ResourceKind::Table),
        other => Err(sqlx::Error::Decode(
            format!("unknown resources.kind value: {other}").into(),
        )),
    }
}

/// `business_hours.day_of_week` is stored as a Postgres `SMALLINT` with ISO
/// weekday numbering (1 = Monday .. 7 = Sunday) to avoid depending on a
/// string-based `CHECK` constraint matching `chrono::Weekday`'s spelling.
fn parse_weekday(raw: i16) -> Weekday {
    Weekday::try_from(u8::try_from(raw).unwrap_or(1).saturating_sub(1)).unwrap_or(Weekday::Mon)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weekday_numbering_is_iso_monday_first() {
        assert_eq!(parse_weekday(1), Weekday::Mon);
        assert_eq!(parse_weekday(7), Weekday::Sun);
    }

    #[test]
    fn unknown_weekday_number_falls_back_to_monday() {
        assert_eq!(parse_weekday(0), Weekday::Mon);
        assert_eq!(parse_weekday(9), Weekday::Mon);
    }

    #[test]
    fn resource_kind_round_trips_known_strings() {
        assert_eq!(parse_resource_kind("staff").unwrap(), ResourceKind::Staff);
        assert_eq!(parse_resource_kind("table").unwrap(), ResourceKind::Table);
        assert!(parse_resource_kind("spaceship").is_err());
    }
}
