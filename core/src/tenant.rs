//! Tenant — the isolation unit for every other entity in this crate.

use crate::ids::TenantId;
use serde::{Deserialize, Serialize};

/// Slot granularity a tenant may configure, in minutes.
pub type GranularityMin = i64;

/// Tenant-scoped configuration that every other component reads.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tenant {
    /// Primary key.
    pub id: TenantId,
    /// Human-readable name (admin surface only; not used by the core).
    pub name: String,
    /// IANA time zone name (e.g. `"Asia/Bangkok"`), used by the Schedule
    /// Compiler to project business hours through DST correctly.
    pub timezone: String,
    /// Fixed slot granularity in minutes; one of `alignment::VALID_GRANULARITIES_MIN`.
    pub slot_granularity_min: GranularityMin,
    /// ISO 4217 currency code for `Service::price`.
    pub currency: String,
    /// How many minutes before `start_at` a booking may still be cancelled.
    pub cancellation_cutoff_min: i64,
    /// Reminder offsets before `start_at`, in minutes (e.g. `[1440, 120]` for
    /// 24h and 2h).
    pub reminder_offsets_min: Vec<i64>,
    /// Maximum total duration (in minutes) a single booking may span.
    pub max_booking_duration_min: i64,
}

impl Tenant {
    /// Parse [`Self::timezone`] into a [`chrono_tz::Tz`].
    ///
    /// # Errors
    ///
    /// Returns an error string if the stored timezone name is not a valid IANA
    /// identifier (should not happen for rows written through this crate, but
    /// the Schedule Compiler treats it as a hard failure rather than silently
    /// falling back to UTC).
    pub fn tz(&self) -> Result<chrono_tz::Tz, String> {
        self.timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| format!("invalid IANA timezone: {}", self.timezone))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Tenant {
        Tenant {
            id: TenantId(1),
            name: "Acme Salon".into(),
            timezone: "Asia/Bangkok".into(),
            slot_granularity_min: 15,
            currency: "THB".into(),
            cancellation_cutoff_min: 60,
            reminder_offsets_min: vec![1440, 120],
            max_booking_duration_min: 240,
        }
    }

    #[test]
    fn parses_valid_timezone() {
        assert!(sample().tz().is_ok());
    }

    #[test]
    fn rejects_invalid_timezone() {
        let mut t = sample();
        t.timezone = "Not/A_Zone".into();
        assert!(t.tz().is_err());
    }
}
