//! Slot Boundary Calculator (`spec.md` §4.2).
//!
//! Pure, I/O-free arithmetic over `DateTime<Utc>` and minute counts. No component
//! in this crate is allowed to align a booking to slot boundaries any other way —
//! the Coordinator, the Schedule Compiler, and the Availability Query all route
//! through [`align`].

use crate::error::CoreError;
use chrono::{DateTime, Utc};

/// Granularities a tenant may configure, per `spec.md` §3.
pub const VALID_GRANULARITIES_MIN: [i64; 2] = [5, 15];

/// Result of aligning a requested start time and duration to slot boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alignment {
    /// Smallest multiple of `granularity` at or after the requested start.
    pub aligned_start: DateTime<Utc>,
    /// `aligned_start + ceil(duration_min / granularity) * granularity`.
    pub aligned_end: DateTime<Utc>,
    /// `(aligned_end - aligned_start) / granularity`.
    pub required_slots: u32,
    /// Whether `aligned_start` differs from the caller's requested start.
    pub adjustment_made: bool,
}

/// Align `(requested_start, duration_min)` to `granularity`-minute slot
/// boundaries.
///
/// # Errors
///
/// Returns [`CoreError::ValidationFailed`] if `duration_min` is zero/negative or
/// `granularity_min` is outside [`VALID_GRANULARITIES_MIN`].
pub fn align(
    requested_start: DateTime<Utc>,
    duration_min: i64,
    granularity_min: i64,
) -> Result<Alignment, CoreError> {
    if duration_min <= 0 {
        return Err(CoreError::ValidationFailed(format!(
            "duration_min must be positive, got {duration_min}"
        )));
    }
    if !VALID_GRANULARITIES_MIN.contains(&granularity_min) {
        return Err(CoreError::ValidationFailed(format!(
            "granularity_min must be one of {VALID_GRANULARITIES_MIN:?}, got {granularity_min}"
        )));
    }

    let epoch_min = requested_start.timestamp() / 60;
    let aligned_epoch_min = ceil_div(epoch_min, granularity_min) * granularity_min;
    let aligned_start = DateTime::<Utc>::from_timestamp(aligned_epoch_min * 60, 0)
        .ok_or_else(|| CoreError::ValidationFailed("start time out of range".to_string()))?;

    let required_slots_i64 = ceil_div(duration_min, granularity_min);
    let required_slots = u32::try_from(required_slots_i64)
        .map_err(|_| CoreError::ValidationFailed("duration_min too large".to_string()))?;

    let aligned_end = aligned_start + chrono::Duration::minutes(required_slots_i64 * granularity_min);

    Ok(Alignment {
        aligned_start,
        aligned_end,
        required_slots,
        adjustment_made: aligned_start != requested_start,
    })
}

/// `required_slots(duration_min, granularity_min) = ceil(duration_min / granularity_min)`,
/// exposed standalone for the Schedule Compiler, which needs the slot count
/// without re-deriving an aligned start from a wall-clock time.
///
/// # Errors
///
/// Returns [`CoreError::ValidationFailed`] on non-positive `duration_min` or an
/// unsupported `granularity_min`.
pub fn required_slots(duration_min: i64, granularity_min: i64) -> Result<u32, CoreError> {
    if duration_min <= 0 {
        return Err(CoreError::ValidationFailed(format!(
            "duration_min must be positive, got {duration_min}"
        )));
    }
    if !VALID_GRANULARITIES_MIN.contains(&granularity_min) {
        return Err(CoreError::ValidationFailed(format!(
            "granularity_min must be one of {VALID_GRANULARITIES_MIN:?}, got {granularity_min}"
        )));
    }
    u32::try_from(ceil_div(duration_min, granularity_min))
        .map_err(|_| CoreError::ValidationFailed("duration_min too large".to_string()))
}

const fn ceil_div(a: i64, b: i64) -> i64 {
    (a + b - 1).div_euclid(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t(y: i32, mo: u32, d: u32, h: u32, mi: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, 0).unwrap()
    }

    #[test]
    fn already_aligned_start_is_unchanged() {
        let a = align(t(2025, 3, 1, 10, 0), 45, 15).unwrap();
        assert_eq!(a.aligned_start, t(2025, 3, 1, 10, 0));
        assert_eq!(a.aligned_end, t(2025, 3, 1, 10, 45));
        assert_eq!(a.required_slots, 3);
        assert!(!a.adjustment_made);
    }

    #[test]
    fn misaligned_start_rounds_up() {
        let a = align(t(2025, 3, 1, 10, 7), 30, 15).unwrap();
        assert_eq!(a.aligned_start, t(2025, 3, 1, 10, 15));
        assert!(a.adjustment_made);
        assert_eq!(a.required_slots, 2);
    }

    #[test]
    fn duration_not_multiple_of_granularity_rounds_up_slots() {
        let a = align(t(2025, 3, 1, 10, 0), 20, 15).unwrap();
        // 20 minutes needs 2 slots of 15 = 30 minutes.
        assert_eq!(a.required_slots, 2);
        assert_eq!(a.aligned_end, t(2025, 3, 1, 10, 30));
    }

    #[test]
    fn rejects_zero_and_negative_duration() {
        assert!(align(t(2025, 3, 1, 10, 0), 0, 15).is_err());
        assert!(align(t(2025, 3, 1, 10, 0), -5, 15).is_err());
    }

    #[test]
    fn rejects_unsupported_granularity() {
        assert!(align(t(2025, 3, 1, 10, 0), 30, 10).is_err());
        assert!(align(t(2025, 3, 1, 10, 0), 30, 60).is_err());
    }

    #[test]
    fn alignment_is_idempotent() {
        let first = align(t(2025, 3, 1, 10, 7), 30, 15).unwrap();
        let second = align(first.aligned_start, 30, 15).unwrap();
        assert_eq!(first.aligned_start, second.aligned_start);
    }

    #[test]
    fn required_slots_matches_ceil_division() {
        assert_eq!(required_slots(45, 15).unwrap(), 3);
        assert_eq!(required_slots(46, 15).unwrap(), 4);
        assert_eq!(required_slots(5, 5).unwrap(), 1);
    }

    proptest::proptest! {
        #[test]
        fn align_round_trip(offset_min in 0i64..10_000, duration in 1i64..600) {
            let granularity = 15;
            let start = t(2025, 1, 1, 0, 0) + chrono::Duration::minutes(offset_min);
            let first = align(start, duration, granularity).unwrap();
            let second = align(first.aligned_start, duration, granularity).unwrap();
            proptest::prop_assert_eq!(first.aligned_start, second.aligned_start);
            proptest::prop_assert_eq!(first.required_slots, required_slots(duration, granularity).unwrap());
        }
    }
}
