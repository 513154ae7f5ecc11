//! Stable error kinds shared by every layer of the reservation engine.
//!
//! The variants here map 1:1 onto the `code` values a caller sees in the RFC 7807
//! response envelope (see `reservation-web::error`). Keeping the kind list in the
//! domain crate means the Postgres and web layers never invent their own error
//! vocabulary — they only translate.

use thiserror::Error;

/// Stable, underscored error codes returned to callers and persisted alongside
/// idempotency records so replays observe an identical outcome.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Malformed request shape (missing field, both/neither of `timeslot_ids` and
    /// `start_at` present, etc).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// A field failed semantic validation (bad duration, granularity, resource
    /// hint that doesn't resolve).
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// Same `(tenant, idempotency_key)` was previously used with a different
    /// request fingerprint.
    #[error("idempotency key already used with a different request body")]
    IdempotencyConflict,

    /// Same `(tenant, idempotency_key)` is still being processed by another
    /// request.
    #[error("a request with this idempotency key is still in progress")]
    IdempotencyInProgress,

    /// One or more of the required contiguous slots has no remaining capacity.
    #[error("timeslot sold out starting at {start_at}")]
    TimeslotSoldOut {
        /// The first slot observed at zero capacity.
        start_at: chrono::DateTime<chrono::Utc>,
    },

    /// A slot the booking needs does not exist in the Slot Store at all.
    #[error("slot not found starting at {start_at}")]
    SlotNotFound {
        /// The missing slot's start time.
        start_at: chrono::DateTime<chrono::Utc>,
    },

    /// The required slot sequence has a hole in it.
    #[error("slot sequence is not contiguous")]
    SlotDiscontinuous,

    /// Two booking items would reference overlapping capacity on the same
    /// resource (defensive; the locked read should prevent this).
    #[error("double booking detected")]
    DoubleBooking,

    /// Cancellation requested after the tenant's cancellation cutoff elapsed.
    #[error("cancellation cutoff has elapsed")]
    CancelCutoffElapsed,

    /// The referenced service or resource is not active.
    #[error("service or resource is inactive")]
    ServiceInactive,

    /// Internal retry budget for serialization failures/deadlocks was exhausted.
    #[error("conflict retry budget exhausted")]
    ConflictRetryExhausted,

    /// The backing database could not be reached.
    #[error("database unavailable: {0}")]
    DatabaseUnavailable(String),

    /// Caller exceeded the configured request rate.
    #[error("rate limited")]
    RateLimited,

    /// Anything else; never shown verbatim to the caller.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// The stable, underscored `code` string for this error, as specified in
    /// `spec.md` §7.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidRequest(_) => "invalid_request",
            Self::ValidationFailed(_) => "validation_failed",
            Self::IdempotencyConflict => "idempotency_conflict",
            Self::IdempotencyInProgress => "idempotency_in_progress",
            Self::TimeslotSoldOut { .. } => "timeslot_sold_out",
            Self::SlotNotFound { .. } => "slot_not_found",
            Self::SlotDiscontinuous => "slot_discontinuous",
            Self::DoubleBooking => "double_booking",
            Self::CancelCutoffElapsed => "cancel_cutoff_elapsed",
            Self::ServiceInactive => "service_inactive",
            Self::ConflictRetryExhausted => "conflict_retry_exhausted",
            Self::DatabaseUnavailable(_) => "database_unavailable",
            Self::RateLimited => "rate_limited",
            Self::Internal(_) => "internal",
        }
    }

    /// Whether this kind is safe to surface verbatim to an external caller.
    ///
    /// Per `spec.md` §7: business errors are always surfaced; infrastructure
    /// errors are logged and masked as `internal` unless explicitly user-facing.
    #[must_use]
    pub const fn is_user_facing(&self) -> bool {
        match self {
            Self::InvalidRequest(_)
            | Self::ValidationFailed(_)
            | Self::IdempotencyConflict
            | Self::IdempotencyInProgress
            | Self::TimeslotSoldOut { .. }
            | Self::SlotNotFound { .. }
            | Self::SlotDiscontinuous
            | Self::DoubleBooking
            | Self::CancelCutoffElapsed
            | Self::ServiceInactive
            | Self::ConflictRetryExhausted
            | Self::RateLimited
            | Self::DatabaseUnavailable(_) => true,
            Self::Internal(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_errors_are_user_facing() {
        assert!(CoreError::ServiceInactive.is_user_facing());
        assert!(CoreError::CancelCutoffElapsed.is_user_facing());
    }

    #[test]
    fn internal_errors_are_masked() {
        assert!(!CoreError::Internal("whatever".into()).is_user_facing());
    }

    #[test]
    fn codes_are_stable_strings() {
        assert_eq!(CoreError::IdempotencyConflict.code(), "idempotency_conflict");
        assert_eq!(CoreError::SlotDiscontinuous.code(), "slot_discontinuous");
    }
}
