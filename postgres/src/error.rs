//! Translation from `sqlx::Error` into the domain's stable error vocabulary.

use reservation_core::CoreError;

/// Postgres error code for a serialization failure under `SERIALIZABLE`/`REPEATABLE
/// READ`, or a `READ COMMITTED` write-write conflict surfaced by a retried
/// `UPDATE`. Per `spec.md` §7: "never surfaced; retried up to 3 times".
pub const PG_SERIALIZATION_FAILURE: &str = "40001";
/// Postgres error code for a detected deadlock.
pub const PG_DEADLOCK_DETECTED: &str = "40P01";

/// Whether a database error is transient and should be retried end-to-end by
/// the Booking Coordinator (`spec.md` §4.3 step 10).
#[must_use]
pub fn is_retryable(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .is_some_and(|code| code == PG_SERIALIZATION_FAILURE || code == PG_DEADLOCK_DETECTED),
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => true,
        _ => false,
    }
}

/// Map a low-level `sqlx::Error` to the domain error vocabulary. A
/// serialization failure or deadlock that survived all of the caller's retry
/// attempts becomes [`CoreError::ConflictRetryExhausted`]; a pool timeout or
/// I/O error becomes [`CoreError::DatabaseUnavailable`] regardless of
/// [`is_retryable`] (both count as retryable from the caller's retry-loop
/// perspective, but only the former is a write conflict); everything else
/// becomes [`CoreError::Internal`].
#[must_use]
pub fn map_sqlx_error(err: sqlx::Error) -> CoreError {
    match &err {
        sqlx::Error::Database(db_err)
            if db_err
                .code()
                .is_some_and(|code| code == PG_SERIALIZATION_FAILURE || code == PG_DEADLOCK_DETECTED) =>
        {
            CoreError::ConflictRetryExhausted
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
            CoreError::DatabaseUnavailable(err.to_string())
        }
        _ => CoreError::Internal(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_timeout_is_retryable() {
        assert!(is_retryable(&sqlx::Error::PoolTimedOut));
    }

    #[test]
    fn row_not_found_is_not_retryable() {
        assert!(!is_retryable(&sqlx::Error::RowNotFound));
    }
}
