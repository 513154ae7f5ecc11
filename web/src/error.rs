//! `ApiError` — the RFC 7807 Problem Details envelope every handler returns
//! on failure (`spec.md` §6: "Response envelope for errors follows RFC 7807
//! Problem Details with additional fields `code` ... and optional `details`").
//!
//! Grounded in the teacher's `AppError` (status/code/message/source,
//! `IntoResponse` impl, `tracing::error!` on 5xx), generalized to emit
//! `application/problem+json` instead of the teacher's flatter `{code,
//! message}` shape.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use reservation_core::error::CoreError;
use serde::Serialize;

/// One field-level validation complaint, per `spec.md` §6's `details:
/// [{field, reason}]`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorDetail {
    /// The offending field's name (caller-facing, e.g. `"slots"`).
    pub field: String,
    /// Why it was rejected.
    pub reason: String,
}

/// An RFC 7807 Problem Details response.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    title: &'static str,
    detail: String,
    code: &'static str,
    details: Vec<ErrorDetail>,
}

impl ApiError {
    /// Build an error directly, bypassing [`CoreError`] translation. Used for
    /// request-shape failures caught before a [`CoreError`] would even apply
    /// (malformed JSON, missing headers).
    #[must_use]
    pub fn new(status: StatusCode, title: &'static str, code: &'static str, detail: impl Into<String>) -> Self {
        Self { status, title, detail: detail.into(), code, details: Vec::new() }
    }

    /// Attach field-level detail entries.
    #[must_use]
    pub fn with_details(mut self, details: Vec<ErrorDetail>) -> Self {
        self.details = details;
        self
    }

    /// 400 for a malformed request body/headers (not a business-rule failure).
    #[must_use]
    pub fn bad_request(detail: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Bad Request", "invalid_request", detail)
    }

    /// 429 for the rate-limiting middleware (`spec.md` §6, §4.7).
    #[must_use]
    pub fn rate_limited() -> Self {
        Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "Too Many Requests",
            "rate_limited",
            "request rate exceeded for this tenant",
        )
    }
}

/// Map a domain error to its HTTP status and RFC 7807 `title`
/// (`spec.md` §7). Infrastructure errors that are not user-facing are masked
/// as a generic 500/`internal` so their raw message never reaches a caller.
impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        let code = err.code();
        let status = status_for(&err);
        let title = title_for(&err);
        let detail = if err.is_user_facing() { err.to_string() } else { "an internal error occurred".to_string() };

        if !err.is_user_facing() {
            tracing::error!(error = %err, code, "internal error");
        }

        Self::new(status, title, code, detail)
    }
}

fn status_for(err: &CoreError) -> StatusCode {
    match err {
        CoreError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        CoreError::ValidationFailed(_) => StatusCode::UNPROCESSABLE_ENTITY,
        CoreError::IdempotencyConflict
        | CoreError::TimeslotSoldOut { .. }
        | CoreError::DoubleBooking
        | CoreError::CancelCutoffElapsed => StatusCode::CONFLICT,
        CoreError::IdempotencyInProgress => StatusCode::CONFLICT,
        CoreError::SlotNotFound { .. } => StatusCode::NOT_FOUND,
        CoreError::SlotDiscontinuous => StatusCode::UNPROCESSABLE_ENTITY,
        CoreError::ServiceInactive => StatusCode::UNPROCESSABLE_ENTITY,
        CoreError::ConflictRetryExhausted => StatusCode::CONFLICT,
        CoreError::DatabaseUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        CoreError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        CoreError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn title_for(err: &CoreError) -> &'static str {
    match err {
        CoreError::InvalidRequest(_) => "Bad Request",
        CoreError::ValidationFailed(_) => "Unprocessable Entity",
        CoreError::IdempotencyConflict => "Idempotency Key Conflict",
        CoreError::IdempotencyInProgress => "Request In Progress",
        CoreError::TimeslotSoldOut { .. } => "Timeslot Sold Out",
        CoreError::SlotNotFound { .. } => "Timeslot Not Found",
        CoreError::SlotDiscontinuous => "Slot Sequence Not Contiguous",
        CoreError::DoubleBooking => "Conflicting Booking",
        CoreError::CancelCutoffElapsed => "Cancellation Cutoff Elapsed",
        CoreError::ServiceInactive => "Service Or Resource Inactive",
        CoreError::ConflictRetryExhausted => "Conflict Retry Budget Exhausted",
        CoreError::DatabaseUnavailable(_) => "Database Unavailable",
        CoreError::RateLimited => "Too Many Requests",
        CoreError::Internal(_) => "Internal Server Error",
    }
}

#[derive(Serialize)]
struct ProblemBody {
    #[serde(rename = "type")]
    type_: &'static str,
    title: &'static str,
    status: u16,
    detail: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    details: Vec<ErrorDetail>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ProblemBody {
            type_: "about:blank",
            title: self.title,
            status: self.status.as_u16(),
            detail: self.detail,
            code: self.code,
            details: self.details,
        };

        let mut response = (self.status, Json(body)).into_response();
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/problem+json"),
        );
        response
    }
}

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sold_out_maps_to_409() {
        let err = ApiError::from(CoreError::TimeslotSoldOut { start_at: chrono::Utc::now() });
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.code, "timeslot_sold_out");
    }

    #[test]
    fn internal_errors_mask_their_detail() {
        let err = ApiError::from(CoreError::Internal("leaked connection string".to_string()));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.detail, "an internal error occurred");
    }

    #[test]
    fn validation_failed_maps_to_422() {
        let err = ApiError::from(CoreError::ValidationFailed("bad hint".to_string()));
        assert_eq!(err.status, StatusCode::UNPROCESSABLE_ENTITY);
    }
}
