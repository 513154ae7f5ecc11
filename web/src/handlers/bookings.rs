//! `POST /v1/public/bookings`, `POST /v1/bookings/{id}:cancel`,
//! `GET /v1/bookings/{id}` (`spec.md` §6).

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use reservation_core::booking::{Booking, BookingResponse, CreateBookingRequest};
use reservation_core::ids::{BookingId, TenantId};
use reservation_postgres::error::map_sqlx_error;
use reservation_postgres::BookingContext;
use serde::Serialize;
use sqlx::Row;

use crate::error::{ApiError, WebResult};
use crate::extractors::{CorrelationId, IdempotencyKey};
use crate::middleware::RateLimiter;
use crate::state::AppState;

/// Resolve the tenant/service/eligible-resources a request needs before the
/// Booking Coordinator can run, from nothing but the ids in the request body.
async fn load_context(
    state: &AppState,
    tenant_id: TenantId,
    request: &CreateBookingRequest,
) -> WebResult<(reservation_core::tenant::Tenant, reservation_core::service::Service, Vec<reservation_core::resource::Resource>)> {
    let tenant = state
        .catalog()
        .tenant(tenant_id)
        .await
        .map_err(|e| ApiError::from(map_sqlx_error(e)))?
        .ok_or_else(|| ApiError::bad_request("unknown tenant_id"))?;

    let service = state
        .catalog()
        .service(tenant_id, request.service_id)
        .await
        .map_err(|e| ApiError::from(map_sqlx_error(e)))?
        .ok_or_else(|| ApiError::bad_request("unknown service_id"))?;

    let eligible_resources = state
        .catalog()
        .eligible_resources(tenant_id, request.service_id)
        .await
        .map_err(|e| ApiError::from(map_sqlx_error(e)))?;

    Ok((tenant, service, eligible_resources))
}

/// `POST /v1/public/bookings`. Checks the per-tenant rate limit before doing
/// any catalog reads, since the rate limit exists specifically to shed load
/// cheaply (`spec.md` §6, §4.7).
pub async fn create_booking(
    State(state): State<AppState>,
    _correlation_id: CorrelationId,
    IdempotencyKey(idempotency_key): IdempotencyKey,
    Json(body): Json<serde_json::Value>,
) -> WebResult<(StatusCode, Json<BookingResponse>)> {
    let request: CreateBookingRequest = serde_json::from_value(body.clone())
        .map_err(|e| ApiError::bad_request(format!("malformed request body: {e}")))?;

    if !state.rate_limiter().try_acquire(request.tenant_id.0) {
        RateLimiter::record_rejection(request.tenant_id.0);
        return Err(ApiError::rate_limited());
    }

    let (tenant, service, eligible_resources) =
        load_context(&state, request.tenant_id, &request).await?;

    let ctx = BookingContext { tenant: &tenant, service: &service, eligible_resources: &eligible_resources };

    let response = state
        .coordinator()
        .create_booking(&ctx, &request, &idempotency_key, &body, Utc::now())
        .await?;

    Ok((StatusCode::CREATED, Json(response)))
}

/// `POST /v1/bookings/{id}:cancel`.
///
/// Full chat-platform authentication is an out-of-scope external collaborator
/// (`spec.md` §1); this handler only enforces that an `Authorization` header
/// was presented, via [`crate::extractors::RequireAuth`].
pub async fn cancel_booking(
    State(state): State<AppState>,
    _auth: crate::extractors::RequireAuth,
    Path(id_segment): Path<String>,
    Json(body): Json<CancelBookingRequest>,
) -> WebResult<StatusCode> {
    let raw_id = id_segment
        .strip_suffix(":cancel")
        .ok_or_else(|| ApiError::bad_request("path must end with :cancel"))?;
    let id = uuid::Uuid::parse_str(raw_id).map_err(|_| ApiError::bad_request("malformed booking id"))?;
    let booking_id = BookingId(id);

    let tenant = state
        .catalog()
        .tenant(body.tenant_id)
        .await
        .map_err(|e| ApiError::from(map_sqlx_error(e)))?
        .ok_or_else(|| ApiError::bad_request("unknown tenant_id"))?;

    state
        .coordinator()
        .cancel_booking(&tenant, booking_id, Utc::now())
        .await?;

    Ok(StatusCode::OK)
}

/// Request body for `POST /v1/bookings/{id}:cancel`. `spec.md` §6 leaves the
/// cancel body unspecified beyond the `Auth` header; a `tenant_id` is needed
/// here too so the cutoff check reads the correct tenant's configuration.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CancelBookingRequest {
    /// The tenant the booking belongs to.
    pub tenant_id: TenantId,
}

/// `GET /v1/bookings/{id}`.
pub async fn get_booking(
    State(state): State<AppState>,
    _auth: crate::extractors::RequireAuth,
    Path(id): Path<uuid::Uuid>,
) -> WebResult<Json<BookingView>> {
    let booking_id = BookingId(id);
    let row = sqlx::query(
        r"
        SELECT id, tenant_id, customer_id, service_id, resource_id, start_at, end_at,
               status, total_price_minor_units, idempotency_key, notes, created_at, updated_at
        FROM bookings
        WHERE id = $1
        ",
    )
    .bind(booking_id.0)
    .fetch_optional(state.pool())
    .await
    .map_err(|e| ApiError::from(map_sqlx_error(e)))?
    .ok_or_else(|| ApiError::new(StatusCode::NOT_FOUND, "Not Found", "not_found", "booking not found"))?;

    let booking = row_to_booking(&row).map_err(|e| ApiError::from(map_sqlx_error(e)))?;
    Ok(Json(BookingView { booking }))
}

/// Wire representation of a single booking read.
#[derive(Debug, Clone, Serialize)]
pub struct BookingView {
    /// The booking itself.
    pub booking: Booking,
}

fn row_to_booking(row: &sqlx::postgres::PgRow) -> Result<Booking, sqlx::Error> {
    let status_raw: String = row.get("status");
    let status = match status_raw.as_str() {
        "tentative" => reservation_core::booking::BookingStatus::Tentative,
        "confirmed" => reservation_core::booking::BookingStatus::Confirmed,
        "cancelled" => reservation_core::booking::BookingStatus::Cancelled,
        "no_show" => reservation_core::booking::BookingStatus::NoShow,
        "completed" => reservation_core::booking::BookingStatus::Completed,
        other => return Err(sqlx::Error::Decode(format!("unknown bookings.status value: {other}").into())),
    };

    Ok(Booking {
        id: BookingId(row.get("id")),
        tenant_id: TenantId(row.get("tenant_id")),
        customer_id: reservation_core::ids::CustomerId(row.get("customer_id")),
        service_id: reservation_core::ids::ServiceId(row.get("service_id")),
        resource_id: reservation_core::ids::ResourceId(row.get("resource_id")),
        start_at: row.get("start_at"),
        end_at: row.get("end_at"),
        status,
        total_price_minor_units: row.get("total_price_minor_units"),
        idempotency_key: row.get("idempotency_key"),
        notes: row.get("notes"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}
