//! `GET /v1/availability?tenant&service&from&to` (`spec.md` §6, §4.5).

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use reservation_core::ids::{ServiceId, TenantId};
use reservation_postgres::error::map_sqlx_error;
use reservation_postgres::AvailableSlot;
use serde::Deserialize;

use crate::error::{ApiError, WebResult};
use crate::state::AppState;

/// Query parameters accepted by the availability listing.
#[derive(Debug, Deserialize)]
pub struct AvailabilityParams {
    /// Tenant to scope the search to.
    pub tenant: i64,
    /// Service to scope the search to.
    pub service: i64,
    /// Start of the search window, inclusive. Defaults to now.
    pub from: Option<DateTime<Utc>>,
    /// End of the search window, exclusive. Defaults to `from + HORIZON_DAYS`.
    pub to: Option<DateTime<Utc>>,
}

/// `GET /v1/availability`.
pub async fn list_availability(
    State(state): State<AppState>,
    Query(params): Query<AvailabilityParams>,
) -> WebResult<Json<Vec<AvailableSlot>>> {
    let tenant_id = TenantId(params.tenant);
    let service_id = ServiceId(params.service);

    let from = params.from.unwrap_or_else(Utc::now);
    let to = params
        .to
        .unwrap_or_else(|| from + chrono::Duration::days(state.horizon_days()));

    if to <= from {
        return Err(ApiError::bad_request("`to` must be after `from`"));
    }

    let tenant = state
        .catalog()
        .tenant(tenant_id)
        .await
        .map_err(|e| ApiError::from(map_sqlx_error(e)))?
        .ok_or_else(|| ApiError::bad_request("unknown tenant"))?;

    let service = state
        .catalog()
        .service(tenant_id, service_id)
        .await
        .map_err(|e| ApiError::from(map_sqlx_error(e)))?
        .ok_or_else(|| ApiError::bad_request("unknown service"))?;

    let resources = state
        .catalog()
        .eligible_resources(tenant_id, service_id)
        .await
        .map_err(|e| ApiError::from(map_sqlx_error(e)))?;

    let slots = state
        .availability()
        .list_available(&tenant, &service, &resources, from, to)
        .await?;

    Ok(Json(slots))
}
