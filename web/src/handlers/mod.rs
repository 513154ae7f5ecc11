//! HTTP handlers for the public surface named in `spec.md` §6.

pub mod availability;
pub mod bookings;
pub mod health;

use axum::routing::{get, post};
use axum::Router;

use crate::middleware::correlation_id_layer;
use crate::state::AppState;

/// Build the full router: every route in `spec.md` §6's HTTP table, plus the
/// correlation-id layer and `tower-http`'s CORS/trace/compression stack.
#[must_use]
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/public/bookings", post(bookings::create_booking))
        // `spec.md` §6 names the path literally as `/v1/bookings/{id}:cancel` — a
        // single path segment with a `:cancel` suffix, not a sub-resource. Axum's
        // router only captures whole segments, so both methods share one route
        // and the suffix is split out of the captured segment inside
        // `bookings::cancel_booking` itself.
        .route("/v1/bookings/:id", get(bookings::get_booking).post(bookings::cancel_booking))
        .route("/v1/availability", get(availability::list_availability))
        .route("/health/database", get(health::health_database))
        .layer(correlation_id_layer())
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .layer(tower_http::compression::CompressionLayer::new())
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}
