//! `GET /health/database` (`spec.md` §6).
//!
//! Grounded in the teacher's `web/src/handlers/health.rs::health_check_with_store`
//! shape (status code derived from a dependency probe, JSON body describing
//! it), adapted from Store health to an actual Postgres round-trip since this
//! engine has no `Store`/reducer machinery to ask.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

/// Body returned by the database liveness probe.
#[derive(Debug, Serialize)]
pub struct DatabaseHealth {
    /// `"healthy"` or `"unhealthy"`.
    pub status: &'static str,
    /// Present only when `status` is `"unhealthy"`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// `GET /health/database`: round-trips `SELECT 1` against the pool.
pub async fn health_database(State(state): State<AppState>) -> (StatusCode, Json<DatabaseHealth>) {
    match sqlx::query("SELECT 1").execute(state.pool()).await {
        Ok(_) => (StatusCode::OK, Json(DatabaseHealth { status: "healthy", detail: None })),
        Err(err) => {
            tracing::error!(error = %err, "database health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(DatabaseHealth { status: "unhealthy", detail: Some(err.to_string()) }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn healthy_body_omits_detail() {
        let body = DatabaseHealth { status: "healthy", detail: None };
        let json = serde_json::to_value(&body).unwrap();
        assert!(json.get("detail").is_none());
    }
}
