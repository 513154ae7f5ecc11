//! Application state shared across all HTTP handlers.
//!
//! The teacher's own `AppState` is an explicit placeholder ("applications
//! should define their own state struct containing their domain-specific
//! `Store` instances") — this is that application-specific struct, built
//! fresh around the domain components this engine actually has: a
//! connection pool, the Booking Coordinator, the Schedule Compiler, the
//! Availability Query, the catalog reads, and the rate limiter.

use std::sync::Arc;

use chrono::Duration;
use reservation_postgres::{AvailabilityQuery, BookingCoordinator, Catalog, ScheduleCompiler};
use sqlx::PgPool;

use crate::config::Config;
use crate::middleware::RateLimiter;

/// Shared, cheaply-cloneable application state.
#[derive(Clone)]
pub struct AppState(Arc<Inner>);

struct Inner {
    pool: PgPool,
    coordinator: BookingCoordinator,
    schedule_compiler: ScheduleCompiler,
    availability: AvailabilityQuery,
    catalog: Catalog,
    rate_limiter: RateLimiter,
    horizon_days: i64,
}

impl AppState {
    /// Build application state from a connection pool and loaded config.
    #[must_use]
    pub fn new(pool: PgPool, config: &Config) -> Self {
        let idempotency_ttl = Duration::seconds(config.idempotency_ttl_seconds);
        Self(Arc::new(Inner {
            coordinator: BookingCoordinator::new(pool.clone(), idempotency_ttl),
            schedule_compiler: ScheduleCompiler::new(pool.clone()),
            availability: AvailabilityQuery::new(pool.clone()),
            catalog: Catalog::new(pool.clone()),
            rate_limiter: RateLimiter::new(config.rate_limit_public_per_min),
            horizon_days: config.horizon_days,
            pool,
        }))
    }

    /// The raw connection pool, for health checks and migrations.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.0.pool
    }

    /// The Booking Coordinator.
    #[must_use]
    pub fn coordinator(&self) -> &BookingCoordinator {
        &self.0.coordinator
    }

    /// The Schedule Compiler.
    #[must_use]
    pub fn schedule_compiler(&self) -> &ScheduleCompiler {
        &self.0.schedule_compiler
    }

    /// The Availability Query.
    #[must_use]
    pub fn availability(&self) -> &AvailabilityQuery {
        &self.0.availability
    }

    /// Tenant/service/resource catalog reads.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.0.catalog
    }

    /// The per-tenant rate limiter.
    #[must_use]
    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.0.rate_limiter
    }

    /// Default availability-query horizon in days (`HORIZON_DAYS`, default 30).
    #[must_use]
    pub const fn horizon_days(&self) -> i64 {
        self.0.horizon_days
    }
}
