//! Axum middleware: correlation-id propagation, plus the per-tenant rate
//! limiter consulted by the booking handler.
//!
//! `correlation_id_layer` is carried over from the teacher's
//! `web/src/middleware.rs` near-verbatim, as a layered `tower::Layer`/
//! `tower::Service` pair applied to the whole router. The rate limiter
//! (`spec.md` §6 names `429 rate limited` as a possible response for
//! `POST /v1/public/bookings` without specifying a mechanism; `SPEC_FULL.md`
//! §4.7 resolves it as a tenant-keyed token bucket) is a plain shared struct
//! instead: the tenant id isn't known until the JSON body is parsed, which
//! happens after any request-wide layer would already need to decide.

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::response::Response;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tower::{Layer, Service};
use tracing::Instrument;
use uuid::Uuid;

/// Header name for correlation ID.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Create a layer that adds correlation ID tracking to all requests.
#[must_use]
pub fn correlation_id_layer() -> CorrelationIdLayer {
    CorrelationIdLayer
}

/// Layer for correlation ID tracking.
#[derive(Clone, Debug)]
pub struct CorrelationIdLayer;

impl<S> Layer<S> for CorrelationIdLayer {
    type Service = CorrelationIdMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorrelationIdMiddleware { inner }
    }
}

/// Middleware service for correlation ID tracking.
#[derive(Clone, Debug)]
pub struct CorrelationIdMiddleware<S> {
    inner: S,
}

impl<S> Service<Request> for CorrelationIdMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future =
        std::pin::Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let correlation_id = req
            .headers()
            .get(CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        req.extensions_mut().insert(correlation_id);

        let span = tracing::info_span!(
            "http_request",
            correlation_id = %correlation_id,
            method = %req.method(),
            uri = %req.uri(),
        );

        let fut = self.inner.call(req);

        Box::pin(async move {
            let mut response = fut.instrument(span).await?;

            if let Ok(header_value) = HeaderValue::from_str(&correlation_id.to_string()) {
                response.headers_mut().insert(CORRELATION_ID_HEADER, header_value);
            }

            Ok(response)
        })
    }
}

/// A simple fixed-window token bucket, one bucket per tenant id.
///
/// Fixed-window rather than a sliding/leaky variant: `spec.md` only requires
/// *a* per-tenant cap exists, and a fixed window is what the teacher's own
/// rate-limit-adjacent code (none present verbatim; this follows
/// `CorrelationIdLayer`'s `Arc<Mutex<..>>`-shared-state shape) would reach for
/// first.
#[derive(Debug)]
struct Bucket {
    remaining: u32,
    window_started_at: Instant,
}

/// One bucket per tenant id, reset every 60 seconds.
#[derive(Clone)]
pub struct RateLimiter {
    per_minute: u32,
    buckets: Arc<Mutex<HashMap<i64, Bucket>>>,
}

impl RateLimiter {
    /// Build a limiter allowing `per_minute` requests per tenant per 60s
    /// window (`spec.md` §6 `RATE_LIMIT_PUBLIC_PER_MIN`).
    #[must_use]
    pub fn new(per_minute: u32) -> Self {
        Self { per_minute, buckets: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Whether `tenant_id` still has budget this window; consumes one unit if
    /// so.
    #[must_use]
    pub fn try_acquire(&self, tenant_id: i64) -> bool {
        let mut buckets = self.buckets.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let now = Instant::now();
        let bucket = buckets.entry(tenant_id).or_insert_with(|| Bucket {
            remaining: self.per_minute,
            window_started_at: now,
        });

        if now.duration_since(bucket.window_started_at) >= Duration::from_secs(60) {
            bucket.remaining = self.per_minute;
            bucket.window_started_at = now;
        }

        if bucket.remaining == 0 {
            return false;
        }
        bucket.remaining -= 1;
        true
    }

    /// Record one rate-limited rejection in `metrics` for operator
    /// visibility.
    pub fn record_rejection(tenant_id: i64) {
        metrics::counter!("http.rate_limited", "tenant_id" => tenant_id.to_string()).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_bucket_allows_up_to_limit() {
        let limiter = RateLimiter::new(2);
        assert!(limiter.try_acquire(1));
        assert!(limiter.try_acquire(1));
        assert!(!limiter.try_acquire(1));
    }

    #[test]
    fn buckets_are_isolated_per_tenant() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.try_acquire(1));
        assert!(limiter.try_acquire(2));
        assert!(!limiter.try_acquire(1));
    }
}
