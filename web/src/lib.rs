//! HTTP surface for the reservation engine: handlers, RFC 7807 error
//! envelope, extractors, and middleware (`spec.md` §6).
//!
//! Structure mirrors the teacher's own `web` crate (`error`/`extractors`/
//! `handlers`/`middleware`/`state` modules, `config` added for this engine's
//! environment-driven startup).

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod middleware;
pub mod state;

pub use config::Config;
pub use error::{ApiError, WebResult};
pub use extractors::{CorrelationId, IdempotencyKey, RequireAuth};
pub use handlers::router;
pub use middleware::{correlation_id_layer, RateLimiter, CORRELATION_ID_HEADER};
pub use state::AppState;
