//! Outbox Dispatcher runtime (`spec.md` §4.4): claim-and-deliver loop,
//! handler registry, retry/backoff, and lease-timeout sweeper on top of
//! `reservation-postgres`'s `outbox_store`.

pub mod dispatcher;
pub mod handler;
pub mod retry;

pub use dispatcher::{spawn, Dispatcher, DispatcherConfig};
pub use handler::{HandlerError, HandlerRegistry, OutboxHandler};
pub use retry::RetryPolicy;
