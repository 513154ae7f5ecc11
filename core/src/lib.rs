//! Domain types and pure invariants for the reservation engine.
//!
//! This crate has no I/O and no async runtime dependency. It defines the
//! entities from `spec.md` §3, the Slot Boundary Calculator (§4.2), and the
//! stable error vocabulary (§7) shared by the Postgres, runtime, and web
//! layers. Everything that touches a database or the network lives in
//! `reservation-postgres`, `reservation-runtime`, or `reservation-web`.

pub mod alignment;
pub mod booking;
pub mod customer;
pub mod error;
pub mod ids;
pub mod idempotency;
pub mod outbox;
pub mod resource;
pub mod schedule_rule;
pub mod service;
pub mod slot;
pub mod tenant;

pub use error::CoreError;
