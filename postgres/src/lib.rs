//! Postgres-backed implementations of the Slot Store, Schedule Compiler,
//! Idempotency Store, Booking Coordinator, Outbox Store, and Availability
//! Query (`spec.md` §4). Every query in this crate is raw `sqlx::query`/
//! `query_as`, never the `query!` compile-time macro, since no live database
//! is available to check against at build time in this environment.

pub mod availability;
pub mod catalog;
pub mod coordinator;
pub mod error;
pub mod idempotency_store;
pub mod outbox_store;
pub mod schedule_compiler;
pub mod slot_store;

pub use availability::{AvailabilityQuery, AvailableSlot};
pub use catalog::Catalog;
pub use coordinator::{BookingContext, BookingCoordinator};
pub use schedule_compiler::ScheduleCompiler;
pub use slot_store::SlotStore;
