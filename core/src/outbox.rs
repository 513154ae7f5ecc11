//! `OutboxEvent` — the durable side-effect queue written atomically with the
//! business state change that triggers it (`spec.md` §3, §4.4).

use crate::ids::{BookingId, OutboxEventId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default cap on delivery attempts before an event is moved to
/// `dead_letter` (`spec.md` §4.4: "default 5").
pub const DEFAULT_MAX_ATTEMPTS: i32 = 5;

/// Closed set of event types this engine emits. Unlike the teacher's generic,
/// open-ended `Event` trait, the outbox only ever needs to route a handful of
/// domain facts, so a concrete enum (rather than a trait object registry keyed
/// by a string) is both simpler and exhaustively matched at compile time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutboxEventType {
    /// A booking was created and confirmed.
    BookingCreated,
    /// A booking was cancelled.
    BookingCancelled,
    /// An external payment completed.
    PaymentCompleted,
    /// A generic notification-channel dispatch was requested.
    NotificationRequested,
}

impl OutboxEventType {
    /// Stable string stored in `outbox_events.event_type`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BookingCreated => "BOOKING_CREATED",
            Self::BookingCancelled => "BOOKING_CANCELLED",
            Self::PaymentCompleted => "PAYMENT_COMPLETED",
            Self::NotificationRequested => "NOTIFICATION_REQUESTED",
        }
    }

    /// Parse the stable string back into a variant.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "BOOKING_CREATED" => Some(Self::BookingCreated),
            "BOOKING_CANCELLED" => Some(Self::BookingCancelled),
            "PAYMENT_COMPLETED" => Some(Self::PaymentCompleted),
            "NOTIFICATION_REQUESTED" => Some(Self::NotificationRequested),
            _ => None,
        }
    }
}

/// Lifecycle state of an [`OutboxEvent`] (`spec.md` §3).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxStatus {
    /// Waiting to be claimed.
    Pending,
    /// Claimed by a dispatcher worker; in flight.
    Processing,
    /// Delivered successfully.
    Completed,
    /// A delivery attempt failed; will retry if attempts remain.
    Failed,
    /// Retries exhausted; requires operator action.
    DeadLetter,
}

impl OutboxStatus {
    /// Stable string stored in `outbox_events.status`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::DeadLetter => "dead_letter",
        }
    }

    /// Parse the stable string back into a variant.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "dead_letter" => Some(Self::DeadLetter),
            _ => None,
        }
    }
}

/// Payload carried by a `BOOKING_CREATED` / `BOOKING_CANCELLED` event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BookingEventPayload {
    /// The affected booking.
    pub booking_id: BookingId,
    /// Customer contact fields, copied at emission time so the handler never
    /// has to re-query the booking.
    pub customer: crate::customer::CustomerFields,
    /// Deterministic confirmation code derived from booking id + creation
    /// instant.
    pub confirmation_code: String,
    /// Reminder fire times, clamped to `>= now` at emission time.
    pub reminder_at: Vec<DateTime<Utc>>,
}

/// A durable side-effect intent (`spec.md` §3, §4.4).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OutboxEvent {
    /// Primary key.
    pub id: OutboxEventId,
    /// Owning tenant.
    pub tenant_id: TenantId,
    /// The aggregate (booking) this event is about; used both for ordering
    /// (`spec.md` §4.4 per-aggregate ordering) and lookups.
    pub aggregate_id: BookingId,
    /// Which kind of event this is.
    pub event_type: OutboxEventType,
    /// The event payload, as JSON (matches the teacher's
    /// `SerializedEvent::metadata` JSONB convention).
    pub payload: serde_json::Value,
    /// Current lifecycle state.
    pub status: OutboxStatus,
    /// Number of delivery attempts made so far.
    pub attempts: i32,
    /// Earliest time the next attempt may be claimed.
    pub next_attempt_at: DateTime<Utc>,
    /// Most recent handler error, if any.
    pub last_error: Option<String>,
    /// Correlation id for distributed tracing, propagated from the originating
    /// HTTP request.
    pub trace_id: Option<String>,
    /// Row creation time.
    pub created_at: DateTime<Utc>,
}

/// Derive a deterministic, customer-facing confirmation code from a booking id
/// and its creation instant. Deterministic so retried emission (e.g. a retried
/// transaction) never produces a different code for the same booking.
#[must_use]
pub fn confirmation_code(booking_id: BookingId, created_at: DateTime<Utc>) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(booking_id.to_string().as_bytes());
    hasher.update(created_at.timestamp().to_le_bytes());
    let digest = hasher.finalize();
    let code: String = digest
        .iter()
        .take(5)
        .map(|b| format!("{b:02X}"))
        .collect();
    code[..8].to_string()
}

/// Compute the reminder fire times for a booking, clamping any offset that
/// would fall in the past up to `now` (`spec.md` §4.3 step 7: "clamped to
/// `>= now`").
#[must_use]
pub fn reminder_schedule(
    start_at: DateTime<Utc>,
    offsets_min: &[i64],
    now: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    offsets_min
        .iter()
        .map(|offset| {
            let fire_at = start_at - chrono::Duration::minutes(*offset);
            fire_at.max(now)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn event_type_roundtrip() {
        for t in [
            OutboxEventType::BookingCreated,
            OutboxEventType::BookingCancelled,
            OutboxEventType::PaymentCompleted,
            OutboxEventType::NotificationRequested,
        ] {
            assert_eq!(OutboxEventType::parse(t.as_str()), Some(t));
        }
    }

    #[test]
    fn status_roundtrip() {
        for s in [
            OutboxStatus::Pending,
            OutboxStatus::Processing,
            OutboxStatus::Completed,
            OutboxStatus::Failed,
            OutboxStatus::DeadLetter,
        ] {
            assert_eq!(OutboxStatus::parse(s.as_str()), Some(s));
        }
    }

    #[test]
    fn unknown_status_string_does_not_parse() {
        assert_eq!(OutboxStatus::parse("bogus"), None);
    }

    #[test]
    fn confirmation_code_is_deterministic() {
        let id = BookingId::new();
        let t = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        assert_eq!(confirmation_code(id, t), confirmation_code(id, t));
    }

    #[test]
    fn confirmation_code_changes_with_inputs() {
        let id1 = BookingId::new();
        let id2 = BookingId::new();
        let t = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        assert_ne!(confirmation_code(id1, t), confirmation_code(id2, t));
    }

    #[test]
    fn reminder_offsets_clamp_to_now() {
        let start = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap();
        // 24h before start is in the past relative to `now`; clamp to `now`.
        let schedule = reminder_schedule(start, &[1440, 30], now);
        assert_eq!(schedule[0], now);
        // 30 min before start (9:30) is still in the future relative to `now` (9:00).
        assert_eq!(schedule[1], start - chrono::Duration::minutes(30));
    }
}
