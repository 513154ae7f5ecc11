//! Handler registry for the Outbox Dispatcher.
//!
//! `spec.md` §4.4 treats the set of outbox event types as closed
//! (`reservation_core::outbox::OutboxEventType`), so the registry is a small
//! fixed table rather than an open-ended plugin system: an event type with no
//! registered handler is dead-lettered with reason `NO_HANDLER`, never
//! silently dropped.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use reservation_core::outbox::OutboxEventType;

/// Error returned by a handler. The message is persisted to
/// `outbox_events.last_error` for operator visibility.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl HandlerError {
    /// Wrap any displayable error as a [`HandlerError`].
    pub fn new(err: impl std::fmt::Display) -> Self {
        Self(err.to_string())
    }
}

/// A side-effect handler for one [`OutboxEventType`].
///
/// Implementations perform the actual external call (send an SMS, call a
/// payment webhook, push a notification) and must be idempotent: the
/// dispatcher may invoke a handler more than once for the same event if a
/// previous attempt's outcome was lost to a crash before its status update
/// committed.
#[async_trait]
pub trait OutboxHandler: Send + Sync {
    /// Handle one event's payload.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerError`] if delivery failed and should be retried
    /// (subject to the dispatcher's [`crate::retry::RetryPolicy`]).
    async fn handle(&self, payload: &serde_json::Value) -> Result<(), HandlerError>;
}

/// Maps each [`OutboxEventType`] to the handler that delivers it.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<OutboxEventType, Arc<dyn OutboxHandler>>,
}

impl HandlerRegistry {
    /// An empty registry. Every event type dead-letters as `NO_HANDLER` until
    /// handlers are registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event_type`, replacing any prior registration.
    #[must_use]
    pub fn with_handler(
        mut self,
        event_type: OutboxEventType,
        handler: Arc<dyn OutboxHandler>,
    ) -> Self {
        self.handlers.insert(event_type, handler);
        self
    }

    /// Look up the handler for `event_type`, if any.
    #[must_use]
    pub fn get(&self, event_type: OutboxEventType) -> Option<Arc<dyn OutboxHandler>> {
        self.handlers.get(&event_type).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysOk;

    #[async_trait]
    impl OutboxHandler for AlwaysOk {
        async fn handle(&self, _payload: &serde_json::Value) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[test]
    fn unregistered_event_type_has_no_handler() {
        let registry = HandlerRegistry::new();
        assert!(registry.get(OutboxEventType::BookingCreated).is_none());
    }

    #[tokio::test]
    async fn registered_handler_is_invoked() {
        let registry = HandlerRegistry::new()
            .with_handler(OutboxEventType::BookingCreated, Arc::new(AlwaysOk));
        let handler = registry.get(OutboxEventType::BookingCreated).unwrap();
        assert!(handler.handle(&serde_json::json!({})).await.is_ok());
    }
}
