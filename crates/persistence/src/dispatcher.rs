//! In-process domain-event dispatch.
//!
//! Handlers are registered once at startup into a mapping from event type to
//! an ordered handler list. The mapping is immutable after [`DispatcherBuilder::build`].
//! Dispatch is synchronous with respect to the committing command: every
//! handler runs to completion, in registration order, before the unit of work
//! flushes its own changes.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::{DomainEvent, PersistenceError, Result};

/// What a handler did with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// The handler's effect was applied.
    Applied,
    /// Nothing to do for this event.
    Skipped,
    /// The effect (usually in another module) failed or is pending; the
    /// triggering commit proceeds without it.
    Deferred { reason: String },
}

impl HandlerOutcome {
    pub fn deferred(reason: impl Into<String>) -> Self {
        HandlerOutcome::Deferred {
            reason: reason.into(),
        }
    }

    pub fn is_deferred(&self) -> bool {
        matches!(self, HandlerOutcome::Deferred { .. })
    }
}

/// Error returned by a handler. Aborts the triggering commit.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(Box<dyn std::error::Error + Send + Sync>);

impl HandlerError {
    pub fn new(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(error.into())
    }

    /// Returns the wrapped error if it has type `E`.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.0.downcast_ref::<E>()
    }
}

/// A handler for one aggregate's domain events.
#[async_trait]
pub trait EventHandler<E: DomainEvent>: Send + Sync {
    /// Handler name used in logs, metrics and reports.
    fn name(&self) -> &'static str;

    async fn handle(
        &self,
        event: &E,
        cancel: &CancellationToken,
    ) -> std::result::Result<HandlerOutcome, HandlerError>;
}

/// Outcome of one handler invocation during a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerReport {
    pub event_type: &'static str,
    pub handler: &'static str,
    pub outcome: HandlerOutcome,
}

/// Routes domain events to their registered handlers.
pub struct EventDispatcher<E: DomainEvent> {
    handlers: HashMap<&'static str, Vec<Arc<dyn EventHandler<E>>>>,
}

impl<E: DomainEvent> EventDispatcher<E> {
    pub fn builder() -> DispatcherBuilder<E> {
        DispatcherBuilder {
            handlers: HashMap::new(),
        }
    }

    /// A dispatcher with no handlers.
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Returns the number of handlers registered for an event type.
    pub fn handler_count(&self, event_type: &str) -> usize {
        self.handlers.get(event_type).map_or(0, Vec::len)
    }

    /// Delivers events in order to their handlers in registration order.
    ///
    /// Stops at the first handler error, which is returned as
    /// [`PersistenceError::Dispatch`]. Cancellation is checked before each
    /// handler runs.
    pub async fn dispatch(
        &self,
        events: &[E],
        cancel: &CancellationToken,
    ) -> Result<Vec<HandlerReport>> {
        let mut reports = Vec::new();
        for event in events {
            let event_type = event.event_type();
            metrics::counter!("domain_events_dispatched_total", "event_type" => event_type)
                .increment(1);

            let Some(handlers) = self.handlers.get(event_type) else {
                continue;
            };
            for handler in handlers {
                if cancel.is_cancelled() {
                    return Err(PersistenceError::Cancelled);
                }
                let outcome = handler.handle(event, cancel).await.map_err(|source| {
                    tracing::error!(
                        event_type,
                        handler = handler.name(),
                        error = %source,
                        "domain event handler failed"
                    );
                    PersistenceError::Dispatch {
                        event_type,
                        handler: handler.name(),
                        source,
                    }
                })?;
                if let HandlerOutcome::Deferred { reason } = &outcome {
                    tracing::warn!(
                        event_type,
                        handler = handler.name(),
                        %reason,
                        "domain event handler deferred its effect"
                    );
                    metrics::counter!(
                        "domain_event_handlers_deferred_total",
                        "handler" => handler.name()
                    )
                    .increment(1);
                }
                reports.push(HandlerReport {
                    event_type,
                    handler: handler.name(),
                    outcome,
                });
            }
        }
        Ok(reports)
    }
}

impl<E: DomainEvent> Default for EventDispatcher<E> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Builder collecting handler registrations at startup.
pub struct DispatcherBuilder<E: DomainEvent> {
    handlers: HashMap<&'static str, Vec<Arc<dyn EventHandler<E>>>>,
}

impl<E: DomainEvent> DispatcherBuilder<E> {
    /// Registers a handler for one event type.
    pub fn on(mut self, event_type: &'static str, handler: Arc<dyn EventHandler<E>>) -> Self {
        debug_assert!(
            E::EVENT_TYPES.contains(&event_type),
            "unknown event type {event_type}"
        );
        self.handlers.entry(event_type).or_default().push(handler);
        self
    }

    pub fn build(self) -> EventDispatcher<E> {
        EventDispatcher {
            handlers: self.handlers,
        }
    }
}
