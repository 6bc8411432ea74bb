//! Bus and subscription ports.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{IntegrationEvent, MessageEnvelope, Result};

/// Delivery policy shared by the bus back ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusSettings {
    /// Deliveries after which a nacked message is dead-lettered.
    pub max_delivery_attempts: u32,
    /// Delay before a nacked message becomes visible again.
    pub redelivery_delay: Duration,
    /// How long a polled delivery stays invisible without an ack or nack.
    pub visibility_timeout: Duration,
}

impl Default for BusSettings {
    fn default() -> Self {
        Self {
            max_delivery_attempts: 5,
            redelivery_delay: Duration::from_millis(500),
            visibility_timeout: Duration::from_secs(30),
        }
    }
}

/// One delivery of a message to one consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub envelope: MessageEnvelope,
    /// 1 for the first delivery.
    pub attempt: u32,
}

/// What a nack did with the delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackOutcome {
    /// The message will be delivered again after the delay.
    Requeued { delay: Duration },
    /// The attempt limit was reached.
    DeadLettered,
}

/// A message a consumer gave up on.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub consumer: String,
    pub envelope: MessageEnvelope,
    pub attempts: u32,
    pub reason: String,
    pub dead_lettered_at: DateTime<Utc>,
}

/// At-least-once message broker.
///
/// Every subscribed consumer receives its own copy of each message published
/// after it subscribed. There is no ordering guarantee.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Fans `envelope` out to the subscribed consumers. A consumer that still
    /// holds a message with the same id does not receive it twice.
    async fn publish(&self, envelope: MessageEnvelope) -> Result<()>;

    /// Creates (or reopens) the durable queue of `consumer` for the given
    /// event types.
    async fn subscribe(
        &self,
        consumer: &str,
        event_types: &[&str],
    ) -> Result<Box<dyn Subscription>>;

    /// Messages dead-lettered for a consumer, oldest first.
    async fn dead_letters(&self, consumer: &str) -> Result<Vec<DeadLetter>>;
}

/// A consumer's handle on its queue.
#[async_trait]
pub trait Subscription: Send + Sync {
    fn consumer(&self) -> &str;

    /// Takes up to `max` visible deliveries and hides them until they are
    /// acked, nacked or their visibility timeout expires.
    async fn poll(&self, max: usize) -> Result<Vec<Delivery>>;

    /// Marks the delivery as processed.
    async fn ack(&self, delivery: &Delivery) -> Result<()>;

    /// Returns the delivery for a later retry, or dead-letters it when the
    /// attempt limit is reached.
    async fn nack(&self, delivery: &Delivery, reason: &str) -> Result<NackOutcome>;

    /// Dead-letters the delivery regardless of attempts.
    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<()>;
}

/// Extension trait providing typed publishing.
#[async_trait]
pub trait MessageBusExt: MessageBus {
    /// Wraps `event` in a new envelope and publishes it.
    async fn publish_event<E: IntegrationEvent>(&self, event: &E) -> Result<MessageEnvelope> {
        let envelope = MessageEnvelope::for_event(event)?;
        self.publish(envelope.clone()).await?;
        Ok(envelope)
    }
}

// Blanket implementation for all bus types
impl<B: MessageBus + ?Sized> MessageBusExt for B {}
