//! Idempotent consumers and the worker loop driving them.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::bus::{Delivery, MessageBus, NackOutcome, Subscription};
use crate::{IntegrationEvent, Result};

/// Error returned by a consumer. The delivery is nacked for redelivery.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct ConsumerError(Box<dyn std::error::Error + Send + Sync>);

impl ConsumerError {
    pub fn new(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self(error.into())
    }
}

/// Applies one integration event to the consumer's own module.
///
/// Deliveries are at-least-once, so applying the same event twice must leave
/// the module in the same state as applying it once.
#[async_trait]
pub trait Consumer: Send + Sync {
    type Event: IntegrationEvent;

    /// Durable queue name of the consumer.
    fn name(&self) -> &'static str;

    async fn consume(
        &self,
        event: Self::Event,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), ConsumerError>;
}

/// Counts of what one polling round did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub consumed: usize,
    pub requeued: usize,
    pub dead_lettered: usize,
}

impl WorkerStats {
    pub fn is_idle(&self) -> bool {
        self.consumed + self.requeued + self.dead_lettered == 0
    }
}

/// Runs one consumer against its subscription.
///
/// Each delivery is decoded, consumed and acked. Payloads that do not decode
/// are dead-lettered at once; consumer failures are nacked.
pub struct ConsumerWorker<C: Consumer> {
    consumer: Arc<C>,
    subscription: Box<dyn Subscription>,
    poll_interval: Duration,
    batch_size: usize,
}

impl<C: Consumer> ConsumerWorker<C> {
    /// Subscribes the consumer to its event type.
    pub async fn subscribe(bus: &dyn MessageBus, consumer: Arc<C>) -> Result<Self> {
        let subscription = bus
            .subscribe(consumer.name(), &[C::Event::EVENT_TYPE])
            .await?;
        Ok(Self {
            consumer,
            subscription,
            poll_interval: Duration::from_millis(250),
            batch_size: 16,
        })
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn name(&self) -> &'static str {
        self.consumer.name()
    }

    /// Polls once and handles every delivery received.
    pub async fn process_available(&self, cancel: &CancellationToken) -> Result<WorkerStats> {
        let mut stats = WorkerStats::default();
        for delivery in self.subscription.poll(self.batch_size).await? {
            if cancel.is_cancelled() {
                // Left in flight; redelivered after the visibility timeout.
                break;
            }
            self.handle(&delivery, cancel, &mut stats).await?;
        }
        Ok(stats)
    }

    #[tracing::instrument(
        skip(self, delivery, cancel, stats),
        fields(
            consumer = self.consumer.name(),
            message_id = %delivery.envelope.id,
            attempt = delivery.attempt
        )
    )]
    async fn handle(
        &self,
        delivery: &Delivery,
        cancel: &CancellationToken,
        stats: &mut WorkerStats,
    ) -> Result<()> {
        let event = match delivery.envelope.decode::<C::Event>() {
            Ok(event) => event,
            Err(error) => {
                self.subscription
                    .dead_letter(delivery, &error.to_string())
                    .await?;
                stats.dead_lettered += 1;
                return Ok(());
            }
        };

        match self.consumer.consume(event, cancel).await {
            Ok(()) => {
                self.subscription.ack(delivery).await?;
                metrics::counter!("bus_messages_consumed_total", "consumer" => self.consumer.name())
                    .increment(1);
                stats.consumed += 1;
            }
            Err(error) => {
                tracing::warn!(error = %error, "consumer failed, nacking delivery");
                match self.subscription.nack(delivery, &error.to_string()).await? {
                    NackOutcome::Requeued { .. } => stats.requeued += 1,
                    NackOutcome::DeadLettered => stats.dead_lettered += 1,
                }
            }
        }
        Ok(())
    }

    /// Polls until `cancel` fires. Bus errors are logged and retried on the
    /// next tick.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(consumer = self.name(), "consumer worker started");
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = interval.tick() => {
                    // Drain whatever is visible before waiting again.
                    loop {
                        match self.process_available(&cancel).await {
                            Ok(stats) if stats.is_idle() => break,
                            Ok(_) => {
                                if cancel.is_cancelled() {
                                    break;
                                }
                            }
                            Err(error) => {
                                tracing::error!(consumer = self.name(), error = %error, "consumer worker poll failed");
                                break;
                            }
                        }
                    }
                }
            }
        }
        tracing::info!(consumer = self.name(), "consumer worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use common::ProductId;

    use super::*;
    use crate::bus::BusSettings;
    use crate::{InMemoryMessageBus, MessageBusExt, MessageEnvelope, ProductDeleted};

    struct Counting {
        seen: AtomicUsize,
        failures_left: AtomicUsize,
    }

    impl Counting {
        fn failing(times: usize) -> Arc<Self> {
            Arc::new(Self {
                seen: AtomicUsize::new(0),
                failures_left: AtomicUsize::new(times),
            })
        }
    }

    #[async_trait]
    impl Consumer for Counting {
        type Event = ProductDeleted;

        fn name(&self) -> &'static str {
            "counting"
        }

        async fn consume(
            &self,
            _event: ProductDeleted,
            _cancel: &CancellationToken,
        ) -> std::result::Result<(), ConsumerError> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(ConsumerError::new("not yet"));
            }
            Ok(())
        }
    }

    fn bus() -> InMemoryMessageBus {
        InMemoryMessageBus::new(BusSettings {
            max_delivery_attempts: 3,
            redelivery_delay: Duration::ZERO,
            ..BusSettings::default()
        })
    }

    #[tokio::test]
    async fn consumed_messages_are_acked() {
        let bus = bus();
        let consumer = Counting::failing(0);
        let worker = ConsumerWorker::subscribe(&bus, Arc::clone(&consumer))
            .await
            .unwrap();
        bus.publish_event(&ProductDeleted {
            product_id: ProductId::new(),
        })
        .await
        .unwrap();

        let stats = worker
            .process_available(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stats.consumed, 1);
        assert_eq!(bus.pending("counting").await, 0);
    }

    #[tokio::test]
    async fn failures_are_retried_until_success() {
        let bus = bus();
        let consumer = Counting::failing(2);
        let worker = ConsumerWorker::subscribe(&bus, Arc::clone(&consumer))
            .await
            .unwrap();
        bus.publish_event(&ProductDeleted {
            product_id: ProductId::new(),
        })
        .await
        .unwrap();

        let cancel = CancellationToken::new();
        assert_eq!(worker.process_available(&cancel).await.unwrap().requeued, 1);
        assert_eq!(worker.process_available(&cancel).await.unwrap().requeued, 1);
        assert_eq!(worker.process_available(&cancel).await.unwrap().consumed, 1);
        assert_eq!(consumer.seen.load(Ordering::SeqCst), 3);
        assert!(bus.dead_letters("counting").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn persistent_failures_are_dead_lettered() {
        let bus = bus();
        let consumer = Counting::failing(usize::MAX);
        let worker = ConsumerWorker::subscribe(&bus, consumer).await.unwrap();
        bus.publish_event(&ProductDeleted {
            product_id: ProductId::new(),
        })
        .await
        .unwrap();

        let cancel = CancellationToken::new();
        for _ in 0..2 {
            worker.process_available(&cancel).await.unwrap();
        }
        let stats = worker.process_available(&cancel).await.unwrap();
        assert_eq!(stats.dead_lettered, 1);
        assert_eq!(bus.dead_letters("counting").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn poison_messages_are_dead_lettered_immediately() {
        let bus = bus();
        let consumer = Counting::failing(0);
        let worker = ConsumerWorker::subscribe(&bus, Arc::clone(&consumer))
            .await
            .unwrap();
        let mut envelope = MessageEnvelope::for_event(&ProductDeleted {
            product_id: ProductId::new(),
        })
        .unwrap();
        envelope.payload = serde_json::json!({ "product": "nope" });
        bus.publish(envelope).await.unwrap();

        let stats = worker
            .process_available(&CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(stats.dead_lettered, 1);
        assert_eq!(consumer.seen.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn run_stops_on_cancellation() {
        let bus = bus();
        let consumer = Counting::failing(0);
        let worker = ConsumerWorker::subscribe(&bus, Arc::clone(&consumer))
            .await
            .unwrap()
            .with_poll_interval(Duration::from_millis(5));
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(worker.run(cancel.clone()));

        bus.publish_event(&ProductDeleted {
            product_id: ProductId::new(),
        })
        .await
        .unwrap();
        for _ in 0..100 {
            if consumer.seen.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        cancel.cancel();
        handle.await.unwrap();

        assert_eq!(consumer.seen.load(Ordering::SeqCst), 1);
    }
}
