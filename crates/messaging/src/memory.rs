use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::MessageId;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::bus::{BusSettings, DeadLetter, Delivery, MessageBus, NackOutcome, Subscription};
use crate::{MessageEnvelope, MessagingError, Result};

/// Dead letters kept per bus; the oldest are dropped first.
pub const DEAD_LETTER_CAPACITY: usize = 1_000;

struct Entry {
    envelope: MessageEnvelope,
    attempts: u32,
    visible_at: Instant,
}

#[derive(Default)]
struct Queue {
    event_types: HashSet<String>,
    ready: VecDeque<Entry>,
    in_flight: HashMap<MessageId, Entry>,
}

impl Queue {
    fn holds(&self, id: MessageId) -> bool {
        self.in_flight.contains_key(&id) || self.ready.iter().any(|e| e.envelope.id == id)
    }
}

#[derive(Default)]
struct State {
    queues: HashMap<String, Queue>,
    dead: VecDeque<DeadLetter>,
}

/// In-process at-least-once bus.
///
/// Queues live as long as the bus. Redelivery, dead-lettering and the
/// visibility timeout follow the same [`BusSettings`] as the PostgreSQL bus.
/// Only the last [`DEAD_LETTER_CAPACITY`] dead letters are retained, and a
/// republished message id is ignored only while the consumer still holds it.
#[derive(Clone)]
pub struct InMemoryMessageBus {
    state: Arc<Mutex<State>>,
    settings: BusSettings,
}

impl Default for InMemoryMessageBus {
    fn default() -> Self {
        Self::new(BusSettings::default())
    }
}

impl InMemoryMessageBus {
    pub fn new(settings: BusSettings) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            settings,
        }
    }

    pub fn settings(&self) -> BusSettings {
        self.settings
    }

    /// Number of messages waiting or in flight for a consumer.
    pub async fn pending(&self, consumer: &str) -> usize {
        let state = self.state.lock().await;
        state
            .queues
            .get(consumer)
            .map_or(0, |q| q.ready.len() + q.in_flight.len())
    }
}

fn dead_letter(state: &mut State, consumer: &str, entry: Entry, reason: &str) {
    tracing::warn!(
        consumer,
        message_id = %entry.envelope.id,
        event_type = %entry.envelope.event_type,
        attempts = entry.attempts,
        reason,
        "message dead-lettered"
    );
    metrics::counter!("bus_messages_dead_lettered_total", "consumer" => consumer.to_string())
        .increment(1);
    if state.dead.len() >= DEAD_LETTER_CAPACITY {
        state.dead.pop_front();
    }
    state.dead.push_back(DeadLetter {
        consumer: consumer.to_string(),
        envelope: entry.envelope,
        attempts: entry.attempts,
        reason: reason.to_string(),
        dead_lettered_at: Utc::now(),
    });
}

#[async_trait]
impl MessageBus for InMemoryMessageBus {
    async fn publish(&self, envelope: MessageEnvelope) -> Result<()> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        for queue in state.queues.values_mut() {
            if queue.event_types.contains(&envelope.event_type) && !queue.holds(envelope.id) {
                queue.ready.push_back(Entry {
                    envelope: envelope.clone(),
                    attempts: 0,
                    visible_at: now,
                });
            }
        }
        metrics::counter!("bus_messages_published_total", "event_type" => envelope.event_type.clone())
            .increment(1);
        tracing::debug!(message_id = %envelope.id, event_type = %envelope.event_type, "message published");
        Ok(())
    }

    async fn subscribe(
        &self,
        consumer: &str,
        event_types: &[&str],
    ) -> Result<Box<dyn Subscription>> {
        let mut state = self.state.lock().await;
        let queue = state.queues.entry(consumer.to_string()).or_default();
        queue
            .event_types
            .extend(event_types.iter().map(|t| t.to_string()));
        Ok(Box::new(InMemorySubscription {
            consumer: consumer.to_string(),
            state: Arc::clone(&self.state),
            settings: self.settings,
        }))
    }

    async fn dead_letters(&self, consumer: &str) -> Result<Vec<DeadLetter>> {
        let state = self.state.lock().await;
        Ok(state
            .dead
            .iter()
            .filter(|d| d.consumer == consumer)
            .cloned()
            .collect())
    }
}

struct InMemorySubscription {
    consumer: String,
    state: Arc<Mutex<State>>,
    settings: BusSettings,
}

impl InMemorySubscription {
    fn unknown(&self, delivery: &Delivery) -> MessagingError {
        MessagingError::UnknownDelivery {
            message_id: delivery.envelope.id,
            consumer: self.consumer.clone(),
        }
    }
}

#[async_trait]
impl Subscription for InMemorySubscription {
    fn consumer(&self) -> &str {
        &self.consumer
    }

    async fn poll(&self, max: usize) -> Result<Vec<Delivery>> {
        let mut state = self.state.lock().await;
        let now = Instant::now();
        let max_attempts = self.settings.max_delivery_attempts;
        let Some(queue) = state.queues.get_mut(&self.consumer) else {
            return Ok(Vec::new());
        };

        // Deliveries whose visibility timeout expired become visible again.
        let expired: Vec<MessageId> = queue
            .in_flight
            .iter()
            .filter(|(_, e)| e.visible_at <= now)
            .map(|(id, _)| *id)
            .collect();
        let mut exhausted = Vec::new();
        for id in expired {
            if let Some(entry) = queue.in_flight.remove(&id) {
                if entry.attempts >= max_attempts {
                    exhausted.push(entry);
                } else {
                    queue.ready.push_back(entry);
                }
            }
        }

        let mut deliveries = Vec::new();
        let mut waiting = VecDeque::with_capacity(queue.ready.len());
        while let Some(mut entry) = queue.ready.pop_front() {
            if deliveries.len() >= max || entry.visible_at > now {
                waiting.push_back(entry);
                continue;
            }
            entry.attempts += 1;
            entry.visible_at = now + self.settings.visibility_timeout;
            deliveries.push(Delivery {
                envelope: entry.envelope.clone(),
                attempt: entry.attempts,
            });
            queue.in_flight.insert(entry.envelope.id, entry);
        }
        queue.ready = waiting;

        for entry in exhausted {
            dead_letter(&mut state, &self.consumer, entry, "visibility timeout expired");
        }
        Ok(deliveries)
    }

    async fn ack(&self, delivery: &Delivery) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .queues
            .get_mut(&self.consumer)
            .and_then(|q| q.in_flight.remove(&delivery.envelope.id))
            .map(|_| ())
            .ok_or_else(|| self.unknown(delivery))
    }

    async fn nack(&self, delivery: &Delivery, reason: &str) -> Result<NackOutcome> {
        let mut state = self.state.lock().await;
        let mut entry = state
            .queues
            .get_mut(&self.consumer)
            .and_then(|q| q.in_flight.remove(&delivery.envelope.id))
            .ok_or_else(|| self.unknown(delivery))?;

        if entry.attempts >= self.settings.max_delivery_attempts {
            dead_letter(&mut state, &self.consumer, entry, reason);
            return Ok(NackOutcome::DeadLettered);
        }

        let delay = self.settings.redelivery_delay;
        entry.visible_at = Instant::now() + delay;
        if let Some(queue) = state.queues.get_mut(&self.consumer) {
            queue.ready.push_back(entry);
        }
        metrics::counter!("bus_messages_redelivered_total", "consumer" => self.consumer.clone())
            .increment(1);
        Ok(NackOutcome::Requeued { delay })
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        let entry = state
            .queues
            .get_mut(&self.consumer)
            .and_then(|q| q.in_flight.remove(&delivery.envelope.id))
            .ok_or_else(|| self.unknown(delivery))?;
        dead_letter(&mut state, &self.consumer, entry, reason);
        Ok(())
    }
}
