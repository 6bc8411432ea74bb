//! Integration event bus shared by the store modules.
//!
//! Modules publish [`IntegrationEvent`]s wrapped in [`MessageEnvelope`]s.
//! Delivery is at-least-once: every subscribed consumer gets its own copy,
//! acks it when applied and nacks it for a delayed retry. Deliveries that
//! keep failing end up dead-lettered.

pub mod bus;
pub mod consumer;
pub mod envelope;
pub mod error;
pub mod event;
pub mod memory;
pub mod postgres;

pub use bus::{
    BusSettings, DeadLetter, Delivery, MessageBus, MessageBusExt, NackOutcome, Subscription,
};
pub use consumer::{Consumer, ConsumerError, ConsumerWorker, WorkerStats};
pub use envelope::MessageEnvelope;
pub use error::{MessagingError, Result};
pub use event::{FinalizedCart, IntegrationEvent, ProductDeleted};
pub use memory::{DEAD_LETTER_CAPACITY, InMemoryMessageBus};
pub use postgres::PostgresMessageBus;
