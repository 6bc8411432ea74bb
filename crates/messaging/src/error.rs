use common::MessageId;
use thiserror::Error;

/// Errors that can occur on the integration bus.
#[derive(Debug, Error)]
pub enum MessagingError {
    /// The envelope payload does not decode as the expected event.
    #[error("Cannot decode {event_type} message {message_id}: {source}")]
    Decode {
        message_id: MessageId,
        event_type: String,
        #[source]
        source: serde_json::Error,
    },

    /// The envelope carries a different event type than expected.
    #[error("Unexpected event type {actual} (expected {expected})")]
    UnexpectedEventType {
        expected: &'static str,
        actual: String,
    },

    /// Ack or nack of a delivery the subscription does not hold.
    #[error("Delivery of message {message_id} is not in flight for {consumer}")]
    UnknownDelivery {
        message_id: MessageId,
        consumer: String,
    },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Result type alias for bus operations.
pub type Result<T> = std::result::Result<T, MessagingError>;
