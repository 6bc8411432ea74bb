use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::MessageId;
use serde::{Deserialize, Serialize};

use crate::{IntegrationEvent, MessagingError, Result};

/// A published message: routing data plus the JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub id: MessageId,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl MessageEnvelope {
    /// Wraps an event in a new envelope.
    pub fn for_event<E: IntegrationEvent>(event: &E) -> Result<Self> {
        Ok(Self {
            id: MessageId::new(),
            event_type: E::EVENT_TYPE.to_string(),
            payload: serde_json::to_value(event)?,
            published_at: Utc::now(),
            metadata: BTreeMap::new(),
        })
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Decodes the payload as `E`, checking the event type first.
    pub fn decode<E: IntegrationEvent>(&self) -> Result<E> {
        if self.event_type != E::EVENT_TYPE {
            return Err(MessagingError::UnexpectedEventType {
                expected: E::EVENT_TYPE,
                actual: self.event_type.clone(),
            });
        }
        serde_json::from_value(self.payload.clone()).map_err(|source| MessagingError::Decode {
            message_id: self.id,
            event_type: self.event_type.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use common::{CartId, ProductId};

    use super::*;
    use crate::{FinalizedCart, ProductDeleted};

    #[test]
    fn payload_carries_only_the_id() {
        let product_id = ProductId::new();
        let envelope = MessageEnvelope::for_event(&ProductDeleted { product_id })
            .unwrap()
            .with_metadata("source", "products");

        assert_eq!(envelope.event_type, "ProductDeleted");
        assert_eq!(
            envelope.payload,
            serde_json::json!({ "product_id": product_id.to_string() })
        );
        assert_eq!(envelope.metadata["source"], "products");
        assert_eq!(
            envelope.decode::<ProductDeleted>().unwrap(),
            ProductDeleted { product_id }
        );
    }

    #[test]
    fn decode_rejects_other_event_types() {
        let envelope = MessageEnvelope::for_event(&FinalizedCart {
            cart_id: CartId::new(),
        })
        .unwrap();
        assert!(matches!(
            envelope.decode::<ProductDeleted>(),
            Err(MessagingError::UnexpectedEventType { .. })
        ));
    }

    #[test]
    fn decode_reports_malformed_payloads() {
        let mut envelope = MessageEnvelope::for_event(&ProductDeleted {
            product_id: ProductId::new(),
        })
        .unwrap();
        envelope.payload = serde_json::json!({ "product_id": 17 });
        assert!(matches!(
            envelope.decode::<ProductDeleted>(),
            Err(MessagingError::Decode { .. })
        ));
    }
}
