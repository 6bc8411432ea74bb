//! Integration events exchanged between modules.
//!
//! Payloads carry identifiers only; consumers read whatever else they need
//! from their own module.

use common::{CartId, ProductId};
use serde::{Deserialize, Serialize, de::DeserializeOwned};

/// A message type published on the bus.
pub trait IntegrationEvent: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Routing key; subscriptions select messages by it.
    const EVENT_TYPE: &'static str;
}

/// A product was removed from the catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDeleted {
    pub product_id: ProductId,
}

impl IntegrationEvent for ProductDeleted {
    const EVENT_TYPE: &'static str = "ProductDeleted";
}

/// A cart reached its terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizedCart {
    pub cart_id: CartId,
}

impl IntegrationEvent for FinalizedCart {
    const EVENT_TYPE: &'static str = "FinalizedCart";
}
