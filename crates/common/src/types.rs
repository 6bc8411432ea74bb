use std::fmt::{Debug, Display};
use std::hash::Hash;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of a stored entity.
///
/// Implemented by every typed id so that storage can key documents by UUID
/// without knowing which module they belong to.
pub trait EntityId: Copy + Eq + Hash + Debug + Display + Send + Sync + 'static {
    /// Wraps an existing UUID.
    fn from_uuid(uuid: Uuid) -> Self;

    /// Returns the underlying UUID.
    fn as_uuid(&self) -> Uuid;
}

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an identifier from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl EntityId for $name {
            fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            fn as_uuid(&self) -> Uuid {
                self.0
            }
        }
    };
}

entity_id!(
    /// Identifier of a shopping cart.
    CartId
);
entity_id!(
    /// Identifier of a sale.
    SaleId
);
entity_id!(
    /// Identifier of a registered user.
    UserId
);
entity_id!(
    /// Identifier of a catalogue product.
    ProductId
);
entity_id!(
    /// Identifier of a quantity-based discount rule.
    DiscountRuleId
);
entity_id!(
    /// Identifier of a message published on the integration bus.
    MessageId
);
