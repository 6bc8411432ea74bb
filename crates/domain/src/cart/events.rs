//! Cart domain events.

use chrono::{DateTime, Utc};
use common::{CartId, Percentage, ProductId, UserId};
use persistence::DomainEvent;

/// Facts raised by a [`super::Cart`] while it changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CartEvent {
    CartCreated {
        cart_id: CartId,
        user_id: UserId,
    },
    CartItemAdded {
        cart_id: CartId,
        product_id: ProductId,
        quantity: u32,
    },
    CartItemRemoved {
        cart_id: CartId,
        product_id: ProductId,
    },
    CartItemQuantityChanged {
        cart_id: CartId,
        product_id: ProductId,
        old_quantity: u32,
        new_quantity: u32,
    },
    /// A line's discount changed when the rules were re-applied.
    CartDiscountApplied {
        cart_id: CartId,
        product_id: ProductId,
        discount: Percentage,
    },
    CartRescheduled {
        cart_id: CartId,
        date: DateTime<Utc>,
    },
    CartFinalized {
        cart_id: CartId,
        user_id: UserId,
    },
}

impl DomainEvent for CartEvent {
    const EVENT_TYPES: &'static [&'static str] = &[
        "CartCreated",
        "CartItemAdded",
        "CartItemRemoved",
        "CartItemQuantityChanged",
        "CartDiscountApplied",
        "CartRescheduled",
        "CartFinalized",
    ];

    fn event_type(&self) -> &'static str {
        match self {
            CartEvent::CartCreated { .. } => "CartCreated",
            CartEvent::CartItemAdded { .. } => "CartItemAdded",
            CartEvent::CartItemRemoved { .. } => "CartItemRemoved",
            CartEvent::CartItemQuantityChanged { .. } => "CartItemQuantityChanged",
            CartEvent::CartDiscountApplied { .. } => "CartDiscountApplied",
            CartEvent::CartRescheduled { .. } => "CartRescheduled",
            CartEvent::CartFinalized { .. } => "CartFinalized",
        }
    }
}
