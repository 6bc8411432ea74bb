//! Cart aggregate and related types.

mod aggregate;
mod events;
mod item;

pub use aggregate::{Cart, CartLine, Withdrawal, product_term};
pub use events::CartEvent;
pub use item::{CartItem, CartStatus, MAX_ITEM_QUANTITY};
pub(crate) use item::quantity_in_range;

use common::{CartId, ProductId};
use thiserror::Error;

/// Errors that can occur during cart operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// Finalized carts accept no further changes.
    #[error("Cart {cart_id} is finalized")]
    Finalized { cart_id: CartId },

    #[error("Invalid quantity {quantity} for product {product_id} (must be between 1 and {max})", max = MAX_ITEM_QUANTITY)]
    InvalidQuantity { product_id: ProductId, quantity: u32 },

    #[error("Product {product_id} is not in the cart")]
    ItemNotFound { product_id: ProductId },
}
