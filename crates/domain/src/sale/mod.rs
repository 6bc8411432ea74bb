//! Sale aggregate and related types.

mod aggregate;
mod events;
mod item;

pub use aggregate::{ItemCancellation, Sale};
pub use events::SaleEvent;
pub use item::{SaleItem, SaleStatus};

use common::{ProductId, SaleId};
use thiserror::Error;

/// Errors that can occur during sale operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SaleError {
    #[error("Branch is required")]
    BranchRequired,

    /// Sale is not in a state that allows the action.
    #[error("Invalid state transition: cannot {action} a {status} sale")]
    InvalidStateTransition {
        sale_id: SaleId,
        status: SaleStatus,
        action: &'static str,
    },

    #[error("Invalid quantity {quantity} for product {product_id} (must be between 1 and {max})", max = crate::cart::MAX_ITEM_QUANTITY)]
    InvalidQuantity { product_id: ProductId, quantity: u32 },

    #[error("Product {product_id} is already part of the sale")]
    DuplicateItem { product_id: ProductId },

    #[error("Product {product_id} is not part of the sale")]
    ItemNotFound { product_id: ProductId },
}
