use common::{CartId, Money, Percentage, ProductId};
use serde::{Deserialize, Serialize};

/// Largest quantity of one product a cart (or sale) line may hold.
pub const MAX_ITEM_QUANTITY: u32 = 20;

/// Returns true if `quantity` is an allowed line quantity.
pub(crate) fn quantity_in_range(quantity: u32) -> bool {
    (1..=MAX_ITEM_QUANTITY).contains(&quantity)
}

/// The state of a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CartStatus {
    #[default]
    Active,
    /// Terminal: a sale was created from the cart or it was emptied by
    /// product withdrawal.
    Finalized,
}

impl CartStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CartStatus::Active => "Active",
            CartStatus::Finalized => "Finalized",
        }
    }
}

impl std::fmt::Display for CartStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One product line of a cart.
///
/// The unit price is captured when the product is added and is not
/// re-read afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub cart_id: CartId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    #[serde(default)]
    pub discount: Percentage,
}

impl CartItem {
    /// Line total after discount, rounded to the cent.
    pub fn total(&self) -> Money {
        self.unit_price.discounted(self.quantity, self.discount)
    }
}
