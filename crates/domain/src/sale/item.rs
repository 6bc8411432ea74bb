use common::{Money, Percentage, ProductId, SaleId};
use serde::{Deserialize, Serialize};

/// The state of a sale.
///
/// State transitions:
/// ```text
/// Active ──┬──► Finalized
///          └──► Canceled   (explicitly, or when its last item is canceled)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SaleStatus {
    #[default]
    Active,
    Finalized,
    Canceled,
}

impl SaleStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, SaleStatus::Active)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Active => "Active",
            SaleStatus::Finalized => "Finalized",
            SaleStatus::Canceled => "Canceled",
        }
    }
}

impl std::fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One product line of a sale, snapshotted from the source cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleItem {
    pub sale_id: SaleId,
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    pub discount: Percentage,
}

impl SaleItem {
    /// `unit_price × quantity × (1 − discount)`, rounded half away from zero
    /// to the cent.
    pub fn total(&self) -> Money {
        self.unit_price.discounted(self.quantity, self.discount)
    }
}
