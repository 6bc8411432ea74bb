use chrono::{DateTime, Utc};
use common::{CartId, ProductId, SaleId};
use serde::Deserialize;
use validator::Validate;

/// Command to turn a cart into a sale.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateSaleFromCart {
    pub cart_id: CartId,
    #[validate(length(min = 1, max = 100, message = "Branch must be 1-100 characters"))]
    pub branch: String,
    /// Defaults to now.
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
}

impl CreateSaleFromCart {
    pub fn new(cart_id: CartId, branch: impl Into<String>) -> Self {
        Self {
            cart_id,
            branch: branch.into(),
            date: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateSale {
    pub sale_id: SaleId,
    #[validate(length(min = 1, max = 100, message = "Branch must be 1-100 characters"))]
    pub branch: String,
    pub date: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CancelSale {
    pub sale_id: SaleId,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct FinishSale {
    pub sale_id: SaleId,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RemoveSaleItem {
    pub sale_id: SaleId,
    pub product_id: ProductId,
}
