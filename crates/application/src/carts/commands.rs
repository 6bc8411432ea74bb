use chrono::{DateTime, Utc};
use common::{CartId, DiscountRuleId, ProductId, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// A requested product and quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct CartProduct {
    pub product_id: ProductId,
    #[validate(range(min = 1, max = 20, message = "Quantity must be between 1 and 20"))]
    pub quantity: u32,
}

impl CartProduct {
    pub fn new(product_id: ProductId, quantity: u32) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Command to open a user's cart.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateCart {
    pub user_id: UserId,
    pub date: DateTime<Utc>,
    #[validate(length(min = 1, message = "At least one product is required"), nested)]
    pub products: Vec<CartProduct>,
}

impl CreateCart {
    pub fn new(user_id: UserId, date: DateTime<Utc>) -> Self {
        Self {
            user_id,
            date,
            products: Vec::new(),
        }
    }

    pub fn with_product(mut self, product_id: ProductId, quantity: u32) -> Self {
        self.products.push(CartProduct::new(product_id, quantity));
        self
    }
}

/// Command to replace a cart's lines and optionally move its date.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateCart {
    pub cart_id: CartId,
    #[serde(default)]
    pub date: Option<DateTime<Utc>>,
    #[validate(length(min = 1, message = "At least one product is required"), nested)]
    pub products: Vec<CartProduct>,
}

impl UpdateCart {
    pub fn new(cart_id: CartId) -> Self {
        Self {
            cart_id,
            date: None,
            products: Vec::new(),
        }
    }

    pub fn with_product(mut self, product_id: ProductId, quantity: u32) -> Self {
        self.products.push(CartProduct::new(product_id, quantity));
        self
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DeleteCart {
    pub cart_id: CartId,
}

/// Command to add a discount tier.
#[derive(Debug, Clone, Copy, Deserialize, Validate)]
pub struct CreateDiscountRule {
    #[validate(range(min = 1, message = "Minimum quantity must be at least 1"))]
    pub min_quantity: u32,
    #[validate(range(min = 1, message = "Maximum quantity must be at least 1"))]
    pub max_quantity: u32,
    /// Percentage off, 0 to 100 with two decimals.
    pub discount: Decimal,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DeactivateDiscountRule {
    pub rule_id: DiscountRuleId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantities_outside_range_fail_validation() {
        let user = UserId::new();
        let ok = CreateCart::new(user, Utc::now()).with_product(ProductId::new(), 20);
        assert!(ok.validate().is_ok());

        let too_many = CreateCart::new(user, Utc::now()).with_product(ProductId::new(), 21);
        assert!(too_many.validate().is_err());

        let zero = UpdateCart::new(CartId::new()).with_product(ProductId::new(), 0);
        assert!(zero.validate().is_err());
    }

    #[test]
    fn line_errors_are_reported_under_products() {
        let cmd = CreateCart::new(UserId::new(), Utc::now())
            .with_product(ProductId::new(), 2)
            .with_product(ProductId::new(), 25);
        let errors = cmd.validate().unwrap_err();
        assert!(errors.errors().contains_key("products"));
    }

    #[test]
    fn empty_product_list_fails_validation() {
        assert!(CreateCart::new(UserId::new(), Utc::now()).validate().is_err());
        assert!(UpdateCart::new(CartId::new()).validate().is_err());
    }
}
