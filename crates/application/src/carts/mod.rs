//! Carts module: carts, the discount-rule catalogue, and the cart side of
//! product deletion.

mod commands;
mod consumer;
mod discount_rules;
mod handlers;
mod service;

pub use commands::{
    CartProduct, CreateCart, CreateDiscountRule, DeactivateDiscountRule, DeleteCart, UpdateCart,
};
pub use consumer::RemoveDeletedProductFromCarts;
pub use discount_rules::DiscountRuleService;
pub use handlers::PublishFinalizedCart;
pub use service::CartService;
