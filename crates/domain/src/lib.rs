//! Domain layer for the store modules.
//!
//! Aggregates are plain values: commands mutate them in memory and buffer
//! domain events, and the persistence layer stores them as documents and
//! dispatches the events when a unit of work commits.
//!
//! - [`Cart`] with its items and the discount-rule engine
//! - [`Sale`] snapshotted from a cart
//! - [`Product`] and [`User`]

pub mod cart;
pub mod discount;
pub mod product;
pub mod sale;
pub mod user;

pub use cart::{
    Cart, CartError, CartEvent, CartItem, CartLine, CartStatus, MAX_ITEM_QUANTITY, Withdrawal,
    product_term,
};
pub use discount::{
    DiscountRule, DiscountRuleError, DiscountRuleEvent, default_rules, select_discount,
};
pub use product::{Product, ProductDetails, ProductError, ProductEvent, Rating};
pub use sale::{ItemCancellation, Sale, SaleError, SaleEvent, SaleItem, SaleStatus};
pub use user::{Name, User, UserError, UserEvent, UserRole, UserStatus};
