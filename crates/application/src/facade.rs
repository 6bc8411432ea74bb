//! Synchronous contracts one module exposes to the others.
//!
//! Façade calls never share a transaction with the caller: a write through a
//! façade commits the owning module's unit of work on its own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CartId, Money, Percentage, ProductId, UserId};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::Result;

/// Read model of a cart handed to other modules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartSnapshot {
    pub cart_id: CartId,
    pub user_id: UserId,
    pub date: DateTime<Utc>,
    pub finalized: bool,
    pub items: Vec<CartSnapshotItem>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CartSnapshotItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
    pub discount: Percentage,
}

/// What `finalize_cart` found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CartFinalization {
    Finalized,
    AlreadyFinalized,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductSnapshot {
    pub product_id: ProductId,
    pub title: String,
    pub price: Money,
}

#[async_trait]
pub trait CartsFacade: Send + Sync {
    async fn cart_snapshot(
        &self,
        cart_id: CartId,
        cancel: &CancellationToken,
    ) -> Result<CartSnapshot>;

    /// Finalizes the cart. A cart that is already finalized is left as is.
    async fn finalize_cart(
        &self,
        cart_id: CartId,
        cancel: &CancellationToken,
    ) -> Result<CartFinalization>;

    /// Withdraws the product from every active cart and returns how many
    /// carts changed. Carts left empty are finalized.
    async fn remove_product_from_active_carts(
        &self,
        product_id: ProductId,
        cancel: &CancellationToken,
    ) -> Result<usize>;
}

#[async_trait]
pub trait ProductsFacade: Send + Sync {
    async fn product_snapshot(
        &self,
        product_id: ProductId,
        cancel: &CancellationToken,
    ) -> Result<ProductSnapshot>;
}

#[async_trait]
pub trait UsersFacade: Send + Sync {
    async fn user_exists(&self, user_id: UserId, cancel: &CancellationToken) -> Result<bool>;
}
