use std::sync::Arc;

use async_trait::async_trait;
use messaging::{Consumer, ConsumerError, ProductDeleted};
use tokio_util::sync::CancellationToken;

use crate::facade::CartsFacade;

/// Removes deleted products from active carts.
///
/// Withdrawing a product that is already gone changes nothing, so
/// redeliveries are harmless.
pub struct RemoveDeletedProductFromCarts {
    carts: Arc<dyn CartsFacade>,
}

impl RemoveDeletedProductFromCarts {
    pub const NAME: &'static str = "carts.product-deleted";

    pub fn new(carts: Arc<dyn CartsFacade>) -> Self {
        Self { carts }
    }
}

#[async_trait]
impl Consumer for RemoveDeletedProductFromCarts {
    type Event = ProductDeleted;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn consume(
        &self,
        event: ProductDeleted,
        cancel: &CancellationToken,
    ) -> Result<(), ConsumerError> {
        self.carts
            .remove_product_from_active_carts(event.product_id, cancel)
            .await
            .map_err(ConsumerError::new)?;
        Ok(())
    }
}
