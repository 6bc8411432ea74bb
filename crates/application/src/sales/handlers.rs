use std::sync::Arc;

use async_trait::async_trait;
use common::CartId;
use domain::SaleEvent;
use persistence::{EventHandler, HandlerError, HandlerOutcome};
use tokio_util::sync::CancellationToken;

use crate::facade::{CartFinalization, CartsFacade};

/// The source cart was finalized by another sale between the snapshot and
/// the commit.
#[derive(Debug, thiserror::Error)]
#[error("Cart {0} already has a sale")]
pub struct CartAlreadySold(pub CartId);

/// Finalizes the cart a new sale was made from.
///
/// The cart is committed by the Carts module on its own. When that fails the
/// sale is still stored and the outcome is reported as deferred. A cart
/// already finalized aborts the sale's commit.
pub struct FinalizeSourceCart {
    carts: Arc<dyn CartsFacade>,
}

impl FinalizeSourceCart {
    pub const NAME: &'static str = "finalize_source_cart";

    pub fn new(carts: Arc<dyn CartsFacade>) -> Self {
        Self { carts }
    }
}

#[async_trait]
impl EventHandler<SaleEvent> for FinalizeSourceCart {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn handle(
        &self,
        event: &SaleEvent,
        cancel: &CancellationToken,
    ) -> Result<HandlerOutcome, HandlerError> {
        let SaleEvent::SaleCreated {
            sale_id, cart_id, ..
        } = event
        else {
            return Ok(HandlerOutcome::Skipped);
        };

        match self.carts.finalize_cart(*cart_id, cancel).await {
            Ok(CartFinalization::Finalized) => Ok(HandlerOutcome::Applied),
            Ok(CartFinalization::AlreadyFinalized) => {
                tracing::warn!(%sale_id, %cart_id, "source cart already finalized, rejecting sale");
                Err(HandlerError::new(CartAlreadySold(*cart_id)))
            }
            Err(error) => Ok(HandlerOutcome::deferred(format!(
                "cart {cart_id} not finalized: {error}"
            ))),
        }
    }
}
