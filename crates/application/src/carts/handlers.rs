use std::sync::Arc;

use async_trait::async_trait;
use domain::CartEvent;
use messaging::{FinalizedCart, MessageBus, MessageBusExt};
use persistence::{EventHandler, HandlerError, HandlerOutcome};
use tokio_util::sync::CancellationToken;

/// Bridges `CartFinalized` to the `FinalizedCart` integration event.
pub struct PublishFinalizedCart {
    bus: Arc<dyn MessageBus>,
}

impl PublishFinalizedCart {
    pub const NAME: &'static str = "publish_finalized_cart";

    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl EventHandler<CartEvent> for PublishFinalizedCart {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn handle(
        &self,
        event: &CartEvent,
        _cancel: &CancellationToken,
    ) -> Result<HandlerOutcome, HandlerError> {
        let CartEvent::CartFinalized { cart_id, .. } = event else {
            return Ok(HandlerOutcome::Skipped);
        };
        self.bus
            .publish_event(&FinalizedCart { cart_id: *cart_id })
            .await
            .map_err(HandlerError::new)?;
        Ok(HandlerOutcome::Applied)
    }
}
