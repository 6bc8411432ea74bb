use std::sync::Arc;

use async_trait::async_trait;
use domain::ProductEvent;
use messaging::{MessageBus, MessageBusExt, ProductDeleted};
use persistence::{EventHandler, HandlerError, HandlerOutcome};
use tokio_util::sync::CancellationToken;

/// Announces deleted products on the bus.
///
/// Runs before the deletion is flushed; a publish failure aborts the delete.
pub struct PublishProductDeleted {
    bus: Arc<dyn MessageBus>,
}

impl PublishProductDeleted {
    pub const NAME: &'static str = "publish_product_deleted";

    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl EventHandler<ProductEvent> for PublishProductDeleted {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    async fn handle(
        &self,
        event: &ProductEvent,
        _cancel: &CancellationToken,
    ) -> Result<HandlerOutcome, HandlerError> {
        let ProductEvent::ProductDeleted { product_id } = event else {
            return Ok(HandlerOutcome::Skipped);
        };
        let envelope = self
            .bus
            .publish_event(&ProductDeleted {
                product_id: *product_id,
            })
            .await
            .map_err(HandlerError::new)?;
        tracing::info!(%product_id, message_id = %envelope.id, "product deletion published");
        Ok(HandlerOutcome::Applied)
    }
}
