use async_trait::async_trait;
use common::{Filter, ListQuery};
use domain::{Sale, SaleStatus, product_term};
use messaging::{Consumer, ConsumerError, ProductDeleted};
use persistence::Repository;
use tokio_util::sync::CancellationToken;

/// Cancels the items of deleted products in active sales.
///
/// Only active sales still holding the product are touched, so a redelivered
/// event finds nothing left to do.
pub struct CancelDeletedProductInSales {
    sales: Repository<Sale>,
}

impl CancelDeletedProductInSales {
    pub const NAME: &'static str = "sales.product-deleted";

    pub fn new(sales: Repository<Sale>) -> Self {
        Self { sales }
    }
}

#[async_trait]
impl Consumer for CancelDeletedProductInSales {
    type Event = ProductDeleted;

    fn name(&self) -> &'static str {
        Self::NAME
    }

    #[tracing::instrument(skip(self, cancel), fields(product_id = %event.product_id))]
    async fn consume(
        &self,
        event: ProductDeleted,
        cancel: &CancellationToken,
    ) -> Result<(), ConsumerError> {
        let query = ListQuery::new()
            .filter(Filter::term(product_term(event.product_id)))
            .filter(Filter::eq("status", SaleStatus::Active.as_str()));
        let sales = self
            .sales
            .find_all(query, cancel)
            .await
            .map_err(ConsumerError::new)?;

        let mut uow = self.sales.begin();
        for mut sale in sales {
            if sale.item(event.product_id).is_none() {
                continue;
            }
            sale.cancel_item(event.product_id)
                .map_err(ConsumerError::new)?;
            uow.update(sale);
        }
        if uow.is_empty() {
            return Ok(());
        }
        let receipt = uow.commit(cancel).await.map_err(ConsumerError::new)?;
        tracing::info!(sales = receipt.changes, "deleted product canceled in sales");
        Ok(())
    }
}
