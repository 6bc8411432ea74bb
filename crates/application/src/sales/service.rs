use std::sync::Arc;

use chrono::Utc;
use common::{Filter, ListQuery, Page, SaleId};
use domain::{Sale, SaleStatus};
use persistence::{Document, HandlerOutcome, Repository};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use validator::Validate;

use super::{
    CancelSale, CreateSaleFromCart, FinalizeSourceCart, FinishSale, RemoveSaleItem, UpdateSale,
};
use crate::facade::CartsFacade;
use crate::{ApplicationError, Result, saved};

/// What happened to the source cart when a sale was created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum CartFinalizationStatus {
    Finalized,
    /// The sale is stored but the cart was not finalized.
    Deferred { reason: String },
}

/// Result of `create_sale_from_cart`.
#[derive(Debug, Clone)]
pub struct CreatedSale {
    pub sale: Sale,
    pub cart_finalization: CartFinalizationStatus,
}

/// Service for managing sales.
#[derive(Clone)]
pub struct SaleService {
    sales: Repository<Sale>,
    carts: Arc<dyn CartsFacade>,
}

impl SaleService {
    pub fn new(sales: Repository<Sale>, carts: Arc<dyn CartsFacade>) -> Self {
        Self { sales, carts }
    }

    /// Creates a sale from a non-empty, active cart.
    ///
    /// Items, prices and discounts are copied from the cart. The cart is
    /// finalized by a handler of `SaleCreated`; if that fails the sale is
    /// still created and the result says so. A cart finalized concurrently
    /// by another sale rejects this one with `InvalidOperation`.
    #[tracing::instrument(skip(self, cancel), fields(cart_id = %cmd.cart_id))]
    pub async fn create_sale_from_cart(
        &self,
        cmd: CreateSaleFromCart,
        cancel: &CancellationToken,
    ) -> Result<CreatedSale> {
        cmd.validate()?;
        let cart = self.carts.cart_snapshot(cmd.cart_id, cancel).await?;
        if cart.finalized {
            return Err(ApplicationError::InvalidOperation(format!(
                "Cart {} is already finalized",
                cmd.cart_id
            )));
        }
        if cart.items.is_empty() {
            return Err(ApplicationError::InvalidOperation(format!(
                "Cart {} has no items",
                cmd.cart_id
            )));
        }

        let date = cmd.date.unwrap_or_else(Utc::now);
        let mut sale = Sale::create(date, cart.user_id, cmd.branch, cart.cart_id)?;
        for item in &cart.items {
            sale.add_item(item.product_id, item.quantity, item.unit_price, item.discount)?;
        }

        let mut uow = self.sales.begin();
        uow.add(sale);
        let receipt = uow.commit(cancel).await?;
        let cart_finalization = match receipt.report(FinalizeSourceCart::NAME) {
            Some(report) => match &report.outcome {
                HandlerOutcome::Applied => CartFinalizationStatus::Finalized,
                HandlerOutcome::Deferred { reason } => CartFinalizationStatus::Deferred {
                    reason: reason.clone(),
                },
                HandlerOutcome::Skipped => CartFinalizationStatus::Deferred {
                    reason: "cart finalization was skipped".into(),
                },
            },
            None => CartFinalizationStatus::Deferred {
                reason: "no handler finalized the cart".into(),
            },
        };
        let sale = saved(receipt)?;

        metrics::counter!("sales_created_total").increment(1);
        tracing::info!(
            sale_id = %sale.id(),
            number = sale.number(),
            total = %sale.total(),
            "sale created"
        );
        Ok(CreatedSale {
            sale,
            cart_finalization,
        })
    }

    #[tracing::instrument(skip(self, cancel), fields(sale_id = %cmd.sale_id))]
    pub async fn update_sale(&self, cmd: UpdateSale, cancel: &CancellationToken) -> Result<Sale> {
        cmd.validate()?;
        let mut sale = self.load_active(cmd.sale_id, "update", cancel).await?;
        sale.update_branch_and_date(cmd.branch, cmd.date)?;
        self.save(sale, cancel).await
    }

    #[tracing::instrument(skip(self, cancel))]
    pub async fn cancel_sale(&self, cmd: CancelSale, cancel: &CancellationToken) -> Result<Sale> {
        let mut sale = self.load_active(cmd.sale_id, "cancel", cancel).await?;
        sale.cancel()?;
        self.save(sale, cancel).await
    }

    #[tracing::instrument(skip(self, cancel))]
    pub async fn finish_sale(&self, cmd: FinishSale, cancel: &CancellationToken) -> Result<Sale> {
        let mut sale = self.load_active(cmd.sale_id, "finish", cancel).await?;
        sale.finish()?;
        self.save(sale, cancel).await
    }

    /// Cancels one item. Removing the last item cancels the sale.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn remove_sale_item(
        &self,
        cmd: RemoveSaleItem,
        cancel: &CancellationToken,
    ) -> Result<Sale> {
        let mut sale = self
            .load_active(cmd.sale_id, "remove an item from", cancel)
            .await?;
        sale.cancel_item(cmd.product_id)?;
        self.save(sale, cancel).await
    }

    pub async fn get_sale(&self, sale_id: SaleId, cancel: &CancellationToken) -> Result<Sale> {
        self.load(sale_id, cancel).await
    }

    pub async fn get_sale_by_number(
        &self,
        number: i64,
        cancel: &CancellationToken,
    ) -> Result<Sale> {
        self.sales
            .find_one(ListQuery::new().filter(Filter::eq("number", number)), cancel)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Sale number", number))
    }

    pub async fn list_sales(
        &self,
        query: &ListQuery,
        cancel: &CancellationToken,
    ) -> Result<Page<Sale>> {
        Ok(self.sales.list(query, cancel).await?)
    }

    async fn load(&self, sale_id: SaleId, cancel: &CancellationToken) -> Result<Sale> {
        self.sales
            .get(sale_id, cancel)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Sale", sale_id))
    }

    /// Loads a sale that still accepts changes.
    async fn load_active(
        &self,
        sale_id: SaleId,
        action: &str,
        cancel: &CancellationToken,
    ) -> Result<Sale> {
        let sale = self.load(sale_id, cancel).await?;
        if sale.status() != SaleStatus::Active {
            return Err(ApplicationError::InvalidOperation(format!(
                "Cannot {action} sale {sale_id}: it is {}",
                sale.status()
            )));
        }
        Ok(sale)
    }

    async fn save(&self, sale: Sale, cancel: &CancellationToken) -> Result<Sale> {
        let mut uow = self.sales.begin();
        uow.update(sale);
        saved(uow.commit(cancel).await?)
    }
}
