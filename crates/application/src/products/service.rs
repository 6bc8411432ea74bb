use async_trait::async_trait;
use common::{ListQuery, Page, ProductId};
use domain::Product;
use persistence::{Document, Repository};
use tokio_util::sync::CancellationToken;
use validator::Validate;

use super::{CreateProduct, DeleteProduct, UpdateProduct};
use crate::facade::{ProductSnapshot, ProductsFacade};
use crate::{ApplicationError, Result, saved};

/// Service for the product catalogue.
#[derive(Clone)]
pub struct ProductService {
    products: Repository<Product>,
}

impl ProductService {
    pub fn new(products: Repository<Product>) -> Self {
        Self { products }
    }

    #[tracing::instrument(skip(self, cancel))]
    pub async fn create_product(
        &self,
        cmd: CreateProduct,
        cancel: &CancellationToken,
    ) -> Result<Product> {
        cmd.validate()?;
        let product = Product::create(cmd.into_details())?;

        let mut uow = self.products.begin();
        uow.add(product);
        saved(uow.commit(cancel).await?)
    }

    #[tracing::instrument(skip(self, cancel), fields(product_id = %cmd.product_id))]
    pub async fn update_product(
        &self,
        cmd: UpdateProduct,
        cancel: &CancellationToken,
    ) -> Result<Product> {
        cmd.validate()?;
        let mut product = self.load(cmd.product_id, cancel).await?;
        product.update(cmd.details.into_details())?;

        let mut uow = self.products.begin();
        uow.update(product);
        saved(uow.commit(cancel).await?)
    }

    /// Removes the product. `ProductDeleted` is published before the removal
    /// is flushed.
    #[tracing::instrument(skip(self, cancel))]
    pub async fn delete_product(
        &self,
        cmd: DeleteProduct,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let mut product = self.load(cmd.product_id, cancel).await?;
        product.delete();

        let mut uow = self.products.begin();
        uow.remove(product);
        uow.commit(cancel).await?;
        tracing::info!(product_id = %cmd.product_id, "product deleted");
        Ok(())
    }

    pub async fn get_product(
        &self,
        product_id: ProductId,
        cancel: &CancellationToken,
    ) -> Result<Product> {
        self.load(product_id, cancel).await
    }

    pub async fn list_products(
        &self,
        query: &ListQuery,
        cancel: &CancellationToken,
    ) -> Result<Page<Product>> {
        Ok(self.products.list(query, cancel).await?)
    }

    async fn load(&self, product_id: ProductId, cancel: &CancellationToken) -> Result<Product> {
        self.products
            .get(product_id, cancel)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Product", product_id))
    }
}

#[async_trait]
impl ProductsFacade for ProductService {
    async fn product_snapshot(
        &self,
        product_id: ProductId,
        cancel: &CancellationToken,
    ) -> Result<ProductSnapshot> {
        let product = self.load(product_id, cancel).await?;
        Ok(ProductSnapshot {
            product_id: product.id(),
            title: product.title().to_string(),
            price: product.price(),
        })
    }
}
