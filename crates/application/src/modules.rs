//! Composition of the four modules over one set of stores and one bus.

use std::sync::Arc;
use std::time::Duration;

use domain::{Cart, CartEvent, DiscountRule, Product, ProductEvent, Sale, SaleEvent, User};
use messaging::{ConsumerWorker, MessageBus};
use persistence::{EventDispatcher, EventHandler, InMemoryStore, PostgresStore, Repository, Store};
use sqlx::PgPool;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::carts::{
    CartService, DiscountRuleService, PublishFinalizedCart, RemoveDeletedProductFromCarts,
};
use crate::facade::CartsFacade;
use crate::products::{ProductService, PublishProductDeleted};
use crate::sales::{CancelDeletedProductInSales, FinalizeSourceCart, SaleService};
use crate::users::{PasswordHasher, UserService};
use crate::Result;

/// One store per aggregate type.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn Store<User>>,
    pub products: Arc<dyn Store<Product>>,
    pub carts: Arc<dyn Store<Cart>>,
    pub discount_rules: Arc<dyn Store<DiscountRule>>,
    pub sales: Arc<dyn Store<Sale>>,
}

impl Stores {
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(InMemoryStore::new()),
            products: Arc::new(InMemoryStore::new()),
            carts: Arc::new(InMemoryStore::new()),
            discount_rules: Arc::new(InMemoryStore::new()),
            sales: Arc::new(InMemoryStore::new()),
        }
    }

    /// Stores backed by the migrated PostgreSQL schema.
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            users: Arc::new(PostgresStore::new(pool.clone())),
            products: Arc::new(PostgresStore::new(pool.clone())),
            carts: Arc::new(PostgresStore::new(pool.clone())),
            discount_rules: Arc::new(PostgresStore::new(pool.clone())),
            sales: Arc::new(PostgresStore::new(pool)),
        }
    }
}

/// The wired modules.
///
/// Domain-event handlers are registered here, once: deleted products and
/// finalized carts are published on the bus, and new sales finalize their
/// source cart through the Carts façade.
#[derive(Clone)]
pub struct Modules {
    pub users: UserService,
    pub products: ProductService,
    pub carts: CartService,
    pub discount_rules: DiscountRuleService,
    pub sales: SaleService,
    pub bus: Arc<dyn MessageBus>,
    cart_consumer: Arc<RemoveDeletedProductFromCarts>,
    sale_consumer: Arc<CancelDeletedProductInSales>,
}

impl Modules {
    pub fn new(stores: Stores, bus: Arc<dyn MessageBus>, hasher: Arc<dyn PasswordHasher>) -> Self {
        let users = UserService::new(Repository::without_handlers(stores.users), hasher);

        let product_handler: Arc<dyn EventHandler<ProductEvent>> =
            Arc::new(PublishProductDeleted::new(Arc::clone(&bus)));
        let products = ProductService::new(Repository::new(
            stores.products,
            EventDispatcher::builder()
                .on("ProductDeleted", product_handler)
                .build(),
        ));

        let discount_rules =
            DiscountRuleService::new(Repository::without_handlers(stores.discount_rules));
        let cart_handler: Arc<dyn EventHandler<CartEvent>> =
            Arc::new(PublishFinalizedCart::new(Arc::clone(&bus)));
        let carts = CartService::new(
            Repository::new(
                stores.carts,
                EventDispatcher::builder()
                    .on("CartFinalized", cart_handler)
                    .build(),
            ),
            discount_rules.clone(),
            Arc::new(products.clone()),
            Arc::new(users.clone()),
        );
        let carts_facade: Arc<dyn CartsFacade> = Arc::new(carts.clone());

        let sale_handler: Arc<dyn EventHandler<SaleEvent>> =
            Arc::new(FinalizeSourceCart::new(Arc::clone(&carts_facade)));
        let sale_repository = Repository::new(
            stores.sales,
            EventDispatcher::builder()
                .on("SaleCreated", sale_handler)
                .build(),
        );
        let sales = SaleService::new(sale_repository.clone(), Arc::clone(&carts_facade));

        Self {
            users,
            products,
            carts,
            discount_rules,
            sales,
            bus,
            cart_consumer: Arc::new(RemoveDeletedProductFromCarts::new(carts_facade)),
            sale_consumer: Arc::new(CancelDeletedProductInSales::new(sale_repository)),
        }
    }

    /// In-memory stores over the given bus.
    pub fn in_memory(bus: Arc<dyn MessageBus>, hasher: Arc<dyn PasswordHasher>) -> Self {
        Self::new(Stores::in_memory(), bus, hasher)
    }

    /// Subscribes the integration consumers and runs each on its own task
    /// until `cancel` fires.
    pub async fn spawn_consumers(
        &self,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) -> Result<Vec<JoinHandle<()>>> {
        let carts =
            ConsumerWorker::subscribe(self.bus.as_ref(), Arc::clone(&self.cart_consumer)).await?;
        let sales =
            ConsumerWorker::subscribe(self.bus.as_ref(), Arc::clone(&self.sale_consumer)).await?;

        Ok(vec![
            tokio::spawn(carts.with_poll_interval(poll_interval).run(cancel.clone())),
            tokio::spawn(sales.with_poll_interval(poll_interval).run(cancel)),
        ])
    }

    /// Workers for driving the consumers by hand.
    pub async fn consumer_workers(
        &self,
    ) -> Result<(
        ConsumerWorker<RemoveDeletedProductFromCarts>,
        ConsumerWorker<CancelDeletedProductInSales>,
    )> {
        Ok((
            ConsumerWorker::subscribe(self.bus.as_ref(), Arc::clone(&self.cart_consumer)).await?,
            ConsumerWorker::subscribe(self.bus.as_ref(), Arc::clone(&self.sale_consumer)).await?,
        ))
    }
}
