//! Sales created from carts, across the Carts and Sales modules.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use application::{
    ApplicationError, BcryptHasher, CancelSale, CartFinalization, CartFinalizationStatus,
    CartSnapshot, CartsFacade, CreateCart, CreateDiscountRule, CreateProduct, CreateSaleFromCart,
    CreateUser, ErrorCode, FinalizeSourceCart, FinishSale, Modules, RemoveSaleItem, SaleService,
    UpdateProduct, UpdateSale,
};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use common::{CartId, ListQuery, Money, ProductId, UserId};
use domain::{Sale, SaleEvent, SaleStatus};
use messaging::InMemoryMessageBus;
use persistence::{Document, EventDispatcher, EventHandler, InMemoryStore, Repository};
use rust_decimal::Decimal;
use tokio_util::sync::CancellationToken;

struct Shop {
    modules: Modules,
    user: UserId,
    p1: ProductId,
    p2: ProductId,
    cancel: CancellationToken,
}

/// A shop with one user, a 100.00 and a 50.00 product, and a single
/// discount tier of 10 % for 2-3 units.
async fn shop() -> Shop {
    let modules = Modules::in_memory(
        Arc::new(InMemoryMessageBus::default()),
        Arc::new(BcryptHasher::new(4)),
    );
    let cancel = CancellationToken::new();

    let user = modules
        .users
        .create_user(CreateUser::new("johnd", "john@example.com", "m38rmF$x"), &cancel)
        .await
        .unwrap();
    let p1 = modules
        .products
        .create_product(CreateProduct::new("Backpack", Money::from_dollars(100)), &cancel)
        .await
        .unwrap();
    let p2 = modules
        .products
        .create_product(CreateProduct::new("T-shirt", Money::from_dollars(50)), &cancel)
        .await
        .unwrap();
    modules
        .discount_rules
        .create_rule(
            CreateDiscountRule {
                min_quantity: 2,
                max_quantity: 3,
                discount: Decimal::from(10),
            },
            &cancel,
        )
        .await
        .unwrap();

    Shop {
        user: user.id(),
        p1: p1.id(),
        p2: p2.id(),
        modules,
        cancel,
    }
}

impl Shop {
    async fn cart(&self) -> CartId {
        self.modules
            .carts
            .create_cart(
                CreateCart::new(self.user, Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap())
                    .with_product(self.p1, 2)
                    .with_product(self.p2, 1),
                &self.cancel,
            )
            .await
            .unwrap()
            .id()
    }

    async fn sale(&self) -> Sale {
        let cart = self.cart().await;
        self.modules
            .sales
            .create_sale_from_cart(CreateSaleFromCart::new(cart, "Downtown"), &self.cancel)
            .await
            .unwrap()
            .sale
    }
}

#[tokio::test]
async fn sale_snapshots_cart_and_finalizes_it() {
    let shop = shop().await;
    let cart_id = shop.cart().await;

    let created = shop
        .modules
        .sales
        .create_sale_from_cart(CreateSaleFromCart::new(cart_id, "Downtown"), &shop.cancel)
        .await
        .unwrap();

    assert_eq!(created.cart_finalization, CartFinalizationStatus::Finalized);
    assert_eq!(created.sale.total(), Money::from_dollars(230));
    assert_eq!(created.sale.number(), Some(1));
    assert_eq!(created.sale.status(), SaleStatus::Active);

    let cart = shop.modules.carts.get_cart(cart_id, &shop.cancel).await.unwrap();
    assert!(cart.is_finalized());

    let again = shop
        .modules
        .sales
        .create_sale_from_cart(CreateSaleFromCart::new(cart_id, "Downtown"), &shop.cancel)
        .await
        .unwrap_err();
    assert_eq!(again.code(), ErrorCode::InvalidOperation);
}

#[tokio::test]
async fn finalized_cart_frees_the_user_for_a_new_cart() {
    let shop = shop().await;
    shop.sale().await;

    let next = shop.cart().await;
    let active = shop
        .modules
        .carts
        .get_cart_by_user(shop.user, &shop.cancel)
        .await
        .unwrap();
    assert_eq!(active.id(), next);
}

#[tokio::test]
async fn sales_are_numbered_and_found_by_number() {
    let shop = shop().await;
    let first = shop.sale().await;
    let second = shop.sale().await;

    assert_eq!(second.number(), Some(2));
    let found = shop
        .modules
        .sales
        .get_sale_by_number(1, &shop.cancel)
        .await
        .unwrap();
    assert_eq!(found.id(), first.id());

    let missing = shop
        .modules
        .sales
        .get_sale_by_number(99, &shop.cancel)
        .await
        .unwrap_err();
    assert_eq!(missing.code(), ErrorCode::ResourceNotFound);
}

#[tokio::test]
async fn sale_keeps_prices_captured_by_the_cart() {
    let shop = shop().await;
    let cart_id = shop.cart().await;

    shop.modules
        .products
        .update_product(
            UpdateProduct {
                product_id: shop.p1,
                details: CreateProduct::new("Backpack", Money::from_dollars(999)),
            },
            &shop.cancel,
        )
        .await
        .unwrap();

    let cart = shop.modules.carts.get_cart(cart_id, &shop.cancel).await.unwrap();
    assert_eq!(
        cart.item(shop.p1).map(|i| i.unit_price),
        Some(Money::from_dollars(100))
    );

    let sale = shop
        .modules
        .sales
        .create_sale_from_cart(CreateSaleFromCart::new(cart_id, "Downtown"), &shop.cancel)
        .await
        .unwrap()
        .sale;
    assert_eq!(sale.total(), Money::from_dollars(230));
    assert_eq!(
        sale.item(shop.p1).map(|i| i.unit_price),
        Some(Money::from_dollars(100))
    );
}

#[tokio::test]
async fn carts_and_sales_are_listed_page_by_page() {
    let shop = shop().await;
    for _ in 0..12 {
        shop.sale().await;
    }
    let page = |n| ListQuery::new().size(5).page(n);

    let carts = &shop.modules.carts;
    let second = carts.list_carts(&page(2), &shop.cancel).await.unwrap();
    let third = carts.list_carts(&page(3), &shop.cancel).await.unwrap();
    assert_eq!(second.items.len(), 5);
    assert_eq!(third.items.len(), 2);
    assert_eq!(third.total_count, 12);

    let sales = &shop.modules.sales;
    let second = sales.list_sales(&page(2), &shop.cancel).await.unwrap();
    let third = sales.list_sales(&page(3), &shop.cancel).await.unwrap();
    assert_eq!(second.items.len(), 5);
    assert_eq!(third.items.len(), 2);
    assert_eq!(third.total_pages, 3);
}

#[tokio::test]
async fn removing_items_cancels_the_emptied_sale() {
    let shop = shop().await;
    let sale = shop.sale().await;
    let sales = &shop.modules.sales;

    let sale_after_first = sales
        .remove_sale_item(
            RemoveSaleItem {
                sale_id: sale.id(),
                product_id: shop.p1,
            },
            &shop.cancel,
        )
        .await
        .unwrap();
    assert_eq!(sale_after_first.status(), SaleStatus::Active);
    assert_eq!(sale_after_first.total(), Money::from_dollars(50));

    let missing = sales
        .remove_sale_item(
            RemoveSaleItem {
                sale_id: sale.id(),
                product_id: shop.p1,
            },
            &shop.cancel,
        )
        .await
        .unwrap_err();
    assert_eq!(missing.code(), ErrorCode::ResourceNotFound);

    let emptied = sales
        .remove_sale_item(
            RemoveSaleItem {
                sale_id: sale.id(),
                product_id: shop.p2,
            },
            &shop.cancel,
        )
        .await
        .unwrap();
    assert_eq!(emptied.status(), SaleStatus::Canceled);
}

#[tokio::test]
async fn terminal_sales_reject_every_change() {
    let shop = shop().await;
    let sales = &shop.modules.sales;

    let canceled = shop.sale().await;
    sales
        .cancel_sale(CancelSale { sale_id: canceled.id() }, &shop.cancel)
        .await
        .unwrap();
    let finished = shop.sale().await;
    sales
        .finish_sale(FinishSale { sale_id: finished.id() }, &shop.cancel)
        .await
        .unwrap();

    for sale_id in [canceled.id(), finished.id()] {
        let before = sales.get_sale(sale_id, &shop.cancel).await.unwrap();
        let results = [
            sales
                .update_sale(
                    UpdateSale {
                        sale_id,
                        branch: "Uptown".into(),
                        date: Utc::now(),
                    },
                    &shop.cancel,
                )
                .await
                .err(),
            sales
                .finish_sale(FinishSale { sale_id }, &shop.cancel)
                .await
                .err(),
            sales
                .cancel_sale(CancelSale { sale_id }, &shop.cancel)
                .await
                .err(),
            sales
                .remove_sale_item(
                    RemoveSaleItem {
                        sale_id,
                        product_id: shop.p1,
                    },
                    &shop.cancel,
                )
                .await
                .err(),
        ];
        for result in results {
            assert_eq!(
                result.map(|e| e.code()),
                Some(ErrorCode::InvalidOperation)
            );
        }

        let after = sales.get_sale(sale_id, &shop.cancel).await.unwrap();
        assert_eq!(after.version(), before.version());
        assert_eq!(after.branch(), "Downtown");
        assert_eq!(after.items().len(), 2);
    }
}

#[tokio::test]
async fn active_sale_accepts_branch_and_date_changes() {
    let shop = shop().await;
    let sale = shop.sale().await;
    let date = Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap();

    let updated = shop
        .modules
        .sales
        .update_sale(
            UpdateSale {
                sale_id: sale.id(),
                branch: "Uptown".into(),
                date,
            },
            &shop.cancel,
        )
        .await
        .unwrap();
    assert_eq!(updated.branch(), "Uptown");
    assert_eq!(updated.date(), date);
}

#[tokio::test]
async fn empty_branch_is_a_validation_error() {
    let shop = shop().await;
    let cart = shop.cart().await;
    let err = shop
        .modules
        .sales
        .create_sale_from_cart(CreateSaleFromCart::new(cart, ""), &shop.cancel)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::ValidationError);
}

/// Carts façade whose finalize can be switched off.
struct FlakyCarts {
    inner: Arc<dyn CartsFacade>,
    fail_on_finalize: AtomicBool,
}

#[async_trait]
impl CartsFacade for FlakyCarts {
    async fn cart_snapshot(
        &self,
        cart_id: CartId,
        cancel: &CancellationToken,
    ) -> application::Result<CartSnapshot> {
        self.inner.cart_snapshot(cart_id, cancel).await
    }

    async fn finalize_cart(
        &self,
        cart_id: CartId,
        cancel: &CancellationToken,
    ) -> application::Result<CartFinalization> {
        if self.fail_on_finalize.load(Ordering::SeqCst) {
            return Err(ApplicationError::Unexpected("carts database unavailable".into()));
        }
        self.inner.finalize_cart(cart_id, cancel).await
    }

    async fn remove_product_from_active_carts(
        &self,
        product_id: ProductId,
        cancel: &CancellationToken,
    ) -> application::Result<usize> {
        self.inner
            .remove_product_from_active_carts(product_id, cancel)
            .await
    }
}

#[tokio::test]
async fn failed_cart_finalization_is_deferred_not_fatal() {
    let shop = shop().await;
    let cart_id = shop.cart().await;

    let flaky = Arc::new(FlakyCarts {
        inner: Arc::new(shop.modules.carts.clone()),
        fail_on_finalize: AtomicBool::new(true),
    });
    let handler: Arc<dyn EventHandler<SaleEvent>> =
        Arc::new(FinalizeSourceCart::new(flaky.clone()));
    let sales = SaleService::new(
        Repository::new(
            Arc::new(InMemoryStore::<Sale>::new()),
            EventDispatcher::builder()
                .on("SaleCreated", handler)
                .build(),
        ),
        flaky,
    );

    let created = sales
        .create_sale_from_cart(CreateSaleFromCart::new(cart_id, "Downtown"), &shop.cancel)
        .await
        .unwrap();

    match &created.cart_finalization {
        CartFinalizationStatus::Deferred { reason } => {
            assert!(reason.contains("carts database unavailable"));
        }
        other => panic!("expected deferred finalization, got {other:?}"),
    }
    let stored = sales.get_sale(created.sale.id(), &shop.cancel).await.unwrap();
    assert_eq!(stored.total(), Money::from_dollars(230));

    let cart = shop.modules.carts.get_cart(cart_id, &shop.cancel).await.unwrap();
    assert!(!cart.is_finalized());
}

/// Carts façade serving snapshots taken before another sale finalized the
/// cart.
struct StaleSnapshots {
    inner: Arc<dyn CartsFacade>,
}

#[async_trait]
impl CartsFacade for StaleSnapshots {
    async fn cart_snapshot(
        &self,
        cart_id: CartId,
        cancel: &CancellationToken,
    ) -> application::Result<CartSnapshot> {
        let mut snapshot = self.inner.cart_snapshot(cart_id, cancel).await?;
        snapshot.finalized = false;
        Ok(snapshot)
    }

    async fn finalize_cart(
        &self,
        cart_id: CartId,
        cancel: &CancellationToken,
    ) -> application::Result<CartFinalization> {
        self.inner.finalize_cart(cart_id, cancel).await
    }

    async fn remove_product_from_active_carts(
        &self,
        product_id: ProductId,
        cancel: &CancellationToken,
    ) -> application::Result<usize> {
        self.inner
            .remove_product_from_active_carts(product_id, cancel)
            .await
    }
}

#[tokio::test]
async fn concurrent_second_sale_for_a_cart_is_rejected() {
    let shop = shop().await;
    let cart_id = shop.cart().await;
    shop.modules
        .sales
        .create_sale_from_cart(CreateSaleFromCart::new(cart_id, "Downtown"), &shop.cancel)
        .await
        .unwrap();

    let stale = Arc::new(StaleSnapshots {
        inner: Arc::new(shop.modules.carts.clone()),
    });
    let handler: Arc<dyn EventHandler<SaleEvent>> =
        Arc::new(FinalizeSourceCart::new(stale.clone()));
    let sales = SaleService::new(
        Repository::new(
            Arc::new(InMemoryStore::<Sale>::new()),
            EventDispatcher::builder()
                .on("SaleCreated", handler)
                .build(),
        ),
        stale,
    );

    let err = sales
        .create_sale_from_cart(CreateSaleFromCart::new(cart_id, "Uptown"), &shop.cancel)
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidOperation);
    assert!(err.detail().contains("already has a sale"));

    let stored = sales.list_sales(&ListQuery::new(), &shop.cancel).await.unwrap();
    assert_eq!(stored.total_count, 0);
}
