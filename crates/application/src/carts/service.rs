use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{CartId, Filter, ListQuery, Page, ProductId, UserId};
use domain::{Cart, CartLine, CartStatus, Withdrawal, product_term};
use persistence::{Document, Repository};
use tokio_util::sync::CancellationToken;
use validator::Validate;

use super::{CartProduct, CreateCart, DeleteCart, DiscountRuleService, UpdateCart};
use crate::facade::{
    CartFinalization, CartSnapshot, CartSnapshotItem, CartsFacade, ProductsFacade, UsersFacade,
};
use crate::{ApplicationError, Result, saved};

/// Service for managing carts.
///
/// Prices are captured from the Products module when a product first enters
/// a cart; discounts are recomputed from the active rules on every create and
/// update.
#[derive(Clone)]
pub struct CartService {
    carts: Repository<Cart>,
    rules: DiscountRuleService,
    products: Arc<dyn ProductsFacade>,
    users: Arc<dyn UsersFacade>,
}

impl CartService {
    pub fn new(
        carts: Repository<Cart>,
        rules: DiscountRuleService,
        products: Arc<dyn ProductsFacade>,
        users: Arc<dyn UsersFacade>,
    ) -> Self {
        Self {
            carts,
            rules,
            products,
            users,
        }
    }

    /// Opens a cart. A user holds at most one active cart.
    #[tracing::instrument(skip(self, cancel), fields(user_id = %cmd.user_id))]
    pub async fn create_cart(&self, cmd: CreateCart, cancel: &CancellationToken) -> Result<Cart> {
        cmd.validate()?;
        if !self.users.user_exists(cmd.user_id, cancel).await? {
            return Err(ApplicationError::not_found("User", cmd.user_id));
        }
        if self.active_cart(cmd.user_id, cancel).await?.is_some() {
            return Err(ApplicationError::Conflict(
                "An active cart already exists for this user".into(),
            ));
        }

        let mut cart = Cart::create(cmd.user_id, cmd.date);
        let lines = self.price_lines(&cart, &cmd.products, cancel).await?;
        cart.update_items(&lines)?;
        cart.apply_rule_discount(&self.rules.active_rules(cancel).await?)?;

        let mut uow = self.carts.begin();
        uow.add(cart);
        let cart = saved(uow.commit(cancel).await?)?;
        tracing::info!(cart_id = %cart.id(), items = cart.items().len(), "cart created");
        Ok(cart)
    }

    /// Replaces the cart's lines. Prices of lines already in the cart are
    /// kept; new lines take the current product price.
    #[tracing::instrument(skip(self, cancel), fields(cart_id = %cmd.cart_id))]
    pub async fn update_cart(&self, cmd: UpdateCart, cancel: &CancellationToken) -> Result<Cart> {
        cmd.validate()?;
        let mut cart = self.load(cmd.cart_id, cancel).await?;
        if cart.is_finalized() {
            return Err(ApplicationError::InvalidOperation(format!(
                "Cart {} is finalized",
                cmd.cart_id
            )));
        }

        let lines = self.price_lines(&cart, &cmd.products, cancel).await?;
        if let Some(date) = cmd.date {
            cart.reschedule(date)?;
        }
        cart.update_items(&lines)?;
        cart.apply_rule_discount(&self.rules.active_rules(cancel).await?)?;

        let mut uow = self.carts.begin();
        uow.update(cart);
        saved(uow.commit(cancel).await?)
    }

    #[tracing::instrument(skip(self, cancel))]
    pub async fn delete_cart(&self, cmd: DeleteCart, cancel: &CancellationToken) -> Result<()> {
        let cart = self.load(cmd.cart_id, cancel).await?;
        let mut uow = self.carts.begin();
        uow.remove(cart);
        uow.commit(cancel).await?;
        Ok(())
    }

    pub async fn get_cart(&self, cart_id: CartId, cancel: &CancellationToken) -> Result<Cart> {
        self.load(cart_id, cancel).await
    }

    /// The user's active cart.
    pub async fn get_cart_by_user(
        &self,
        user_id: UserId,
        cancel: &CancellationToken,
    ) -> Result<Cart> {
        self.active_cart(user_id, cancel)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Active cart for user", user_id))
    }

    pub async fn list_carts(
        &self,
        query: &ListQuery,
        cancel: &CancellationToken,
    ) -> Result<Page<Cart>> {
        Ok(self.carts.list(query, cancel).await?)
    }

    async fn load(&self, cart_id: CartId, cancel: &CancellationToken) -> Result<Cart> {
        self.carts
            .get(cart_id, cancel)
            .await?
            .ok_or_else(|| ApplicationError::not_found("Cart", cart_id))
    }

    async fn active_cart(&self, user_id: UserId, cancel: &CancellationToken) -> Result<Option<Cart>> {
        let query = ListQuery::new()
            .filter(Filter::eq("user_id", user_id.as_uuid()))
            .filter(Filter::eq("status", CartStatus::Active.as_str()));
        Ok(self.carts.find_one(query, cancel).await?)
    }

    /// Builds cart lines, looking up the price of each product not yet in
    /// the cart.
    async fn price_lines(
        &self,
        cart: &Cart,
        products: &[CartProduct],
        cancel: &CancellationToken,
    ) -> Result<Vec<CartLine>> {
        let mut prices = HashMap::new();
        let mut lines = Vec::with_capacity(products.len());
        for requested in products {
            let unit_price = match cart.item(requested.product_id) {
                Some(item) => item.unit_price,
                None => match prices.get(&requested.product_id) {
                    Some(price) => *price,
                    None => {
                        let snapshot = self
                            .products
                            .product_snapshot(requested.product_id, cancel)
                            .await?;
                        prices.insert(requested.product_id, snapshot.price);
                        snapshot.price
                    }
                },
            };
            lines.push(CartLine::new(
                requested.product_id,
                requested.quantity,
                unit_price,
            ));
        }
        Ok(lines)
    }
}

#[async_trait]
impl CartsFacade for CartService {
    #[tracing::instrument(skip(self, cancel))]
    async fn cart_snapshot(
        &self,
        cart_id: CartId,
        cancel: &CancellationToken,
    ) -> Result<CartSnapshot> {
        let cart = self.load(cart_id, cancel).await?;
        Ok(CartSnapshot {
            cart_id: cart.id(),
            user_id: cart.user_id(),
            date: cart.date(),
            finalized: cart.is_finalized(),
            items: cart
                .items()
                .iter()
                .map(|item| CartSnapshotItem {
                    product_id: item.product_id,
                    quantity: item.quantity,
                    unit_price: item.unit_price,
                    discount: item.discount,
                })
                .collect(),
        })
    }

    #[tracing::instrument(skip(self, cancel))]
    async fn finalize_cart(
        &self,
        cart_id: CartId,
        cancel: &CancellationToken,
    ) -> Result<CartFinalization> {
        let mut cart = self.load(cart_id, cancel).await?;
        if cart.is_finalized() {
            return Ok(CartFinalization::AlreadyFinalized);
        }
        cart.finalize()?;

        let mut uow = self.carts.begin();
        uow.update(cart);
        uow.commit(cancel).await?;
        metrics::counter!("carts_finalized_total", "reason" => "sale").increment(1);
        tracing::info!(%cart_id, "cart finalized");
        Ok(CartFinalization::Finalized)
    }

    #[tracing::instrument(skip(self, cancel))]
    async fn remove_product_from_active_carts(
        &self,
        product_id: ProductId,
        cancel: &CancellationToken,
    ) -> Result<usize> {
        let query = ListQuery::new()
            .filter(Filter::term(product_term(product_id)))
            .filter(Filter::eq("status", CartStatus::Active.as_str()));
        let carts = self.carts.find_all(query, cancel).await?;

        let mut uow = self.carts.begin();
        let mut emptied = 0u64;
        for mut cart in carts {
            match cart.withdraw_product(product_id) {
                Withdrawal::NotPresent => continue,
                Withdrawal::Removed => {}
                Withdrawal::RemovedAndFinalized => emptied += 1,
            }
            uow.update(cart);
        }
        let touched = uow.len();
        if touched > 0 {
            uow.commit(cancel).await?;
        }
        if emptied > 0 {
            metrics::counter!("carts_finalized_total", "reason" => "emptied").increment(emptied);
        }
        tracing::info!(%product_id, touched, emptied, "product withdrawn from active carts");
        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use common::{Money, Percentage};
    use domain::DiscountRule;
    use persistence::InMemoryStore;

    use super::*;
    use crate::ErrorCode;
    use crate::facade::ProductSnapshot;

    struct Catalogue(HashMap<ProductId, Money>);

    #[async_trait]
    impl ProductsFacade for Catalogue {
        async fn product_snapshot(
            &self,
            product_id: ProductId,
            _cancel: &CancellationToken,
        ) -> Result<ProductSnapshot> {
            self.0
                .get(&product_id)
                .map(|price| ProductSnapshot {
                    product_id,
                    title: "item".into(),
                    price: *price,
                })
                .ok_or_else(|| ApplicationError::not_found("Product", product_id))
        }
    }

    struct Everyone;

    #[async_trait]
    impl UsersFacade for Everyone {
        async fn user_exists(&self, _user_id: UserId, _cancel: &CancellationToken) -> Result<bool> {
            Ok(true)
        }
    }

    struct Fixture {
        service: CartService,
        p1: ProductId,
        p2: ProductId,
    }

    async fn fixture() -> Fixture {
        let (p1, p2) = (ProductId::new(), ProductId::new());
        let catalogue = Catalogue(HashMap::from([
            (p1, Money::from_dollars(100)),
            (p2, Money::from_dollars(50)),
        ]));
        let rules = DiscountRuleService::new(Repository::without_handlers(Arc::new(
            InMemoryStore::<DiscountRule>::new(),
        )));
        rules.seed_defaults(&CancellationToken::new()).await.unwrap();
        let service = CartService::new(
            Repository::without_handlers(Arc::new(InMemoryStore::<Cart>::new())),
            rules,
            Arc::new(catalogue),
            Arc::new(Everyone),
        );
        Fixture { service, p1, p2 }
    }

    fn date() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn create_captures_prices_and_discounts() {
        let f = fixture().await;
        let cancel = CancellationToken::new();
        let cart = f
            .service
            .create_cart(
                CreateCart::new(UserId::new(), date())
                    .with_product(f.p1, 5)
                    .with_product(f.p2, 1),
                &cancel,
            )
            .await
            .unwrap();

        let first = cart.item(f.p1).unwrap();
        assert_eq!(first.unit_price, Money::from_dollars(100));
        assert_eq!(first.discount, Percentage::whole(10));
        assert_eq!(cart.item(f.p2).unwrap().discount, Percentage::zero());
    }

    #[tokio::test]
    async fn second_active_cart_conflicts() {
        let f = fixture().await;
        let cancel = CancellationToken::new();
        let user = UserId::new();
        f.service
            .create_cart(CreateCart::new(user, date()).with_product(f.p1, 1), &cancel)
            .await
            .unwrap();

        let err = f
            .service
            .create_cart(CreateCart::new(user, date()).with_product(f.p2, 1), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::Conflict);
        assert!(err.detail().contains("active cart"));
    }

    #[tokio::test]
    async fn unknown_product_is_not_found() {
        let f = fixture().await;
        let err = f
            .service
            .create_cart(
                CreateCart::new(UserId::new(), date()).with_product(ProductId::new(), 1),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::ResourceNotFound);
    }

    #[tokio::test]
    async fn update_reprices_discounts_and_keeps_captured_prices() {
        let f = fixture().await;
        let cancel = CancellationToken::new();
        let cart = f
            .service
            .create_cart(
                CreateCart::new(UserId::new(), date()).with_product(f.p1, 2),
                &cancel,
            )
            .await
            .unwrap();

        let mut update = UpdateCart::new(cart.id())
            .with_product(f.p1, 12)
            .with_product(f.p2, 4);
        update.date = Some(date() + chrono::Duration::days(1));
        let cart = f.service.update_cart(update, &cancel).await.unwrap();

        assert_eq!(cart.date(), date() + chrono::Duration::days(1));
        assert_eq!(cart.item(f.p1).unwrap().discount, Percentage::whole(20));
        assert_eq!(cart.item(f.p2).unwrap().discount, Percentage::whole(10));
        assert_eq!(cart.item(f.p1).unwrap().unit_price, Money::from_dollars(100));
    }

    #[tokio::test]
    async fn finalize_is_idempotent_and_blocks_updates() {
        let f = fixture().await;
        let cancel = CancellationToken::new();
        let cart = f
            .service
            .create_cart(
                CreateCart::new(UserId::new(), date()).with_product(f.p1, 1),
                &cancel,
            )
            .await
            .unwrap();

        assert_eq!(
            f.service.finalize_cart(cart.id(), &cancel).await.unwrap(),
            CartFinalization::Finalized
        );
        assert_eq!(
            f.service.finalize_cart(cart.id(), &cancel).await.unwrap(),
            CartFinalization::AlreadyFinalized
        );

        let err = f
            .service
            .update_cart(UpdateCart::new(cart.id()).with_product(f.p1, 3), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidOperation);
    }

    #[tokio::test]
    async fn withdrawing_products_finalizes_emptied_carts() {
        let f = fixture().await;
        let cancel = CancellationToken::new();
        let only_p1 = f
            .service
            .create_cart(
                CreateCart::new(UserId::new(), date()).with_product(f.p1, 1),
                &cancel,
            )
            .await
            .unwrap();
        let both = f
            .service
            .create_cart(
                CreateCart::new(UserId::new(), date())
                    .with_product(f.p1, 1)
                    .with_product(f.p2, 1),
                &cancel,
            )
            .await
            .unwrap();

        let touched = f
            .service
            .remove_product_from_active_carts(f.p1, &cancel)
            .await
            .unwrap();
        assert_eq!(touched, 2);

        let only_p1 = f.service.get_cart(only_p1.id(), &cancel).await.unwrap();
        assert!(only_p1.is_finalized());
        let both = f.service.get_cart(both.id(), &cancel).await.unwrap();
        assert!(!both.is_finalized());
        assert!(both.item(f.p1).is_none());

        let again = f
            .service
            .remove_product_from_active_carts(f.p1, &cancel)
            .await
            .unwrap();
        assert_eq!(again, 0);
    }

    #[tokio::test]
    async fn active_cart_lookup_by_user() {
        let f = fixture().await;
        let cancel = CancellationToken::new();
        let user = UserId::new();
        let err = f.service.get_cart_by_user(user, &cancel).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::ResourceNotFound);

        let cart = f
            .service
            .create_cart(CreateCart::new(user, date()).with_product(f.p2, 1), &cancel)
            .await
            .unwrap();
        assert_eq!(
            f.service.get_cart_by_user(user, &cancel).await.unwrap().id(),
            cart.id()
        );
    }
}
