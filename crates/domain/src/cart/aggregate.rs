//! Cart aggregate implementation.

use chrono::{DateTime, Utc};
use common::{CartId, FieldKind, FieldSpec, FieldValue, Money, ProductId, UserId};
use persistence::{Document, Version};
use serde::{Deserialize, Serialize};

use super::item::quantity_in_range;
use super::{CartError, CartEvent, CartItem, CartStatus};
use crate::discount::{DiscountRule, select_discount};

/// A requested cart line: product, quantity and the price to capture if the
/// product is new to the cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CartLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl CartLine {
    pub fn new(product_id: ProductId, quantity: u32, unit_price: Money) -> Self {
        Self {
            product_id,
            quantity,
            unit_price,
        }
    }
}

/// Result of withdrawing a product from a cart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Withdrawal {
    /// The product was not in the (active) cart; nothing changed.
    NotPresent,
    Removed,
    /// The product was the last line, so the cart was finalized.
    RemovedAndFinalized,
}

/// Cart aggregate root.
///
/// A user holds at most one active cart. Items are unique by product and
/// carry the price captured when they were added plus the discount chosen
/// by the last rule application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cart {
    id: CartId,

    #[serde(default)]
    version: Version,

    user_id: UserId,

    /// Business date of the cart.
    date: DateTime<Utc>,

    status: CartStatus,

    items: Vec<CartItem>,

    #[serde(skip)]
    pending: Vec<CartEvent>,
}

// Query methods
impl Cart {
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub fn status(&self) -> CartStatus {
        self.status
    }

    pub fn is_finalized(&self) -> bool {
        self.status == CartStatus::Finalized
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn item(&self, product_id: ProductId) -> Option<&CartItem> {
        self.items.iter().find(|i| i.product_id == product_id)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of the discounted line totals.
    pub fn total(&self) -> Money {
        self.items.iter().map(CartItem::total).sum()
    }

    /// Events raised since the last drain, without draining them.
    pub fn pending_events(&self) -> &[CartEvent] {
        &self.pending
    }
}

// Command methods
impl Cart {
    /// Creates an empty active cart.
    pub fn create(user_id: UserId, date: DateTime<Utc>) -> Self {
        let id = CartId::new();
        Self {
            id,
            version: Version::initial(),
            user_id,
            date,
            status: CartStatus::Active,
            items: Vec::new(),
            pending: vec![CartEvent::CartCreated {
                cart_id: id,
                user_id,
            }],
        }
    }

    /// Adds a line, merging it into an existing line for the same product.
    ///
    /// The merged quantity must stay within range. A merge keeps the price
    /// captured by the first add.
    pub fn add_item(&mut self, line: CartLine) -> Result<(), CartError> {
        self.ensure_active()?;
        if !quantity_in_range(line.quantity) {
            return Err(CartError::InvalidQuantity {
                product_id: line.product_id,
                quantity: line.quantity,
            });
        }

        match self.items.iter().position(|i| i.product_id == line.product_id) {
            Some(index) => {
                let old_quantity = self.items[index].quantity;
                let new_quantity = old_quantity + line.quantity;
                if !quantity_in_range(new_quantity) {
                    return Err(CartError::InvalidQuantity {
                        product_id: line.product_id,
                        quantity: new_quantity,
                    });
                }
                self.set_quantity(index, new_quantity);
            }
            None => self.push_item(line),
        }
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: ProductId) -> Result<(), CartError> {
        self.ensure_active()?;
        let index = self
            .items
            .iter()
            .position(|i| i.product_id == product_id)
            .ok_or(CartError::ItemNotFound { product_id })?;
        self.remove_at(index);
        Ok(())
    }

    /// Replaces the cart's lines with `lines`.
    ///
    /// Duplicate products in `lines` are merged by summing quantities. Every
    /// quantity is validated before anything changes. Matching lines get
    /// the new quantity, absent ones are dropped and new ones are added.
    pub fn update_items(&mut self, lines: &[CartLine]) -> Result<(), CartError> {
        self.ensure_active()?;

        let mut merged: Vec<CartLine> = Vec::with_capacity(lines.len());
        for line in lines {
            match merged.iter_mut().find(|m| m.product_id == line.product_id) {
                Some(existing) => existing.quantity = existing.quantity.saturating_add(line.quantity),
                None => merged.push(*line),
            }
        }
        if let Some(bad) = merged.iter().find(|l| !quantity_in_range(l.quantity)) {
            return Err(CartError::InvalidQuantity {
                product_id: bad.product_id,
                quantity: bad.quantity,
            });
        }

        let dropped: Vec<ProductId> = self
            .items
            .iter()
            .map(|i| i.product_id)
            .filter(|id| !merged.iter().any(|l| l.product_id == *id))
            .collect();
        for product_id in dropped {
            if let Some(index) = self.items.iter().position(|i| i.product_id == product_id) {
                self.remove_at(index);
            }
        }

        for line in merged {
            match self.items.iter().position(|i| i.product_id == line.product_id) {
                Some(index) if self.items[index].quantity != line.quantity => {
                    self.set_quantity(index, line.quantity);
                }
                Some(_) => {}
                None => self.push_item(line),
            }
        }
        Ok(())
    }

    /// Re-selects every line's discount from `rules`.
    ///
    /// Lines with no matching active rule are reset to no discount.
    pub fn apply_rule_discount(&mut self, rules: &[DiscountRule]) -> Result<(), CartError> {
        self.ensure_active()?;
        for item in &mut self.items {
            let discount = select_discount(rules, item.quantity);
            if item.discount != discount {
                item.discount = discount;
                self.pending.push(CartEvent::CartDiscountApplied {
                    cart_id: self.id,
                    product_id: item.product_id,
                    discount,
                });
            }
        }
        Ok(())
    }

    /// Moves the cart to a new business date.
    pub fn reschedule(&mut self, date: DateTime<Utc>) -> Result<(), CartError> {
        self.ensure_active()?;
        if self.date != date {
            self.date = date;
            self.pending.push(CartEvent::CartRescheduled {
                cart_id: self.id,
                date,
            });
        }
        Ok(())
    }

    pub fn finalize(&mut self) -> Result<(), CartError> {
        self.ensure_active()?;
        self.status = CartStatus::Finalized;
        self.pending.push(CartEvent::CartFinalized {
            cart_id: self.id,
            user_id: self.user_id,
        });
        Ok(())
    }

    /// Removes a product that is no longer sold.
    ///
    /// Finalizes the cart when the product was its last line. Finalized
    /// carts and carts without the product are left untouched, so applying
    /// the same withdrawal twice changes nothing the second time.
    pub fn withdraw_product(&mut self, product_id: ProductId) -> Withdrawal {
        if self.is_finalized() {
            return Withdrawal::NotPresent;
        }
        let Some(index) = self.items.iter().position(|i| i.product_id == product_id) else {
            return Withdrawal::NotPresent;
        };
        self.remove_at(index);
        if !self.items.is_empty() {
            return Withdrawal::Removed;
        }
        self.status = CartStatus::Finalized;
        self.pending.push(CartEvent::CartFinalized {
            cart_id: self.id,
            user_id: self.user_id,
        });
        Withdrawal::RemovedAndFinalized
    }

    fn ensure_active(&self) -> Result<(), CartError> {
        if self.is_finalized() {
            return Err(CartError::Finalized { cart_id: self.id });
        }
        Ok(())
    }

    fn push_item(&mut self, line: CartLine) {
        self.items.push(CartItem {
            cart_id: self.id,
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price: line.unit_price,
            discount: Default::default(),
        });
        self.pending.push(CartEvent::CartItemAdded {
            cart_id: self.id,
            product_id: line.product_id,
            quantity: line.quantity,
        });
    }

    fn set_quantity(&mut self, index: usize, new_quantity: u32) {
        let item = &mut self.items[index];
        let old_quantity = item.quantity;
        item.quantity = new_quantity;
        self.pending.push(CartEvent::CartItemQuantityChanged {
            cart_id: self.id,
            product_id: item.product_id,
            old_quantity,
            new_quantity,
        });
    }

    fn remove_at(&mut self, index: usize) {
        let item = self.items.remove(index);
        self.pending.push(CartEvent::CartItemRemoved {
            cart_id: self.id,
            product_id: item.product_id,
        });
    }
}

const SCHEMA: &[FieldSpec] = &[
    FieldSpec::new("id", FieldKind::Uuid),
    FieldSpec::new("user_id", FieldKind::Uuid),
    FieldSpec::new("date", FieldKind::Timestamp),
    FieldSpec::new("status", FieldKind::Text),
];

impl Document for Cart {
    type Id = CartId;
    type Event = CartEvent;

    fn document_type() -> &'static str {
        "Cart"
    }

    fn collection() -> &'static str {
        "carts"
    }

    fn schema() -> &'static [FieldSpec] {
        SCHEMA
    }

    fn id(&self) -> CartId {
        self.id
    }

    fn version(&self) -> Version {
        self.version
    }

    fn set_version(&mut self, version: Version) {
        self.version = version;
    }

    fn field(&self, name: &str) -> Option<FieldValue> {
        match name {
            "id" => Some(self.id.as_uuid().into()),
            "user_id" => Some(self.user_id.as_uuid().into()),
            "date" => Some(self.date.into()),
            "status" => Some(self.status.as_str().into()),
            _ => None,
        }
    }

    fn take_events(&mut self) -> Vec<CartEvent> {
        std::mem::take(&mut self.pending)
    }

    fn index_terms(&self) -> Vec<String> {
        self.items
            .iter()
            .map(|i| product_term(i.product_id))
            .collect()
    }

    /// Only one active cart per user may be stored.
    fn unique_key(&self) -> Option<String> {
        (self.status == CartStatus::Active).then(|| format!("active-cart:{}", self.user_id))
    }
}

/// Index term matching carts that hold a product.
pub fn product_term(product_id: ProductId) -> String {
    format!("product:{product_id}")
}
