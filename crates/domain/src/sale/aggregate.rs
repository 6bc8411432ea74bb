//! Sale aggregate implementation.

use chrono::{DateTime, Utc};
use common::{
    CartId, FieldKind, FieldSpec, FieldValue, Money, Percentage, ProductId, SaleId, UserId,
};
use persistence::{Document, Version};
use serde::{Deserialize, Serialize};

use super::{SaleError, SaleEvent, SaleItem, SaleStatus};
use crate::cart::quantity_in_range;

/// Result of canceling one sale item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemCancellation {
    Canceled,
    /// The item was the last one, so the whole sale was canceled.
    CanceledSale,
}

/// Sale aggregate root.
///
/// Prices and discounts are copied from the source cart when the sale is
/// created and never recomputed. The `number` is assigned by storage on
/// first insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sale {
    id: SaleId,

    #[serde(default)]
    version: Version,

    number: Option<i64>,

    date: DateTime<Utc>,

    user_id: UserId,

    branch: String,

    cart_id: CartId,

    status: SaleStatus,

    items: Vec<SaleItem>,

    #[serde(skip)]
    pending: Vec<SaleEvent>,
}

// Query methods
impl Sale {
    pub fn number(&self) -> Option<i64> {
        self.number
    }

    pub fn date(&self) -> DateTime<Utc> {
        self.date
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn branch(&self) -> &str {
        &self.branch
    }

    pub fn cart_id(&self) -> CartId {
        self.cart_id
    }

    pub fn status(&self) -> SaleStatus {
        self.status
    }

    pub fn items(&self) -> &[SaleItem] {
        &self.items
    }

    pub fn item(&self, product_id: ProductId) -> Option<&SaleItem> {
        self.items.iter().find(|i| i.product_id == product_id)
    }

    /// Sum of the item totals.
    pub fn total(&self) -> Money {
        self.items.iter().map(SaleItem::total).sum()
    }
}

// Command methods
impl Sale {
    /// Creates an active sale for a cart and raises `SaleCreated`.
    pub fn create(
        date: DateTime<Utc>,
        user_id: UserId,
        branch: impl Into<String>,
        cart_id: CartId,
    ) -> Result<Self, SaleError> {
        let branch = branch.into().trim().to_string();
        if branch.is_empty() {
            return Err(SaleError::BranchRequired);
        }
        let id = SaleId::new();
        Ok(Self {
            id,
            version: Version::initial(),
            number: None,
            date,
            user_id,
            branch,
            cart_id,
            status: SaleStatus::Active,
            items: Vec::new(),
            pending: vec![SaleEvent::SaleCreated {
                sale_id: id,
                cart_id,
                user_id,
            }],
        })
    }

    pub fn add_item(
        &mut self,
        product_id: ProductId,
        quantity: u32,
        unit_price: Money,
        discount: Percentage,
    ) -> Result<(), SaleError> {
        self.ensure_active("add an item to")?;
        if !quantity_in_range(quantity) {
            return Err(SaleError::InvalidQuantity {
                product_id,
                quantity,
            });
        }
        if self.item(product_id).is_some() {
            return Err(SaleError::DuplicateItem { product_id });
        }
        self.items.push(SaleItem {
            sale_id: self.id,
            product_id,
            quantity,
            unit_price,
            discount,
        });
        Ok(())
    }

    /// Cancels one item. Canceling the last item cancels the sale.
    pub fn cancel_item(&mut self, product_id: ProductId) -> Result<ItemCancellation, SaleError> {
        self.ensure_active("cancel an item of")?;
        let index = self
            .items
            .iter()
            .position(|i| i.product_id == product_id)
            .ok_or(SaleError::ItemNotFound { product_id })?;

        self.items.remove(index);
        self.pending.push(SaleEvent::SaleItemCanceled {
            sale_id: self.id,
            product_id,
        });

        if !self.items.is_empty() {
            return Ok(ItemCancellation::Canceled);
        }
        self.status = SaleStatus::Canceled;
        self.pending.push(SaleEvent::SaleCanceled { sale_id: self.id });
        Ok(ItemCancellation::CanceledSale)
    }

    pub fn cancel(&mut self) -> Result<(), SaleError> {
        self.ensure_active("cancel")?;
        self.status = SaleStatus::Canceled;
        self.pending.push(SaleEvent::SaleCanceled { sale_id: self.id });
        Ok(())
    }

    pub fn finish(&mut self) -> Result<(), SaleError> {
        self.ensure_active("finish")?;
        self.status = SaleStatus::Finalized;
        self.pending.push(SaleEvent::SaleFinalized { sale_id: self.id });
        Ok(())
    }

    /// Changes the branch and date. Only a canceled sale refuses.
    pub fn update_branch_and_date(
        &mut self,
        branch: impl Into<String>,
        date: DateTime<Utc>,
    ) -> Result<(), SaleError> {
        if self.status == SaleStatus::Canceled {
            return Err(self.invalid("update"));
        }
        let branch = branch.into().trim().to_string();
        if branch.is_empty() {
            return Err(SaleError::BranchRequired);
        }
        self.branch = branch.clone();
        self.date = date;
        self.pending.push(SaleEvent::SaleModified {
            sale_id: self.id,
            branch,
            date,
        });
        Ok(())
    }

    fn ensure_active(&self, action: &'static str) -> Result<(), SaleError> {
        if self.status != SaleStatus::Active {
            return Err(self.invalid(action));
        }
        Ok(())
    }

    fn invalid(&self, action: &'static str) -> SaleError {
        SaleError::InvalidStateTransition {
            sale_id: self.id,
            status: self.status,
            action,
        }
    }
}

const SCHEMA: &[FieldSpec] = &[
    FieldSpec::new("id", FieldKind::Uuid),
    FieldSpec::new("number", FieldKind::Integer),
    FieldSpec::new("date", FieldKind::Timestamp),
    FieldSpec::new("user_id", FieldKind::Uuid),
    FieldSpec::new("branch", FieldKind::Text),
    FieldSpec::new("cart_id", FieldKind::Uuid),
    FieldSpec::new("status", FieldKind::Text),
];

impl Document for Sale {
    type Id = SaleId;
    type Event = SaleEvent;

    fn document_type() -> &'static str {
        "Sale"
    }

    fn collection() -> &'static str {
        "sales"
    }

    fn schema() -> &'static [FieldSpec] {
        SCHEMA
    }

    fn id(&self) -> SaleId {
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
            "number" => self.number.map(FieldValue::from),
            "date" => Some(self.date.into()),
            "user_id" => Some(self.user_id.as_uuid().into()),
            "branch" => Some(self.branch.clone().into()),
            "cart_id" => Some(self.cart_id.as_uuid().into()),
            "status" => Some(self.status.as_str().into()),
            _ => None,
        }
    }

    fn take_events(&mut self) -> Vec<SaleEvent> {
        std::mem::take(&mut self.pending)
    }

    fn index_terms(&self) -> Vec<String> {
        self.items
            .iter()
            .map(|i| crate::cart::product_term(i.product_id))
            .collect()
    }

    fn sequence_name() -> Option<&'static str> {
        Some("sale_number_seq")
    }

    fn assign_sequence(&mut self, value: i64) {
        self.number = Some(value);
    }
}
