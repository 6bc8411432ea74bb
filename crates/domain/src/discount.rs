//! Quantity-tiered discount rules and the selection engine.

use std::cmp::Ordering;

use common::{DiscountRuleId, FieldKind, FieldSpec, FieldValue, Percentage};
use persistence::{Document, DomainEvent, Version};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when defining a discount rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiscountRuleError {
    #[error("Invalid quantity range [{min}, {max}]")]
    InvalidRange { min: u32, max: u32 },
}

/// Discount rules raise no domain events.
#[derive(Debug, Clone)]
pub enum DiscountRuleEvent {}

impl DomainEvent for DiscountRuleEvent {
    const EVENT_TYPES: &'static [&'static str] = &[];

    fn event_type(&self) -> &'static str {
        match *self {}
    }
}

/// A discount granted to cart items whose quantity falls in
/// `[min_quantity, max_quantity]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountRule {
    id: DiscountRuleId,
    #[serde(default)]
    version: Version,
    min_quantity: u32,
    max_quantity: u32,
    discount: Percentage,
    active: bool,
}

impl DiscountRule {
    /// Creates an active rule.
    pub fn new(
        min_quantity: u32,
        max_quantity: u32,
        discount: Percentage,
    ) -> Result<Self, DiscountRuleError> {
        if min_quantity == 0 || min_quantity > max_quantity {
            return Err(DiscountRuleError::InvalidRange {
                min: min_quantity,
                max: max_quantity,
            });
        }
        Ok(Self {
            id: DiscountRuleId::new(),
            version: Version::initial(),
            min_quantity,
            max_quantity,
            discount,
            active: true,
        })
    }

    pub fn min_quantity(&self) -> u32 {
        self.min_quantity
    }

    pub fn max_quantity(&self) -> u32 {
        self.max_quantity
    }

    pub fn discount(&self) -> Percentage {
        self.discount
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn deactivate(&mut self) {
        self.active = false;
    }

    /// Returns true if the rule covers `quantity`.
    pub fn covers(&self, quantity: u32) -> bool {
        (self.min_quantity..=self.max_quantity).contains(&quantity)
    }

    fn span(&self) -> u32 {
        self.max_quantity - self.min_quantity
    }
}

/// The tiers seeded into an empty catalogue: 4-9 units earn 10 %,
/// 10-20 units earn 20 %.
pub fn default_rules() -> Vec<DiscountRule> {
    [(4, 9, 10), (10, 20, 20)]
        .into_iter()
        .filter_map(|(min, max, pct)| DiscountRule::new(min, max, Percentage::whole(pct)).ok())
        .collect()
}

/// Higher minimum wins, then the narrower range, then the larger discount.
fn precedence(a: &DiscountRule, b: &DiscountRule) -> Ordering {
    a.min_quantity
        .cmp(&b.min_quantity)
        .then_with(|| b.span().cmp(&a.span()))
        .then_with(|| a.discount.cmp(&b.discount))
}

/// Selects the discount for an item quantity.
///
/// Only active rules covering the quantity compete. With no match the
/// discount is zero.
pub fn select_discount(rules: &[DiscountRule], quantity: u32) -> Percentage {
    rules
        .iter()
        .filter(|rule| rule.active && rule.covers(quantity))
        .max_by(|a, b| precedence(a, b))
        .map_or_else(Percentage::zero, |rule| rule.discount)
}

const SCHEMA: &[FieldSpec] = &[
    FieldSpec::new("id", FieldKind::Uuid),
    FieldSpec::new("min_quantity", FieldKind::Integer),
    FieldSpec::new("max_quantity", FieldKind::Integer),
    FieldSpec::new("discount", FieldKind::Decimal),
    FieldSpec::new("active", FieldKind::Bool),
];

impl Document for DiscountRule {
    type Id = DiscountRuleId;
    type Event = DiscountRuleEvent;

    fn document_type() -> &'static str {
        "DiscountRule"
    }

    fn collection() -> &'static str {
        "discount_rules"
    }

    fn schema() -> &'static [FieldSpec] {
        SCHEMA
    }

    fn id(&self) -> DiscountRuleId {
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
            "min_quantity" => Some(i64::from(self.min_quantity).into()),
            "max_quantity" => Some(i64::from(self.max_quantity).into()),
            "discount" => Some(self.discount.value().into()),
            "active" => Some(self.active.into()),
            _ => None,
        }
    }

    fn take_events(&mut self) -> Vec<DiscountRuleEvent> {
        Vec::new()
    }
}
