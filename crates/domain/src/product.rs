//! Product catalogue aggregate.

use common::{FieldKind, FieldSpec, FieldValue, Money, ProductId};
use persistence::{Document, DomainEvent, Version};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProductError {
    #[error("Product title is required")]
    TitleRequired,

    #[error("Invalid price: {price} (must be greater than 0)")]
    InvalidPrice { price: Money },

    #[error("Invalid rating: {rate} (must be between 0 and 5)")]
    InvalidRating { rate: Decimal },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductEvent {
    ProductCreated { product_id: ProductId },
    ProductUpdated { product_id: ProductId },
    /// Raised before the product is removed; bridged to the integration bus.
    ProductDeleted { product_id: ProductId },
}

impl DomainEvent for ProductEvent {
    const EVENT_TYPES: &'static [&'static str] =
        &["ProductCreated", "ProductUpdated", "ProductDeleted"];

    fn event_type(&self) -> &'static str {
        match self {
            ProductEvent::ProductCreated { .. } => "ProductCreated",
            ProductEvent::ProductUpdated { .. } => "ProductUpdated",
            ProductEvent::ProductDeleted { .. } => "ProductDeleted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rating {
    pub rate: Decimal,
    pub count: u32,
}

/// The editable attributes of a product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub title: String,
    pub price: Money,
    pub description: String,
    pub category: String,
    pub image: String,
    #[serde(default)]
    pub rating: Rating,
}

impl ProductDetails {
    fn validated(mut self) -> Result<Self, ProductError> {
        self.title = self.title.trim().to_string();
        if self.title.is_empty() {
            return Err(ProductError::TitleRequired);
        }
        if !self.price.is_positive() {
            return Err(ProductError::InvalidPrice { price: self.price });
        }
        if self.rating.rate < Decimal::ZERO || self.rating.rate > Decimal::from(5) {
            return Err(ProductError::InvalidRating {
                rate: self.rating.rate,
            });
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    id: ProductId,
    #[serde(default)]
    version: Version,
    #[serde(flatten)]
    details: ProductDetails,
    #[serde(skip)]
    pending: Vec<ProductEvent>,
}

impl Product {
    pub fn create(details: ProductDetails) -> Result<Self, ProductError> {
        let id = ProductId::new();
        Ok(Self {
            id,
            version: Version::initial(),
            details: details.validated()?,
            pending: vec![ProductEvent::ProductCreated { product_id: id }],
        })
    }

    pub fn details(&self) -> &ProductDetails {
        &self.details
    }

    pub fn title(&self) -> &str {
        &self.details.title
    }

    pub fn price(&self) -> Money {
        self.details.price
    }

    /// Replaces the product's attributes. Carts keep the prices they
    /// already captured.
    pub fn update(&mut self, details: ProductDetails) -> Result<(), ProductError> {
        self.details = details.validated()?;
        self.pending.push(ProductEvent::ProductUpdated {
            product_id: self.id,
        });
        Ok(())
    }

    /// Marks the product for deletion. The caller stages its removal.
    pub fn delete(&mut self) {
        self.pending.push(ProductEvent::ProductDeleted {
            product_id: self.id,
        });
    }
}

const SCHEMA: &[FieldSpec] = &[
    FieldSpec::new("id", FieldKind::Uuid),
    FieldSpec::new("title", FieldKind::Text),
    FieldSpec::new("price", FieldKind::Integer),
    FieldSpec::new("description", FieldKind::Text),
    FieldSpec::new("category", FieldKind::Text),
];

impl Document for Product {
    type Id = ProductId;
    type Event = ProductEvent;

    fn document_type() -> &'static str {
        "Product"
    }

    fn collection() -> &'static str {
        "products"
    }

    fn schema() -> &'static [FieldSpec] {
        SCHEMA
    }

    fn id(&self) -> ProductId {
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
            "title" => Some(self.details.title.clone().into()),
            "price" => Some(self.details.price.cents().into()),
            "description" => Some(self.details.description.clone().into()),
            "category" => Some(self.details.category.clone().into()),
            _ => None,
        }
    }

    fn take_events(&mut self) -> Vec<ProductEvent> {
        std::mem::take(&mut self.pending)
    }
}
