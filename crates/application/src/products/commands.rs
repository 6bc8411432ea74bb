use common::{Money, ProductId};
use domain::{ProductDetails, Rating};
use serde::Deserialize;
use validator::Validate;

/// Command to add a product to the catalogue.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProduct {
    #[validate(length(min = 1, max = 200, message = "Title must be 1-200 characters"))]
    pub title: String,
    /// Price in cents.
    #[validate(range(min = 1, message = "Price must be greater than zero"))]
    pub price: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub rating: Rating,
}

impl CreateProduct {
    pub fn new(title: impl Into<String>, price: Money) -> Self {
        Self {
            title: title.into(),
            price: price.cents(),
            description: String::new(),
            category: String::new(),
            image: String::new(),
            rating: Rating::default(),
        }
    }

    pub fn in_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub(crate) fn into_details(self) -> ProductDetails {
        ProductDetails {
            title: self.title,
            price: Money::from_cents(self.price),
            description: self.description,
            category: self.category,
            image: self.image,
            rating: self.rating,
        }
    }
}

/// Command to replace a product's attributes.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateProduct {
    pub product_id: ProductId,
    #[serde(flatten)]
    #[validate(nested)]
    pub details: CreateProduct,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct DeleteProduct {
    pub product_id: ProductId,
}
