//! Sale domain events.

use chrono::{DateTime, Utc};
use common::{CartId, ProductId, SaleId, UserId};
use persistence::DomainEvent;

/// Facts raised by a [`super::Sale`] while it changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaleEvent {
    /// Raised at construction. Handlers use it to finalize the source cart.
    SaleCreated {
        sale_id: SaleId,
        cart_id: CartId,
        user_id: UserId,
    },
    SaleItemCanceled {
        sale_id: SaleId,
        product_id: ProductId,
    },
    SaleCanceled {
        sale_id: SaleId,
    },
    SaleFinalized {
        sale_id: SaleId,
    },
    SaleModified {
        sale_id: SaleId,
        branch: String,
        date: DateTime<Utc>,
    },
}

impl DomainEvent for SaleEvent {
    const EVENT_TYPES: &'static [&'static str] = &[
        "SaleCreated",
        "SaleItemCanceled",
        "SaleCanceled",
        "SaleFinalized",
        "SaleModified",
    ];

    fn event_type(&self) -> &'static str {
        match self {
            SaleEvent::SaleCreated { .. } => "SaleCreated",
            SaleEvent::SaleItemCanceled { .. } => "SaleItemCanceled",
            SaleEvent::SaleCanceled { .. } => "SaleCanceled",
            SaleEvent::SaleFinalized { .. } => "SaleFinalized",
            SaleEvent::SaleModified { .. } => "SaleModified",
        }
    }
}
