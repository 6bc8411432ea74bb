//! Shared types for the store modules.
//!
//! Every module builds on the same identifiers, money representation and
//! list-query model so that storage back ends can serve all of them.

pub mod money;
pub mod page;
pub mod query;
pub mod types;

pub use money::{Money, Percentage, PercentageError};
pub use page::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, Page};
pub use query::{FieldKind, FieldSpec, FieldValue, Filter, ListQuery, OrderBy, QueryError};
pub use types::{CartId, DiscountRuleId, EntityId, MessageId, ProductId, SaleId, UserId};
