//! Command and query services of the Users, Products, Carts and Sales
//! modules.
//!
//! Each module owns its repositories. Modules reach each other only through
//! the façades in [`facade`] (synchronous, separate commits) or through the
//! integration bus (asynchronous, at-least-once, idempotent consumers).

pub mod carts;
pub mod error;
pub mod facade;
pub mod modules;
pub mod products;
pub mod sales;
pub mod users;

pub use carts::{
    CartProduct, CartService, CreateCart, CreateDiscountRule, DeactivateDiscountRule, DeleteCart,
    DiscountRuleService, PublishFinalizedCart, RemoveDeletedProductFromCarts, UpdateCart,
};
pub use error::{ApplicationError, ErrorCode, Result};
pub use facade::{
    CartFinalization, CartSnapshot, CartSnapshotItem, CartsFacade, ProductSnapshot,
    ProductsFacade, UsersFacade,
};
pub use modules::{Modules, Stores};
pub use products::{
    CreateProduct, DeleteProduct, ProductService, PublishProductDeleted, UpdateProduct,
};
pub use sales::{
    CancelDeletedProductInSales, CancelSale, CartAlreadySold, CartFinalizationStatus,
    CreateSaleFromCart, CreatedSale, FinalizeSourceCart, FinishSale, RemoveSaleItem, SaleService,
    UpdateSale,
};
pub use users::{
    BcryptHasher, CreateUser, DeleteUser, PasswordHasher, UpdateUserStatus, UserService,
    VerifyCredentials,
};

use common::ListQuery;
use persistence::{CommitReceipt, Document};

/// Parses raw list parameters (`field=value`, `_min_x`, `_max_x`, `_order`,
/// `_page`, `_size`) against the document's field whitelist.
pub fn list_query<D, I, K, V>(params: I) -> Result<ListQuery>
where
    D: Document,
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    Ok(ListQuery::parse(D::schema(), params)?)
}

/// The document written by a single-document commit.
pub(crate) fn saved<D>(receipt: CommitReceipt<D>) -> Result<D> {
    receipt
        .into_saved()
        .ok_or_else(|| ApplicationError::Unexpected("commit stored no document".into()))
}
