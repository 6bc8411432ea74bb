//! Sales module: sales snapshotted from carts.

mod commands;
mod consumer;
mod handlers;
mod service;

pub use commands::{CancelSale, CreateSaleFromCart, FinishSale, RemoveSaleItem, UpdateSale};
pub use consumer::CancelDeletedProductInSales;
pub use handlers::{CartAlreadySold, FinalizeSourceCart};
pub use service::{CartFinalizationStatus, CreatedSale, SaleService};
