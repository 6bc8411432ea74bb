//! Products module: the catalogue and the bridge announcing deletions.

mod commands;
mod handlers;
mod service;

pub use commands::{CreateProduct, DeleteProduct, UpdateProduct};
pub use handlers::PublishProductDeleted;
pub use service::ProductService;
