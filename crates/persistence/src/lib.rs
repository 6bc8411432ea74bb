//! Persistence boundary shared by the store modules.
//!
//! Aggregates are stored as versioned JSON documents. Each module reads them
//! through a [`Repository`] and writes them through a [`UnitOfWork`], whose
//! commit dispatches the buffered domain events to in-process handlers before
//! flushing the changes atomically.

pub mod cancel;
pub mod dispatcher;
pub mod document;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod repository;
pub mod store;
pub mod unit_of_work;
pub mod version;

pub use dispatcher::{
    DispatcherBuilder, EventDispatcher, EventHandler, HandlerError, HandlerOutcome, HandlerReport,
};
pub use document::{Document, DomainEvent};
pub use error::{PersistenceError, Result};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use repository::Repository;
pub use store::{Change, Store, StoreExt};
pub use unit_of_work::{CommitReceipt, UnitOfWork};
pub use version::Version;

pub use tokio_util::sync::CancellationToken;
