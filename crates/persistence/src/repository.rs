use std::sync::Arc;

use common::{ListQuery, Page};
use tokio_util::sync::CancellationToken;

use crate::{Document, EventDispatcher, Result, Store, StoreExt, UnitOfWork};

/// A module's access point to one aggregate type.
///
/// Reads go straight to the store; writes are staged in a [`UnitOfWork`]
/// that carries the module's event dispatcher.
pub struct Repository<D: Document> {
    store: Arc<dyn Store<D>>,
    dispatcher: Arc<EventDispatcher<D::Event>>,
}

impl<D: Document> Clone for Repository<D> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            dispatcher: Arc::clone(&self.dispatcher),
        }
    }
}

impl<D: Document> Repository<D> {
    pub fn new(store: Arc<dyn Store<D>>, dispatcher: EventDispatcher<D::Event>) -> Self {
        Self {
            store,
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// A repository whose commits dispatch to no handlers.
    pub fn without_handlers(store: Arc<dyn Store<D>>) -> Self {
        Self::new(store, EventDispatcher::empty())
    }

    /// Starts a new unit of work.
    pub fn begin(&self) -> UnitOfWork<D> {
        UnitOfWork::new(Arc::clone(&self.store), Arc::clone(&self.dispatcher))
    }

    pub fn store(&self) -> &Arc<dyn Store<D>> {
        &self.store
    }

    pub async fn get(&self, id: D::Id, cancel: &CancellationToken) -> Result<Option<D>> {
        self.store.find(id, cancel).await
    }

    pub async fn find_one(&self, query: ListQuery, cancel: &CancellationToken) -> Result<Option<D>> {
        self.store.find_one(query, cancel).await
    }

    pub async fn find_all(&self, query: ListQuery, cancel: &CancellationToken) -> Result<Vec<D>> {
        self.store.find_all(query, cancel).await
    }

    pub async fn list(&self, query: &ListQuery, cancel: &CancellationToken) -> Result<Page<D>> {
        self.store.list(query, cancel).await
    }
}
