use async_trait::async_trait;
use common::{ListQuery, MAX_PAGE_SIZE, Page};
use tokio_util::sync::CancellationToken;

use crate::{Document, Result};

/// A staged write against a document store.
#[derive(Debug, Clone)]
pub enum Change<D> {
    /// Stores a new document. Its version must be [`crate::Version::initial`].
    Insert(D),
    /// Replaces a stored document, conditional on its loaded version.
    Update(D),
    /// Deletes a stored document, conditional on its loaded version.
    Remove(D),
}

impl<D: Document> Change<D> {
    pub fn document(&self) -> &D {
        match self {
            Change::Insert(d) | Change::Update(d) | Change::Remove(d) => d,
        }
    }

    pub fn document_mut(&mut self) -> &mut D {
        match self {
            Change::Insert(d) | Change::Update(d) | Change::Remove(d) => d,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Change::Insert(_) => "insert",
            Change::Update(_) => "update",
            Change::Remove(_) => "remove",
        }
    }
}

/// Core trait for document store implementations.
///
/// All implementations must be thread-safe (Send + Sync) and honor the
/// cancellation token on every call.
#[async_trait]
pub trait Store<D: Document>: Send + Sync {
    /// Loads a document by id, with its stored version.
    async fn find(&self, id: D::Id, cancel: &CancellationToken) -> Result<Option<D>>;

    /// Returns one page of documents matching the query.
    ///
    /// Documents are ordered by the query's ordering, then by id.
    async fn list(&self, query: &ListQuery, cancel: &CancellationToken) -> Result<Page<D>>;

    /// Applies all changes atomically: either every change is stored or none.
    ///
    /// Version, uniqueness and sequence rules are enforced here. Returns the
    /// inserted and updated documents with their new versions, in order.
    async fn save(&self, changes: Vec<Change<D>>, cancel: &CancellationToken) -> Result<Vec<D>>;
}

/// Extension trait providing convenience methods for document stores.
#[async_trait]
pub trait StoreExt<D: Document>: Store<D> {
    /// Returns the first document matching the query, if any.
    async fn find_one(&self, query: ListQuery, cancel: &CancellationToken) -> Result<Option<D>> {
        let page = self.list(&query.page(1).size(1), cancel).await?;
        Ok(page.items.into_iter().next())
    }

    /// Returns every document matching the query's filters, across all pages.
    async fn find_all(&self, query: ListQuery, cancel: &CancellationToken) -> Result<Vec<D>> {
        let mut query = query.size(MAX_PAGE_SIZE).page(1);
        let mut documents = Vec::new();
        loop {
            let page = self.list(&query, cancel).await?;
            let fetched = page.items.len();
            let has_next = page.has_next();
            documents.extend(page.items);
            if fetched < MAX_PAGE_SIZE as usize || !has_next {
                return Ok(documents);
            }
            query.page += 1;
        }
    }

    /// Returns whether a document with this id is stored.
    async fn exists(&self, id: D::Id, cancel: &CancellationToken) -> Result<bool> {
        Ok(self.find(id, cancel).await?.is_some())
    }
}

impl<D: Document, T: Store<D> + ?Sized> StoreExt<D> for T {}
