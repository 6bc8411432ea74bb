use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{EntityId, FieldValue, ListQuery, OrderBy, Page};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::cancel::guard;
use crate::{Change, Document, PersistenceError, Result, Store, Version};

struct Inner<D> {
    documents: BTreeMap<Uuid, D>,
    sequence: i64,
}

/// In-memory document store.
///
/// Provides the same guarantees as the PostgreSQL store: atomic batches,
/// optimistic versions, unique keys and a sequence per document type.
pub struct InMemoryStore<D> {
    inner: Arc<RwLock<Inner<D>>>,
}

impl<D> Clone for InMemoryStore<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<D> Default for InMemoryStore<D> {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(Inner {
                documents: BTreeMap::new(),
                sequence: 0,
            })),
        }
    }
}

impl<D: Document> InMemoryStore<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored documents.
    pub async fn len(&self) -> usize {
        self.inner.read().await.documents.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Returns every stored document in id order.
    pub async fn snapshot(&self) -> Vec<D> {
        self.inner.read().await.documents.values().cloned().collect()
    }
}

fn conflict<D: Document>(id: Uuid, expected: Version, actual: Version) -> PersistenceError {
    PersistenceError::ConcurrencyConflict {
        document_type: D::document_type(),
        id,
        expected,
        actual,
    }
}

fn check_unique<D: Document>(documents: &BTreeMap<Uuid, D>, document: &D) -> Result<()> {
    let Some(key) = document.unique_key() else {
        return Ok(());
    };
    let id = document.id().as_uuid();
    let taken = documents
        .iter()
        .any(|(other, d)| *other != id && d.unique_key().as_deref() == Some(key.as_str()));
    if taken {
        return Err(PersistenceError::UniqueViolation {
            document_type: D::document_type(),
            key,
        });
    }
    Ok(())
}

/// Missing values sort after present ones, as in PostgreSQL's default.
fn compare_fields(a: Option<FieldValue>, b: Option<FieldValue>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn compare<D: Document>(order_by: &[OrderBy], a: &D, b: &D) -> Ordering {
    for order in order_by {
        let ordering = compare_fields(a.field(order.field), b.field(order.field));
        let ordering = if order.descending {
            ordering.reverse()
        } else {
            ordering
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.id().as_uuid().cmp(&b.id().as_uuid())
}

#[async_trait]
impl<D: Document> Store<D> for InMemoryStore<D> {
    async fn find(&self, id: D::Id, cancel: &CancellationToken) -> Result<Option<D>> {
        guard(cancel, async {
            let inner = self.inner.read().await;
            Ok(inner.documents.get(&id.as_uuid()).cloned())
        })
        .await
    }

    async fn list(&self, query: &ListQuery, cancel: &CancellationToken) -> Result<Page<D>> {
        query.validate(D::schema())?;
        guard(cancel, async {
            let inner = self.inner.read().await;
            let mut matches: Vec<&D> = inner
                .documents
                .values()
                .filter(|d| {
                    let terms = d.index_terms();
                    query
                        .filters
                        .iter()
                        .all(|f| f.matches(|name| d.field(name), &terms))
                })
                .collect();
            matches.sort_by(|a, b| compare(&query.order_by, *a, *b));

            let total = matches.len() as u64;
            let items = matches
                .into_iter()
                .skip(query.offset() as usize)
                .take(query.size as usize)
                .cloned()
                .collect();
            Ok(Page::new(items, total, query.page, query.size))
        })
        .await
    }

    async fn save(&self, changes: Vec<Change<D>>, cancel: &CancellationToken) -> Result<Vec<D>> {
        guard(cancel, async {
            let mut inner = self.inner.write().await;
            let mut documents = inner.documents.clone();
            let mut sequence = inner.sequence;
            let mut saved = Vec::new();

            for change in changes {
                match change {
                    Change::Insert(mut document) => {
                        let id = document.id().as_uuid();
                        if documents.contains_key(&id) {
                            return Err(PersistenceError::AlreadyExists {
                                document_type: D::document_type(),
                                id,
                            });
                        }
                        if !document.version().is_initial() {
                            return Err(conflict::<D>(id, document.version(), Version::initial()));
                        }
                        check_unique(&documents, &document)?;
                        if D::sequence_name().is_some() {
                            sequence += 1;
                            document.assign_sequence(sequence);
                        }
                        document.set_version(Version::first());
                        documents.insert(id, document.clone());
                        saved.push(document);
                    }
                    Change::Update(mut document) => {
                        let id = document.id().as_uuid();
                        let stored = documents.get(&id).ok_or(PersistenceError::NotFound {
                            document_type: D::document_type(),
                            id,
                        })?;
                        if stored.version() != document.version() {
                            return Err(conflict::<D>(id, document.version(), stored.version()));
                        }
                        check_unique(&documents, &document)?;
                        document.set_version(document.version().next());
                        documents.insert(id, document.clone());
                        saved.push(document);
                    }
                    Change::Remove(document) => {
                        let id = document.id().as_uuid();
                        let stored = documents.get(&id).ok_or(PersistenceError::NotFound {
                            document_type: D::document_type(),
                            id,
                        })?;
                        if stored.version() != document.version() {
                            return Err(conflict::<D>(id, document.version(), stored.version()));
                        }
                        documents.remove(&id);
                    }
                }
            }

            inner.documents = documents;
            inner.sequence = sequence;
            Ok(saved)
        })
        .await
    }
}
