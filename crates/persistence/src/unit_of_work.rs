use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::{Change, Document, EventDispatcher, HandlerReport, Result, Store};

/// What a successful commit did.
#[derive(Debug, Clone)]
pub struct CommitReceipt<D> {
    /// Number of staged changes that were flushed.
    pub changes: usize,
    /// Inserted and updated documents with their new versions.
    pub saved: Vec<D>,
    /// Outcome of every domain-event handler that ran.
    pub reports: Vec<HandlerReport>,
}

impl<D> CommitReceipt<D> {
    /// Returns the report of a named handler, if it ran.
    pub fn report(&self, handler: &str) -> Option<&HandlerReport> {
        self.reports.iter().find(|r| r.handler == handler)
    }

    /// Takes the first saved document.
    pub fn into_saved(self) -> Option<D> {
        self.saved.into_iter().next()
    }
}

/// Transaction boundary for one module's document changes.
///
/// Changes are staged in memory. [`UnitOfWork::commit`] drains the domain
/// events of every staged document (staging order, then raise order),
/// dispatches them, and only then flushes all changes atomically. A handler
/// error aborts the flush.
pub struct UnitOfWork<D: Document> {
    store: Arc<dyn Store<D>>,
    dispatcher: Arc<EventDispatcher<D::Event>>,
    staged: Vec<Change<D>>,
}

impl<D: Document> UnitOfWork<D> {
    pub fn new(store: Arc<dyn Store<D>>, dispatcher: Arc<EventDispatcher<D::Event>>) -> Self {
        Self {
            store,
            dispatcher,
            staged: Vec::new(),
        }
    }

    pub fn add(&mut self, document: D) {
        self.staged.push(Change::Insert(document));
    }

    pub fn update(&mut self, document: D) {
        self.staged.push(Change::Update(document));
    }

    pub fn remove(&mut self, document: D) {
        self.staged.push(Change::Remove(document));
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    #[tracing::instrument(
        skip(self, cancel),
        fields(document_type = D::document_type(), changes = self.staged.len())
    )]
    pub async fn commit(mut self, cancel: &CancellationToken) -> Result<CommitReceipt<D>> {
        let started = Instant::now();

        let events: Vec<D::Event> = self
            .staged
            .iter_mut()
            .flat_map(|change| change.document_mut().take_events())
            .collect();

        let reports = self.dispatcher.dispatch(&events, cancel).await?;

        let changes = self.staged.len();
        let saved = if changes == 0 {
            Vec::new()
        } else {
            self.store.save(self.staged, cancel).await?
        };

        metrics::counter!("uow_commits_total", "document_type" => D::document_type()).increment(1);
        metrics::histogram!("uow_commit_duration_seconds", "document_type" => D::document_type())
            .record(started.elapsed().as_secs_f64());
        tracing::debug!(events = events.len(), changes, "unit of work committed");

        Ok(CommitReceipt {
            changes,
            saved,
            reports,
        })
    }
}
