use common::QueryError;
use thiserror::Error;
use uuid::Uuid;

use crate::{HandlerError, Version};

/// Errors that can occur when loading, listing or committing documents.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// The stored version did not match the version the change was based on.
    #[error(
        "Concurrency conflict for {document_type} {id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        document_type: &'static str,
        id: Uuid,
        expected: Version,
        actual: Version,
    },

    /// The document to update or remove does not exist.
    #[error("{document_type} not found: {id}")]
    NotFound { document_type: &'static str, id: Uuid },

    /// A document with the same id is already stored.
    #[error("{document_type} already exists: {id}")]
    AlreadyExists { document_type: &'static str, id: Uuid },

    /// Another document already holds the same unique key.
    #[error("Unique key '{key}' already taken for {document_type}")]
    UniqueViolation {
        document_type: &'static str,
        key: String,
    },

    /// The list query does not fit the document schema.
    #[error("Invalid query: {0}")]
    InvalidQuery(#[from] QueryError),

    /// A domain-event handler failed; the commit was aborted before flushing.
    #[error("Handler {handler} failed on {event_type}: {source}")]
    Dispatch {
        event_type: &'static str,
        handler: &'static str,
        #[source]
        source: HandlerError,
    },

    /// The operation was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for persistence operations.
pub type Result<T> = std::result::Result<T, PersistenceError>;
