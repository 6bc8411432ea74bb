//! Application error taxonomy.

use common::{PercentageError, QueryError};
use domain::{CartError, DiscountRuleError, ProductError, SaleError, UserError};
use messaging::MessagingError;
use persistence::PersistenceError;
use serde::Serialize;
use thiserror::Error;

use crate::sales::CartAlreadySold;

/// Stable, machine-readable failure code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorCode {
    ValidationError,
    InvalidOperation,
    ResourceNotFound,
    Conflict,
    UnexpectedError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "ValidationError",
            ErrorCode::InvalidOperation => "InvalidOperation",
            ErrorCode::ResourceNotFound => "ResourceNotFound",
            ErrorCode::Conflict => "Conflict",
            ErrorCode::UnexpectedError => "UnexpectedError",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors returned by the module services and façades.
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// Caller input broke a rule; nothing was changed.
    #[error("{0}")]
    Validation(String),

    /// The aggregate's state does not allow the operation.
    #[error("{0}")]
    InvalidOperation(String),

    #[error("{resource} {id} not found")]
    NotFound { resource: &'static str, id: String },

    #[error("{0}")]
    Conflict(String),

    /// Storage failure or cancellation.
    #[error(transparent)]
    Persistence(PersistenceError),

    /// Broker failure.
    #[error(transparent)]
    Messaging(MessagingError),

    #[error("Password hashing failed: {0}")]
    Hashing(#[from] bcrypt::BcryptError),

    #[error("Unexpected error: {0}")]
    Unexpected(String),
}

impl ApplicationError {
    pub fn not_found(resource: &'static str, id: impl ToString) -> Self {
        ApplicationError::NotFound {
            resource,
            id: id.to_string(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ApplicationError::Validation(_) => ErrorCode::ValidationError,
            ApplicationError::InvalidOperation(_) => ErrorCode::InvalidOperation,
            ApplicationError::NotFound { .. } => ErrorCode::ResourceNotFound,
            ApplicationError::Conflict(_) => ErrorCode::Conflict,
            ApplicationError::Persistence(_)
            | ApplicationError::Messaging(_)
            | ApplicationError::Hashing(_)
            | ApplicationError::Unexpected(_) => ErrorCode::UnexpectedError,
        }
    }

    /// Human-readable description.
    pub fn detail(&self) -> String {
        self.to_string()
    }
}

impl From<PersistenceError> for ApplicationError {
    fn from(error: PersistenceError) -> Self {
        match error {
            PersistenceError::UniqueViolation { key, .. } if key.starts_with("active-cart:") => {
                ApplicationError::Conflict("An active cart already exists for this user".into())
            }
            PersistenceError::UniqueViolation { .. }
            | PersistenceError::ConcurrencyConflict { .. }
            | PersistenceError::AlreadyExists { .. } => {
                ApplicationError::Conflict(error.to_string())
            }
            PersistenceError::NotFound { document_type, id } => {
                ApplicationError::not_found(document_type, id)
            }
            PersistenceError::InvalidQuery(e) => e.into(),
            PersistenceError::Dispatch { ref source, .. }
                if source.downcast_ref::<CartAlreadySold>().is_some() =>
            {
                ApplicationError::InvalidOperation(source.to_string())
            }
            other => ApplicationError::Persistence(other),
        }
    }
}

impl From<MessagingError> for ApplicationError {
    fn from(error: MessagingError) -> Self {
        ApplicationError::Messaging(error)
    }
}

impl From<QueryError> for ApplicationError {
    fn from(error: QueryError) -> Self {
        ApplicationError::Validation(error.to_string())
    }
}

impl From<validator::ValidationErrors> for ApplicationError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ApplicationError::Validation(errors.to_string())
    }
}

impl From<PercentageError> for ApplicationError {
    fn from(error: PercentageError) -> Self {
        ApplicationError::Validation(error.to_string())
    }
}

impl From<CartError> for ApplicationError {
    fn from(error: CartError) -> Self {
        match error {
            CartError::Finalized { .. } => ApplicationError::InvalidOperation(error.to_string()),
            CartError::InvalidQuantity { .. } => ApplicationError::Validation(error.to_string()),
            CartError::ItemNotFound { product_id } => {
                ApplicationError::not_found("Cart item", product_id)
            }
        }
    }
}

impl From<SaleError> for ApplicationError {
    fn from(error: SaleError) -> Self {
        match error {
            SaleError::InvalidStateTransition { .. } => {
                ApplicationError::InvalidOperation(error.to_string())
            }
            SaleError::ItemNotFound { product_id } => {
                ApplicationError::not_found("Sale item", product_id)
            }
            SaleError::BranchRequired
            | SaleError::InvalidQuantity { .. }
            | SaleError::DuplicateItem { .. } => ApplicationError::Validation(error.to_string()),
        }
    }
}

impl From<ProductError> for ApplicationError {
    fn from(error: ProductError) -> Self {
        ApplicationError::Validation(error.to_string())
    }
}

impl From<UserError> for ApplicationError {
    fn from(error: UserError) -> Self {
        match error {
            UserError::StatusUnchanged { .. } => {
                ApplicationError::InvalidOperation(error.to_string())
            }
            UserError::UsernameRequired | UserError::EmailRequired => {
                ApplicationError::Validation(error.to_string())
            }
        }
    }
}

impl From<DiscountRuleError> for ApplicationError {
    fn from(error: DiscountRuleError) -> Self {
        ApplicationError::Validation(error.to_string())
    }
}

/// Result type for application operations.
pub type Result<T> = std::result::Result<T, ApplicationError>;

#[cfg(test)]
mod tests {
    use common::{CartId, ProductId, SaleId};
    use domain::SaleStatus;
    use persistence::Version;

    use super::*;

    #[test]
    fn active_cart_violation_is_a_conflict() {
        let error: ApplicationError = PersistenceError::UniqueViolation {
            document_type: "Cart",
            key: "active-cart:42".into(),
        }
        .into();
        assert_eq!(error.code(), ErrorCode::Conflict);
        assert!(error.detail().contains("active cart"));
    }

    #[test]
    fn stale_versions_are_conflicts() {
        let error: ApplicationError = PersistenceError::ConcurrencyConflict {
            document_type: "Sale",
            id: SaleId::new().as_uuid(),
            expected: Version::new(1),
            actual: Version::new(2),
        }
        .into();
        assert_eq!(error.code(), ErrorCode::Conflict);
    }

    #[test]
    fn cancellation_is_unexpected() {
        let error: ApplicationError = PersistenceError::Cancelled.into();
        assert_eq!(error.code(), ErrorCode::UnexpectedError);
    }

    #[test]
    fn domain_errors_map_to_codes() {
        let finalized: ApplicationError = CartError::Finalized {
            cart_id: CartId::new(),
        }
        .into();
        assert_eq!(finalized.code(), ErrorCode::InvalidOperation);

        let transition: ApplicationError = SaleError::InvalidStateTransition {
            sale_id: SaleId::new(),
            status: SaleStatus::Canceled,
            action: "finish",
        }
        .into();
        assert_eq!(transition.code(), ErrorCode::InvalidOperation);

        let missing: ApplicationError = SaleError::ItemNotFound {
            product_id: ProductId::new(),
        }
        .into();
        assert_eq!(missing.code(), ErrorCode::ResourceNotFound);

        let quantity: ApplicationError = CartError::InvalidQuantity {
            product_id: ProductId::new(),
            quantity: 21,
        }
        .into();
        assert_eq!(quantity.code(), ErrorCode::ValidationError);
    }
}
