use sea_orm::error::DbErr;
use tracing::error;

/// Error taxonomy shared by every service in the crate.
///
/// Persistence failures are wrapped rather than echoed: the underlying
/// driver message is logged at the failure site and carried only as a
/// `source`, so callers never see raw storage error text.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("insufficient stock: {0}")]
    InsufficientStock(String),

    #[error("invalid status transition: {0}")]
    InvalidStatusTransition(String),

    #[error("arithmetic overflow: {0}")]
    Overflow(String),

    #[error("persistence failure")]
    Persistence(#[source] DbErr),

    #[error("cache operation failed: {0}")]
    Cache(String),

    #[error("event delivery failed: {0}")]
    EventError(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Wraps a database error, logging the driver detail before it is
    /// sanitized away from the caller-facing message.
    pub fn db_error(err: DbErr) -> Self {
        error!(error = %err, "database operation failed");
        ServiceError::Persistence(err)
    }

    /// True for failures the caller caused, as opposed to infrastructure
    /// faults. Transport layers map these to 4xx responses.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServiceError::NotFound(_)
                | ServiceError::ValidationFailed(_)
                | ServiceError::InsufficientStock(_)
                | ServiceError::InvalidStatusTransition(_)
                | ServiceError::Overflow(_)
        )
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(errors: validator::ValidationErrors) -> Self {
        ServiceError::ValidationFailed(errors.to_string())
    }
}
