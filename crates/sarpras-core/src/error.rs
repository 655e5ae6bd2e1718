//! Service-level error types.
//!
//! Business-rule violations are raised as typed errors with a status
//! classification and a human-readable message, and propagate to the
//! boundary unchanged. Background work (cache sweep, prewarm) never
//! surfaces errors here; those are logged and swallowed at the call site.

use crate::cache::CacheError;
use crate::db::DbError;
use thiserror::Error;

/// Errors returned by the loan and booking services.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Malformed or missing input; the caller's fault, no retry.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Referenced entity absent.
    #[error("Not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },

    /// Overlapping booking, insufficient stock, duplicate active loan,
    /// or an already-resolved verification.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Identity or role gate failed.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Persistence or other unexpected fault.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Coarse status classification each error maps to at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusClass {
    BadRequest,
    NotFound,
    Conflict,
    Forbidden,
    Internal,
}

impl ServiceError {
    /// Convenience constructor for a missing entity.
    pub fn not_found(entity: &str, id: impl ToString) -> Self {
        Self::NotFound {
            entity: entity.to_string(),
            id: id.to_string(),
        }
    }

    /// Returns the status classification for this error.
    pub fn status_class(&self) -> StatusClass {
        match self {
            ServiceError::Validation(_) => StatusClass::BadRequest,
            ServiceError::NotFound { .. } => StatusClass::NotFound,
            ServiceError::Conflict(_) => StatusClass::Conflict,
            ServiceError::Forbidden(_) => StatusClass::Forbidden,
            ServiceError::Internal(_) => StatusClass::Internal,
        }
    }
}

impl From<DbError> for ServiceError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ServiceError::NotFound { entity, id },
            DbError::Constraint(msg) => ServiceError::Conflict(msg),
            other => ServiceError::Internal(other.to_string()),
        }
    }
}

impl From<CacheError> for ServiceError {
    fn from(err: CacheError) -> Self {
        ServiceError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(
            ServiceError::Validation("empty".into()).status_class(),
            StatusClass::BadRequest
        );
        assert_eq!(
            ServiceError::not_found("item", "abc").status_class(),
            StatusClass::NotFound
        );
        assert_eq!(
            ServiceError::Conflict("overlap".into()).status_class(),
            StatusClass::Conflict
        );
        assert_eq!(
            ServiceError::Forbidden("blocked".into()).status_class(),
            StatusClass::Forbidden
        );
    }

    #[test]
    fn test_db_error_mapping() {
        let err: ServiceError = DbError::NotFound {
            entity: "room".into(),
            id: "1".into(),
        }
        .into();
        assert_eq!(err.status_class(), StatusClass::NotFound);

        let err: ServiceError = DbError::Constraint("duplicate".into()).into();
        assert_eq!(err.status_class(), StatusClass::Conflict);

        let err: ServiceError = DbError::Connection("down".into()).into();
        assert_eq!(err.status_class(), StatusClass::Internal);
    }
}
