use common::storage::StorageError;
use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

use crate::validate::ValidationError;

/// Errors surfaced by the store, the transaction wrapper and relocation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A file, entity, policy or owner id did not resolve.
    #[error("{0} not found")]
    NotFound(String),

    /// A unique index rejected the write; callers may rename and retry.
    #[error("Constraint violation: {0}")]
    Conflict(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Database error: {0}")]
    Database(DbErr),

    #[error("Storage backend error: {0}")]
    Storage(#[from] StorageError),

    /// Reference counts and attachments disagree.
    #[error("Accounting inconsistency: {0}")]
    Inconsistent(String),

    #[error("Operation cancelled")]
    Cancelled,
}

/// Coarse classification callers map onto their protocol's status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    ConstraintViolation,
    ValidationFailed,
    BackendIo,
    AccountingInconsistency,
    Cancelled,
}

impl ErrorKind {
    /// HTTP-equivalent status for protocol handlers.
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::NotFound => 404,
            ErrorKind::ConstraintViolation => 409,
            ErrorKind::ValidationFailed => 422,
            ErrorKind::Cancelled => 499,
            ErrorKind::BackendIo | ErrorKind::AccountingInconsistency => 500,
        }
    }
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::Conflict(_) => ErrorKind::ConstraintViolation,
            StoreError::Validation(_) => ErrorKind::ValidationFailed,
            StoreError::Database(_) | StoreError::Storage(_) => ErrorKind::BackendIo,
            StoreError::Inconsistent(_) => ErrorKind::AccountingInconsistency,
            StoreError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub(crate) fn not_found(what: &str, id: impl std::fmt::Display) -> Self {
        StoreError::NotFound(format!("{what} {id}"))
    }
}

impl From<DbErr> for StoreError {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) => StoreError::Conflict(detail),
            _ => StoreError::Database(err),
        }
    }
}
