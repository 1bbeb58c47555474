use thiserror::Error;

use crate::domain::{IntegrityError, LedgerError, ValidationError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("Group already exists: {0}")]
    GroupAlreadyExists(String),

    #[error("Member not found: {0}")]
    MemberNotFound(String),

    #[error("Member already exists in group: {0}")]
    MemberAlreadyExists(String),

    #[error("Bill not found: {0}")]
    BillNotFound(String),

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Ledger integrity violated: {0}")]
    Integrity(#[from] IntegrityError),

    #[error("Database error: {0}")]
    Storage(#[from] anyhow::Error),
}

impl AppError {
    /// Errors caused by the request itself (the 4xx family). Everything else
    /// means the ledger or its store is in a bad state.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, AppError::Integrity(_) | AppError::Storage(_))
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Validation(e) => AppError::Validation(e),
            LedgerError::BillNotFound(id) => AppError::BillNotFound(id.to_string()),
            LedgerError::MemberNotFound(id) => AppError::MemberNotFound(id.to_string()),
            LedgerError::MemberAlreadyExists(name) => AppError::MemberAlreadyExists(name),
        }
    }
}
