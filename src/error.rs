use crate::domain::account::{AccountId, Currency};
use crate::domain::transfer::{EntryId, TransferId};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("account {0} not found")]
    AccountNotFound(AccountId),
    #[error("entry {0} not found")]
    EntryNotFound(EntryId),
    #[error("transfer {0} not found")]
    TransferNotFound(TransferId),
    #[error("transaction conflict: {0}")]
    Conflict(String),
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("account [{account}] mismatch: {actual}, {expected}")]
    CurrencyMismatch {
        account: AccountId,
        expected: Currency,
        actual: Currency,
    },
    #[error("insufficient funds in account {account}: balance {balance}, requested {amount}")]
    InsufficientFunds {
        account: AccountId,
        balance: i64,
        amount: i64,
    },
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("transaction timed out after {0:?}")]
    Timeout(Duration),
    #[error("tx err: {cause}, rb err: {rollback}")]
    RollbackFailed {
        cause: Box<LedgerError>,
        rollback: Box<LedgerError>,
    },
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

impl LedgerError {
    /// True for every "referenced record does not exist" variant.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::AccountNotFound(_) | Self::EntryNotFound(_) | Self::TransferNotFound(_)
        )
    }

    /// True when the store gave up on a lock wait or detected a deadlock.
    /// Retrying the whole unit of work may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
