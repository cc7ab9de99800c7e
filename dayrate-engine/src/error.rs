use dayrate_core::AccountId;
use dayrate_ledger::{AccrualMarker, LedgerError};
use rust_decimal::Decimal;
use thiserror::Error;

/// Result alias for money-movement operations.
pub type BankResult<T> = Result<T, BankError>;

/// Every rejection leaves balances and the ledger untouched.
#[derive(Debug, Error)]
pub enum BankError {
    #[error("insufficient funds in {account}: balance {balance}, requested {requested}")]
    InsufficientFunds {
        account: AccountId,
        balance: Decimal,
        requested: Decimal,
    },
    #[error("interest already calculated for {}", .marker.calculation_date)]
    AlreadyCalculatedToday { marker: Box<AccrualMarker> },
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("account not found: {0}")]
    AccountNotFound(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("transient failure: {0}")]
    Transient(String),
}

impl BankError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Expected outcomes that should be reported as status rather than failure.
    pub fn is_benign(&self) -> bool {
        matches!(self, BankError::AlreadyCalculatedToday { .. })
    }

    /// Whether the caller may retry the same request by hand.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BankError::Transient(_))
    }
}

impl From<LedgerError> for BankError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::Conflict(message) => BankError::Conflict(message),
            other => BankError::Transient(other.to_string()),
        }
    }
}
