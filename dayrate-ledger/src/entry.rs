use chrono::{DateTime, Utc};
use dayrate_core::{AccountId, TransactionKind, TransactionStatus, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonical ledger record describing a single signed balance delta.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub sequence: u64,
    pub user_id: UserId,
    pub account_id: AccountId,
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub counterpart_account: Option<AccountId>,
    pub counterpart_name: Option<String>,
    pub description: String,
    pub status: TransactionStatus,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// Creates a completed entry with a zero sequence number; storage assigns the sequence.
    pub fn new(
        user_id: UserId,
        account_id: AccountId,
        amount: Decimal,
        kind: TransactionKind,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sequence: 0,
            user_id,
            account_id,
            amount,
            kind,
            counterpart_account: None,
            counterpart_name: None,
            description: description.into(),
            status: TransactionStatus::Completed,
            created_at: Utc::now(),
        }
    }

    pub fn with_counterpart(
        mut self,
        account: Option<AccountId>,
        name: Option<String>,
    ) -> Self {
        self.counterpart_account = account;
        self.counterpart_name = name;
        self
    }

    pub fn with_status(mut self, status: TransactionStatus) -> Self {
        self.status = status;
        self
    }

    pub fn at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub(crate) fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }
}
