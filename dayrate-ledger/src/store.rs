use chrono::{DateTime, NaiveDate, Utc};
use dayrate_core::{AccountId, TransactionStatus, UserId};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    AccountBalance, AccrualMarker, LedgerEntry, LedgerQuery, LedgerResult, NewAccount,
    TermDepositContract,
};

/// A serialized unit of work over the balance, ledger, marker and contract tables.
///
/// Writes become visible to other readers only after [`LedgerTx::commit`]. Dropping an
/// uncommitted unit of work discards every write made through it.
pub trait LedgerTx {
    fn account(&mut self, id: &AccountId) -> LedgerResult<Option<AccountBalance>>;

    fn account_for_user(&mut self, user: &UserId) -> LedgerResult<Option<AccountBalance>>;

    fn accounts(&mut self) -> LedgerResult<Vec<AccountBalance>>;

    /// Accounts whose balance is strictly positive, ordered by account id.
    fn funded_accounts(&mut self) -> LedgerResult<Vec<AccountBalance>>;

    /// Sum of the entry amounts recorded against the account, as seen by this unit of work.
    fn ledger_sum(&mut self, account: &AccountId) -> LedgerResult<Decimal>;

    fn set_balance(
        &mut self,
        account: &AccountId,
        balance: Decimal,
        at: DateTime<Utc>,
    ) -> LedgerResult<()>;

    /// Persist an entry and return it with its assigned sequence.
    fn append_entry(&mut self, entry: LedgerEntry) -> LedgerResult<LedgerEntry>;

    fn marker(&mut self, date: NaiveDate) -> LedgerResult<Option<AccrualMarker>>;

    /// Insert-if-absent. Returns `false` when a marker for the date already exists.
    fn insert_marker(&mut self, marker: &AccrualMarker) -> LedgerResult<bool>;

    fn insert_contract(&mut self, contract: &TermDepositContract) -> LedgerResult<()>;

    fn commit(self: Box<Self>) -> LedgerResult<()>;
}

/// Abstraction over durable bank storage engines.
pub trait BankStore: Send + Sync {
    /// Open a write unit of work. Units of work are serialized against each other.
    fn begin(&self) -> LedgerResult<Box<dyn LedgerTx + '_>>;

    /// Provision a zero-balance account. Fails with `Conflict` if the id or user is taken.
    fn open_account(&self, account: NewAccount) -> LedgerResult<AccountBalance>;

    fn account(&self, id: &AccountId) -> LedgerResult<Option<AccountBalance>>;

    fn account_for_user(&self, user: &UserId) -> LedgerResult<Option<AccountBalance>>;

    fn accounts(&self) -> LedgerResult<Vec<AccountBalance>>;

    fn entries(&self, query: LedgerQuery) -> LedgerResult<Vec<LedgerEntry>>;

    /// Sum of all entry amounts recorded against the account.
    fn ledger_sum(&self, account: &AccountId) -> LedgerResult<Decimal> {
        Ok(self
            .entries(LedgerQuery::for_account(account.clone()).ascending())?
            .iter()
            .map(|entry| entry.amount)
            .sum())
    }

    fn marker(&self, date: NaiveDate) -> LedgerResult<Option<AccrualMarker>>;

    fn contracts(&self, user: Option<&UserId>) -> LedgerResult<Vec<TermDepositContract>>;

    /// Status is the only mutable attribute of a persisted entry.
    fn update_entry_status(&self, id: Uuid, status: TransactionStatus) -> LedgerResult<()>;
}
