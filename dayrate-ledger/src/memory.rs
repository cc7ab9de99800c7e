use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use dayrate_core::{AccountId, TransactionStatus, UserId};
use parking_lot::{Mutex, MutexGuard};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    AccountBalance, AccrualMarker, BankStore, LedgerEntry, LedgerError, LedgerQuery,
    LedgerResult, LedgerTx, NewAccount, TermDepositContract,
};

#[derive(Clone, Debug, Default)]
struct MemoryState {
    accounts: BTreeMap<AccountId, AccountBalance>,
    entries: Vec<LedgerEntry>,
    markers: BTreeMap<NaiveDate, AccrualMarker>,
    contracts: Vec<TermDepositContract>,
}

impl MemoryState {
    fn account_for_user(&self, user: &UserId) -> Option<&AccountBalance> {
        self.accounts.values().find(|account| &account.user_id == user)
    }
}

/// In-process store used by tests and ephemeral runs.
///
/// A unit of work holds the store lock for its whole lifetime and edits a private copy
/// of the state that replaces the shared one on commit.
#[derive(Debug, Default)]
pub struct MemoryBankStore {
    state: Mutex<MemoryState>,
}

impl MemoryBankStore {
    pub fn new() -> Self {
        Self::default()
    }
}

struct MemoryTx<'a> {
    guard: MutexGuard<'a, MemoryState>,
    work: MemoryState,
}

impl LedgerTx for MemoryTx<'_> {
    fn account(&mut self, id: &AccountId) -> LedgerResult<Option<AccountBalance>> {
        Ok(self.work.accounts.get(id).cloned())
    }

    fn account_for_user(&mut self, user: &UserId) -> LedgerResult<Option<AccountBalance>> {
        Ok(self.work.account_for_user(user).cloned())
    }

    fn accounts(&mut self) -> LedgerResult<Vec<AccountBalance>> {
        Ok(self.work.accounts.values().cloned().collect())
    }

    fn ledger_sum(&mut self, account: &AccountId) -> LedgerResult<Decimal> {
        Ok(self
            .work
            .entries
            .iter()
            .filter(|entry| &entry.account_id == account)
            .map(|entry| entry.amount)
            .sum())
    }

    fn funded_accounts(&mut self) -> LedgerResult<Vec<AccountBalance>> {
        Ok(self
            .work
            .accounts
            .values()
            .filter(|account| account.balance > Decimal::ZERO)
            .cloned()
            .collect())
    }

    fn set_balance(
        &mut self,
        account: &AccountId,
        balance: Decimal,
        at: DateTime<Utc>,
    ) -> LedgerResult<()> {
        let record = self
            .work
            .accounts
            .get_mut(account)
            .ok_or_else(|| LedgerError::InvalidState(format!("unknown account {account}")))?;
        record.balance = balance;
        record.updated_at = at;
        Ok(())
    }

    fn append_entry(&mut self, entry: LedgerEntry) -> LedgerResult<LedgerEntry> {
        let sequence = self.work.entries.last().map_or(0, |last| last.sequence) + 1;
        let entry = entry.with_sequence(sequence);
        self.work.entries.push(entry.clone());
        Ok(entry)
    }

    fn marker(&mut self, date: NaiveDate) -> LedgerResult<Option<AccrualMarker>> {
        Ok(self.work.markers.get(&date).cloned())
    }

    fn insert_marker(&mut self, marker: &AccrualMarker) -> LedgerResult<bool> {
        if self.work.markers.contains_key(&marker.calculation_date) {
            return Ok(false);
        }
        self.work
            .markers
            .insert(marker.calculation_date, marker.clone());
        Ok(true)
    }

    fn insert_contract(&mut self, contract: &TermDepositContract) -> LedgerResult<()> {
        if self.work.contracts.iter().any(|c| c.id == contract.id) {
            return Err(LedgerError::Conflict(format!(
                "contract {} already exists",
                contract.id
            )));
        }
        self.work.contracts.push(contract.clone());
        Ok(())
    }

    fn commit(self: Box<Self>) -> LedgerResult<()> {
        let MemoryTx { mut guard, work } = *self;
        *guard = work;
        Ok(())
    }
}

impl BankStore for MemoryBankStore {
    fn begin(&self) -> LedgerResult<Box<dyn LedgerTx + '_>> {
        let guard = self.state.lock();
        let work = guard.clone();
        Ok(Box::new(MemoryTx { guard, work }))
    }

    fn open_account(&self, account: NewAccount) -> LedgerResult<AccountBalance> {
        let mut state = self.state.lock();
        if state.accounts.contains_key(&account.account_id) {
            return Err(LedgerError::Conflict(format!(
                "account {} already exists",
                account.account_id
            )));
        }
        if state.account_for_user(&account.user_id).is_some() {
            return Err(LedgerError::Conflict(format!(
                "user {} already owns an account",
                account.user_id
            )));
        }
        let balance = account.into_balance(Utc::now());
        state
            .accounts
            .insert(balance.account_id.clone(), balance.clone());
        Ok(balance)
    }

    fn account(&self, id: &AccountId) -> LedgerResult<Option<AccountBalance>> {
        Ok(self.state.lock().accounts.get(id).cloned())
    }

    fn account_for_user(&self, user: &UserId) -> LedgerResult<Option<AccountBalance>> {
        Ok(self.state.lock().account_for_user(user).cloned())
    }

    fn accounts(&self) -> LedgerResult<Vec<AccountBalance>> {
        Ok(self.state.lock().accounts.values().cloned().collect())
    }

    fn entries(&self, query: LedgerQuery) -> LedgerResult<Vec<LedgerEntry>> {
        let state = self.state.lock();
        let mut matched: Vec<LedgerEntry> = state
            .entries
            .iter()
            .filter(|entry| query.matches(entry))
            .cloned()
            .collect();
        if !query.ascending {
            matched.reverse();
        }
        if let Some(limit) = query.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    fn marker(&self, date: NaiveDate) -> LedgerResult<Option<AccrualMarker>> {
        Ok(self.state.lock().markers.get(&date).cloned())
    }

    fn contracts(&self, user: Option<&UserId>) -> LedgerResult<Vec<TermDepositContract>> {
        Ok(self
            .state
            .lock()
            .contracts
            .iter()
            .filter(|contract| user.map_or(true, |id| &contract.user_id == id))
            .cloned()
            .collect())
    }

    fn update_entry_status(&self, id: Uuid, status: TransactionStatus) -> LedgerResult<()> {
        let mut state = self.state.lock();
        let entry = state
            .entries
            .iter_mut()
            .find(|entry| entry.id == id)
            .ok_or_else(|| LedgerError::InvalidState(format!("unknown ledger entry {id}")))?;
        entry.status = status;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dayrate_core::TransactionKind;
    use rust_decimal_macros::dec;

    #[test]
    fn uncommitted_work_is_discarded() {
        let store = MemoryBankStore::new();
        store.open_account(NewAccount::new("acc-1", "user-1")).unwrap();
        {
            let mut tx = store.begin().unwrap();
            tx.set_balance(&AccountId::from("acc-1"), dec!(50), Utc::now())
                .unwrap();
        }
        let account = store.account(&AccountId::from("acc-1")).unwrap().unwrap();
        assert_eq!(account.balance, Decimal::ZERO);
    }

    #[test]
    fn committed_work_is_visible() {
        let store = MemoryBankStore::new();
        store.open_account(NewAccount::new("acc-1", "user-1")).unwrap();
        let mut tx = store.begin().unwrap();
        tx.set_balance(&AccountId::from("acc-1"), dec!(50), Utc::now())
            .unwrap();
        let entry = tx
            .append_entry(LedgerEntry::new(
                UserId::from("user-1"),
                AccountId::from("acc-1"),
                dec!(50),
                TransactionKind::Deposit,
                "top-up",
            ))
            .unwrap();
        tx.commit().unwrap();
        assert_eq!(entry.sequence, 1);
        assert_eq!(store.ledger_sum(&AccountId::from("acc-1")).unwrap(), dec!(50));
    }

    #[test]
    fn status_is_the_only_field_that_changes() {
        let store = MemoryBankStore::new();
        store.open_account(NewAccount::new("acc-1", "user-1")).unwrap();
        let mut tx = store.begin().unwrap();
        let entry = tx
            .append_entry(LedgerEntry::new(
                UserId::from("user-1"),
                AccountId::from("acc-1"),
                dec!(20),
                TransactionKind::Deposit,
                "card",
            ))
            .unwrap();
        tx.commit().unwrap();

        store
            .update_entry_status(entry.id, TransactionStatus::Failed)
            .unwrap();
        let stored = store.entries(LedgerQuery::default()).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].status, TransactionStatus::Failed);
        assert_eq!(
            LedgerEntry {
                status: entry.status,
                ..stored[0].clone()
            },
            entry
        );

        let err = store
            .update_entry_status(Uuid::new_v4(), TransactionStatus::Completed)
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidState(_)));
    }

    #[test]
    fn one_account_per_user() {
        let store = MemoryBankStore::new();
        store.open_account(NewAccount::new("acc-1", "user-1")).unwrap();
        let err = store
            .open_account(NewAccount::new("acc-2", "user-1"))
            .unwrap_err();
        assert!(matches!(err, LedgerError::Conflict(_)));
    }
}
