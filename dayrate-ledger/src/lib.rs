//! Persisted records and storage backends for balances, ledger entries, accrual
//! markers and term-deposit contracts.

mod account;
mod contract;
mod entry;
mod error;
mod marker;
mod memory;
mod query;
mod sqlite;
mod store;

pub use account::{AccountBalance, NewAccount};
pub use contract::TermDepositContract;
pub use entry::LedgerEntry;
pub use error::{LedgerError, LedgerResult};
pub use marker::AccrualMarker;
pub use memory::MemoryBankStore;
pub use query::LedgerQuery;
pub use sqlite::SqliteBankStore;
pub use store::{BankStore, LedgerTx};
