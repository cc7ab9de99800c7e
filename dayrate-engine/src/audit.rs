use dayrate_core::AccountId;
use dayrate_ledger::BankStore;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::BankResult;

/// An account whose stored balance disagrees with its ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LedgerDiscrepancy {
    pub account_id: AccountId,
    pub balance: Decimal,
    pub ledger_sum: Decimal,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerAudit {
    pub accounts_checked: usize,
    pub discrepancies: Vec<LedgerDiscrepancy>,
}

impl LedgerAudit {
    pub fn is_consistent(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

/// Check `balance == sum(ledger amounts)` for every account.
///
/// Balances and entries are read through one unit of work, which is dropped without
/// committing, so concurrent money movement cannot show up as a discrepancy.
pub fn audit_ledger(store: &dyn BankStore) -> BankResult<LedgerAudit> {
    let mut audit = LedgerAudit::default();
    let mut tx = store.begin()?;
    for account in tx.accounts()? {
        let ledger_sum = tx.ledger_sum(&account.account_id)?;
        audit.accounts_checked += 1;
        if ledger_sum != account.balance {
            warn!(
                account = %account.account_id,
                balance = %account.balance,
                ledger_sum = %ledger_sum,
                "balance diverges from ledger"
            );
            audit.discrepancies.push(LedgerDiscrepancy {
                account_id: account.account_id,
                balance: account.balance,
                ledger_sum,
            });
        }
    }
    Ok(audit)
}
