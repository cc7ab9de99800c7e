use std::sync::Arc;

use chrono::Months;
use dayrate_calc::{DepositQuote, DepositSchedule};
use dayrate_core::{round_currency, ContractStatus, TransactionKind, UserId};
use dayrate_ledger::{BankStore, TermDepositContract};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::events::{BankEvent, ContractSignedEvent, EventBus};
use crate::{BalanceMutator, BankError, BankResult, Clock, MutationReceipt, MutationRequest};

/// A contract together with the debit that funded it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignedContract {
    pub contract: TermDepositContract,
    pub funding: MutationReceipt,
    pub quote: DepositQuote,
}

/// Quotes and signs term deposits.
#[derive(Clone)]
pub struct TermDepositDesk {
    store: Arc<dyn BankStore>,
    clock: Arc<dyn Clock>,
    schedule: DepositSchedule,
    events: Option<Arc<EventBus>>,
}

impl TermDepositDesk {
    pub fn new(store: Arc<dyn BankStore>, clock: Arc<dyn Clock>, schedule: DepositSchedule) -> Self {
        Self {
            store,
            clock,
            schedule,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn quote(&self, principal: Decimal, term_months: u32) -> DepositQuote {
        self.schedule.quote(principal, term_months)
    }

    /// Debit the principal and create an active contract, or do neither.
    pub fn sign(
        &self,
        user: &UserId,
        principal: Decimal,
        term_months: u32,
    ) -> BankResult<SignedContract> {
        if principal <= Decimal::ZERO {
            return Err(BankError::validation("deposit principal must be positive"));
        }
        if round_currency(principal) != principal {
            return Err(BankError::validation(format!(
                "deposit principal {principal} has sub-cent precision"
            )));
        }
        let quote = self.schedule.quote(principal, term_months);
        if quote.principal != principal {
            return Err(BankError::validation(format!(
                "deposit principal {principal} exceeds the maximum of {}",
                quote.principal
            )));
        }
        if quote.term_months != term_months {
            return Err(BankError::validation(format!(
                "term of {term_months} months is not offered; nearest is {}",
                quote.term_months
            )));
        }
        let now = self.clock.now();
        let maturity_date = now
            .checked_add_months(Months::new(term_months))
            .ok_or_else(|| BankError::validation("maturity date out of range"))?;

        let mut tx = self.store.begin()?;
        let account = tx
            .account_for_user(user)?
            .ok_or_else(|| BankError::AccountNotFound(format!("no account for user {user}")))?;
        let request = MutationRequest::new(
            user.clone(),
            -principal,
            TransactionKind::TermDeposit,
            format!("Term deposit, {term_months} months at {}%", quote.rate.normalize()),
        );
        let funding = BalanceMutator::apply_in(tx.as_mut(), &account, &request, now)?;
        let contract = TermDepositContract {
            id: Uuid::new_v4(),
            user_id: user.clone(),
            account_id: account.account_id.clone(),
            principal,
            term_months,
            interest_rate: quote.rate,
            total_return: round_currency(quote.total_return),
            maturity_date,
            status: ContractStatus::Active,
            created_at: now,
        };
        tx.insert_contract(&contract)?;
        tx.commit()?;

        info!(
            contract = %contract.id,
            account = %contract.account_id,
            principal = %principal,
            term_months,
            "term deposit signed"
        );
        if let Some(events) = &self.events {
            events.publish(BankEvent::ContractSigned(ContractSignedEvent {
                contract: contract.clone(),
            }));
        }
        Ok(SignedContract {
            contract,
            funding,
            quote,
        })
    }

    pub fn contracts(&self, user: Option<&UserId>) -> BankResult<Vec<TermDepositContract>> {
        Ok(self.store.contracts(user)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FixedClock;
    use chrono::{TimeZone, Utc};
    use dayrate_core::AccountId;
    use dayrate_ledger::{LedgerQuery, MemoryBankStore, NewAccount};
    use rust_decimal_macros::dec;

    fn desk_with_balance(balance: Decimal) -> (Arc<MemoryBankStore>, TermDepositDesk) {
        let store = Arc::new(MemoryBankStore::new());
        let clock = Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap(),
        ));
        store.open_account(NewAccount::new("acc-1", "u1")).unwrap();
        if balance > Decimal::ZERO {
            BalanceMutator::new(store.clone(), clock.clone())
                .mutate(&MutationRequest::deposit(UserId::from("u1"), balance, "seed"))
                .unwrap();
        }
        let desk = TermDepositDesk::new(store.clone(), clock, DepositSchedule::default());
        (store, desk)
    }

    #[test]
    fn signing_debits_principal_and_creates_contract() {
        let (store, desk) = desk_with_balance(dec!(60000));
        let signed = desk.sign(&UserId::from("u1"), dec!(50000), 12).unwrap();
        assert_eq!(signed.funding.new_balance, dec!(10000));
        assert_eq!(signed.funding.entry.kind, TransactionKind::TermDeposit);
        assert_eq!(signed.contract.interest_rate, dec!(10));
        assert_eq!(signed.contract.total_return, dec!(55000));
        assert_eq!(signed.contract.status, ContractStatus::Active);
        assert_eq!(
            signed.contract.maturity_date,
            Utc.with_ymd_and_hms(2025, 1, 31, 12, 0, 0).unwrap()
        );
        assert_eq!(desk.contracts(Some(&UserId::from("u1"))).unwrap().len(), 1);
        assert_eq!(
            store.ledger_sum(&AccountId::from("acc-1")).unwrap(),
            dec!(10000)
        );
    }

    #[test]
    fn insufficient_funds_creates_nothing() {
        let (store, desk) = desk_with_balance(dec!(100));
        let err = desk.sign(&UserId::from("u1"), dec!(5000), 12).unwrap_err();
        assert!(matches!(err, BankError::InsufficientFunds { .. }));
        assert!(desk.contracts(None).unwrap().is_empty());
        assert_eq!(store.entries(LedgerQuery::default()).unwrap().len(), 1);
    }

    #[test]
    fn unsupported_terms_are_rejected() {
        let (_, desk) = desk_with_balance(dec!(1000));
        let err = desk.sign(&UserId::from("u1"), dec!(500), 3).unwrap_err();
        assert!(matches!(err, BankError::Validation(_)));
        let err = desk.sign(&UserId::from("u1"), dec!(-5), 12).unwrap_err();
        assert!(matches!(err, BankError::Validation(_)));
    }

    #[test]
    fn principal_above_quote_ceiling_is_rejected() {
        let (store, desk) = desk_with_balance(dec!(1000));
        let too_large = dayrate_calc::MAX_DEPOSIT_PRINCIPAL + dec!(1);
        let err = desk.sign(&UserId::from("u1"), too_large, 72).unwrap_err();
        assert!(matches!(err, BankError::Validation(_)));
        assert!(desk.contracts(None).unwrap().is_empty());
        assert_eq!(store.entries(LedgerQuery::default()).unwrap().len(), 1);
    }
}
