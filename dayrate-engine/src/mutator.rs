use std::sync::Arc;

use chrono::{DateTime, Utc};
use dayrate_core::{AccountId, TransactionKind, UserId, CURRENCY_SCALE};
use dayrate_ledger::{AccountBalance, BankStore, LedgerEntry, LedgerTx};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::events::{BalanceMutatedEvent, BankEvent, EventBus, TransferCompletedEvent};
use crate::{BankError, BankResult, Clock};

/// A signed balance change requested on behalf of a user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MutationRequest {
    pub user: UserId,
    pub amount: Decimal,
    pub kind: TransactionKind,
    pub description: String,
    pub counterpart_account: Option<AccountId>,
    pub counterpart_name: Option<String>,
}

impl MutationRequest {
    pub fn new(
        user: UserId,
        amount: Decimal,
        kind: TransactionKind,
        description: impl Into<String>,
    ) -> Self {
        Self {
            user,
            amount,
            kind,
            description: description.into(),
            counterpart_account: None,
            counterpart_name: None,
        }
    }

    /// Credit `amount`, which must be positive.
    pub fn deposit(user: UserId, amount: Decimal, description: impl Into<String>) -> Self {
        Self::new(user, amount, TransactionKind::Deposit, description)
    }

    /// Debit `amount`, given as the positive sum leaving the account.
    pub fn withdrawal(user: UserId, amount: Decimal, description: impl Into<String>) -> Self {
        Self::new(user, -amount, TransactionKind::Withdrawal, description)
    }

    pub fn with_counterpart(mut self, account: Option<AccountId>, name: Option<String>) -> Self {
        self.counterpart_account = account;
        self.counterpart_name = name;
        self
    }
}

/// Outcome of a committed mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MutationReceipt {
    pub entry: LedgerEntry,
    pub new_balance: Decimal,
}

/// Move `amount` from one account to another as a single atomic operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: Decimal,
    pub description: String,
}

impl TransferRequest {
    pub fn new(
        from: AccountId,
        to: AccountId,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Self {
        Self {
            from,
            to,
            amount,
            description: description.into(),
        }
    }
}

/// Both committed legs of a transfer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub debit: MutationReceipt,
    pub credit: MutationReceipt,
}

/// The single gateway through which balances change.
#[derive(Clone)]
pub struct BalanceMutator {
    store: Arc<dyn BankStore>,
    clock: Arc<dyn Clock>,
    events: Option<Arc<EventBus>>,
}

impl BalanceMutator {
    pub fn new(store: Arc<dyn BankStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Apply a signed change to the user's account and record it in the ledger.
    pub fn mutate(&self, request: &MutationRequest) -> BankResult<MutationReceipt> {
        validate_amount(request.amount)?;
        let now = self.clock.now();
        let mut tx = self.store.begin()?;
        let account = tx
            .account_for_user(&request.user)?
            .ok_or_else(|| BankError::AccountNotFound(format!("no account for user {}", request.user)))?;
        let receipt = Self::apply_in(tx.as_mut(), &account, request, now)?;
        tx.commit()?;

        info!(
            account = %account.account_id,
            kind = %request.kind,
            amount = %request.amount,
            balance = %receipt.new_balance,
            "balance mutated"
        );
        if let Some(events) = &self.events {
            events.publish(BankEvent::BalanceMutated(BalanceMutatedEvent {
                entry: receipt.entry.clone(),
                new_balance: receipt.new_balance,
            }));
        }
        Ok(receipt)
    }

    /// Debit the sender and credit the recipient in one unit of work.
    pub fn transfer(&self, request: &TransferRequest) -> BankResult<TransferReceipt> {
        if request.amount <= Decimal::ZERO {
            return Err(BankError::validation("transfer amount must be positive"));
        }
        validate_amount(request.amount)?;
        if request.from == request.to {
            return Err(BankError::validation(
                "cannot transfer between the same account",
            ));
        }
        let now = self.clock.now();
        let mut tx = self.store.begin()?;
        let sender = tx
            .account(&request.from)?
            .ok_or_else(|| BankError::AccountNotFound(request.from.to_string()))?;
        let recipient = tx
            .account(&request.to)?
            .ok_or_else(|| BankError::AccountNotFound(request.to.to_string()))?;

        let debit_request = MutationRequest::new(
            sender.user_id.clone(),
            -request.amount,
            TransactionKind::TransferOut,
            request.description.clone(),
        )
        .with_counterpart(
            Some(recipient.account_id.clone()),
            Some(recipient.user_id.to_string()),
        );
        let credit_request = MutationRequest::new(
            recipient.user_id.clone(),
            request.amount,
            TransactionKind::TransferIn,
            request.description.clone(),
        )
        .with_counterpart(
            Some(sender.account_id.clone()),
            Some(sender.user_id.to_string()),
        );

        let debit = Self::apply_in(tx.as_mut(), &sender, &debit_request, now)?;
        let credit = Self::apply_in(tx.as_mut(), &recipient, &credit_request, now)?;
        tx.commit()?;

        info!(
            from = %request.from,
            to = %request.to,
            amount = %request.amount,
            "transfer committed"
        );
        if let Some(events) = &self.events {
            events.publish(BankEvent::TransferCompleted(TransferCompletedEvent {
                debit: debit.entry.clone(),
                credit: credit.entry.clone(),
            }));
        }
        Ok(TransferReceipt { debit, credit })
    }

    /// Apply one mutation inside a unit of work owned by the caller.
    ///
    /// `account` must have been read through the same unit of work. Nothing is written
    /// when the mutation is rejected; committing stays with the caller.
    pub fn apply_in(
        tx: &mut dyn LedgerTx,
        account: &AccountBalance,
        request: &MutationRequest,
        at: DateTime<Utc>,
    ) -> BankResult<MutationReceipt> {
        validate_direction(request.kind, request.amount)?;
        let new_balance = account
            .balance
            .checked_add(request.amount)
            .ok_or_else(|| {
                BankError::validation(format!(
                    "balance of {} cannot absorb {}",
                    account.account_id, request.amount
                ))
            })?;
        if request.amount < Decimal::ZERO && new_balance < Decimal::ZERO {
            debug!(
                account = %account.account_id,
                balance = %account.balance,
                requested = %request.amount,
                "mutation rejected for insufficient funds"
            );
            return Err(BankError::InsufficientFunds {
                account: account.account_id.clone(),
                balance: account.balance,
                requested: request.amount.abs(),
            });
        }

        tx.set_balance(&account.account_id, new_balance, at)?;
        let entry = LedgerEntry::new(
            account.user_id.clone(),
            account.account_id.clone(),
            request.amount,
            request.kind,
            request.description.clone(),
        )
        .with_counterpart(
            request.counterpart_account.clone(),
            request.counterpart_name.clone(),
        )
        .at(at);
        let entry = tx.append_entry(entry)?;
        Ok(MutationReceipt { entry, new_balance })
    }
}

fn validate_amount(amount: Decimal) -> BankResult<()> {
    if amount.is_zero() {
        return Err(BankError::validation("amount must be non-zero"));
    }
    if amount.normalize().scale() > CURRENCY_SCALE {
        return Err(BankError::validation(format!(
            "amount {amount} has more than {CURRENCY_SCALE} decimal places"
        )));
    }
    Ok(())
}

fn validate_direction(kind: TransactionKind, amount: Decimal) -> BankResult<()> {
    let misdirected = match kind {
        TransactionKind::Adjustment => false,
        kind if kind.is_debit() => amount > Decimal::ZERO,
        _ => amount < Decimal::ZERO,
    };
    if misdirected {
        let expected = if kind.is_debit() { "a debit" } else { "a credit" };
        return Err(BankError::validation(format!(
            "{kind} of {amount} must be {expected}"
        )));
    }
    Ok(())
}
