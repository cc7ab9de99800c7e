use chrono::{DateTime, Utc};
use dayrate_core::{AccountId, Currency, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Current balance of an account. Derived state: always equals the sum of the
/// account's ledger entries.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccountBalance {
    pub account_id: AccountId,
    pub user_id: UserId,
    pub balance: Decimal,
    pub currency: Currency,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for provisioning an account. New accounts start at zero.
#[derive(Clone, Debug)]
pub struct NewAccount {
    pub account_id: AccountId,
    pub user_id: UserId,
    pub currency: Currency,
}

impl NewAccount {
    pub fn new(account_id: impl Into<AccountId>, user_id: impl Into<UserId>) -> Self {
        Self {
            account_id: account_id.into(),
            user_id: user_id.into(),
            currency: Currency::default(),
        }
    }

    pub fn with_currency(mut self, currency: Currency) -> Self {
        self.currency = currency;
        self
    }

    pub(crate) fn into_balance(self, at: DateTime<Utc>) -> AccountBalance {
        AccountBalance {
            account_id: self.account_id,
            user_id: self.user_id,
            balance: Decimal::ZERO,
            currency: self.currency,
            updated_at: at,
        }
    }
}
