use chrono::{DateTime, Utc};
use dayrate_core::{AccountId, ContractStatus, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A signed term deposit. Only exists once its principal has been debited.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TermDepositContract {
    pub id: Uuid,
    pub user_id: UserId,
    pub account_id: AccountId,
    pub principal: Decimal,
    pub term_months: u32,
    /// Quoted rate in percent.
    pub interest_rate: Decimal,
    pub total_return: Decimal,
    pub maturity_date: DateTime<Utc>,
    pub status: ContractStatus,
    pub created_at: DateTime<Utc>,
}
