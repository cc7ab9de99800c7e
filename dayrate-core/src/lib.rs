//! Identifiers, enums and money helpers shared across the Dayrate crates.

mod ids;
mod kinds;
mod money;

pub use ids::{AccountId, Currency, UserId};
pub use kinds::{AccrualInitiator, ContractStatus, ParseKindError, TransactionKind, TransactionStatus};
pub use money::{round_currency, CURRENCY_SCALE};
