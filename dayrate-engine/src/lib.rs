//! The money-movement core: the balance mutator, the daily interest batch and
//! term-deposit signing, plus an async facade for callers.

mod accrual;
mod audit;
mod clock;
mod deposit;
mod error;
pub mod events;
mod mutator;
mod roles;
mod service;

pub use accrual::{AccrualOutcome, AccrualPosting, AccrualStatus, DailyAccrualJob};
pub use audit::{audit_ledger, LedgerAudit, LedgerDiscrepancy};
pub use clock::{Clock, FixedClock, SystemClock};
pub use deposit::{SignedContract, TermDepositDesk};
pub use error::{BankError, BankResult};
pub use events::{BankEvent, EventBus};
pub use mutator::{BalanceMutator, MutationReceipt, MutationRequest, TransferReceipt, TransferRequest};
pub use roles::{RoleDirectory, StaticRoles};
pub use service::{BankService, BankServiceBuilder};
