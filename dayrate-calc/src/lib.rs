//! Stateless calculators. Every rate constant lives in an explicit config struct so
//! callers can evaluate any rate regime deterministically.

mod deposit;
mod loan;
mod savings;

pub use deposit::{
    Compounding, DepositQuote, DepositSchedule, DepositTier, MAX_DEPOSIT_PRINCIPAL,
};
pub use loan::{AmortizationRow, LoanCalculation, LoanTerms};
pub use savings::{InterestPreview, SavingsRate};
