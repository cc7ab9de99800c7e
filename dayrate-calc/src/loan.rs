use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};

fn default_loan_rate() -> Decimal {
    Decimal::new(14, 2)
}

fn default_min_principal() -> Decimal {
    Decimal::from(1_000)
}

fn default_max_principal() -> Decimal {
    Decimal::from(50_000)
}

fn default_min_term() -> u32 {
    6
}

fn default_max_term() -> u32 {
    60
}

/// Residual below which the closing balance is treated as fully repaid.
const CLOSING_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 4);

/// Product parameters for fixed-payment consumer loans.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct LoanTerms {
    #[serde(default = "default_loan_rate")]
    pub annual_rate: Decimal,
    #[serde(default = "default_min_principal")]
    pub min_principal: Decimal,
    #[serde(default = "default_max_principal")]
    pub max_principal: Decimal,
    #[serde(default = "default_min_term")]
    pub min_term_months: u32,
    #[serde(default = "default_max_term")]
    pub max_term_months: u32,
}

impl Default for LoanTerms {
    fn default() -> Self {
        Self {
            annual_rate: default_loan_rate(),
            min_principal: default_min_principal(),
            max_principal: default_max_principal(),
            min_term_months: default_min_term(),
            max_term_months: default_max_term(),
        }
    }
}

impl LoanTerms {
    pub fn with_rate(annual_rate: Decimal) -> Self {
        Self {
            annual_rate,
            ..Self::default()
        }
    }

    pub fn clamp_principal(&self, principal: Decimal) -> Decimal {
        let low = self.min_principal.min(self.max_principal);
        principal.max(low).min(self.max_principal.max(low))
    }

    pub fn clamp_term(&self, term_months: u32) -> u32 {
        let low = self.min_term_months.min(self.max_term_months).max(1);
        term_months.max(low).min(self.max_term_months.max(low))
    }

    pub fn monthly_rate(&self) -> Decimal {
        self.annual_rate / Decimal::from(12)
    }

    /// Fixed annuity payment for an already clamped principal and term.
    pub fn monthly_payment(&self, principal: Decimal, term_months: u32) -> Decimal {
        let n = Decimal::from(term_months.max(1));
        let rate = self.monthly_rate();
        if rate.is_zero() {
            return principal / n;
        }
        let growth = (Decimal::ONE + rate).powu(u64::from(term_months.max(1)));
        let denominator = growth - Decimal::ONE;
        if denominator.is_zero() {
            return principal / n;
        }
        principal * rate * growth / denominator
    }

    /// Build the month-by-month schedule. Out-of-range inputs are clamped.
    pub fn schedule(&self, principal: Decimal, term_months: u32) -> LoanCalculation {
        let principal = self.clamp_principal(principal);
        let term_months = self.clamp_term(term_months);
        let rate = self.monthly_rate();
        let payment = self.monthly_payment(principal, term_months);

        let mut remaining = principal;
        let mut schedule = Vec::with_capacity(term_months as usize);
        for month in 1..=term_months {
            let interest = remaining * rate;
            let principal_part = payment - interest;
            remaining -= principal_part;
            if month == term_months && remaining.abs() < CLOSING_TOLERANCE {
                remaining = Decimal::ZERO;
            }
            schedule.push(AmortizationRow {
                month,
                payment,
                principal: principal_part,
                interest,
                remaining_balance: remaining,
            });
        }

        let total_payment = payment * Decimal::from(term_months);
        LoanCalculation {
            principal,
            term_months,
            annual_rate: self.annual_rate,
            monthly_payment: payment,
            total_payment,
            total_interest: total_payment - principal,
            schedule,
        }
    }
}

/// One month of an amortization schedule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AmortizationRow {
    pub month: u32,
    pub payment: Decimal,
    pub principal: Decimal,
    pub interest: Decimal,
    pub remaining_balance: Decimal,
}

/// Derived loan figures; never persisted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LoanCalculation {
    pub principal: Decimal,
    pub term_months: u32,
    pub annual_rate: Decimal,
    pub monthly_payment: Decimal,
    pub total_payment: Decimal,
    pub total_interest: Decimal,
    pub schedule: Vec<AmortizationRow>,
}
