use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};

/// Largest principal a quote is computed for; larger amounts are clamped to it.
///
/// At this size every offered term and any rate accepted by configuration stays far
/// inside `Decimal`'s range.
pub const MAX_DEPOSIT_PRINCIPAL: Decimal =
    Decimal::from_parts(0xA4C6_8000, 0x0003_8D7E, 0, false, 0);

fn default_flat_term() -> u32 {
    72
}

fn default_flat_total_rate() -> Decimal {
    Decimal::ONE
}

fn default_min_term() -> u32 {
    12
}

fn default_tiers() -> Vec<DepositTier> {
    vec![
        DepositTier::below(Decimal::from(10_000), Decimal::new(8, 2)),
        DepositTier::below(Decimal::from(100_000), Decimal::new(10, 2)),
        DepositTier::open(Decimal::new(12, 2)),
    ]
}

/// Annual rate applied to principals strictly below `below` (or any principal when unbounded).
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct DepositTier {
    #[serde(default)]
    pub below: Option<Decimal>,
    pub annual_rate: Decimal,
}

impl DepositTier {
    pub fn below(threshold: Decimal, annual_rate: Decimal) -> Self {
        Self {
            below: Some(threshold),
            annual_rate,
        }
    }

    pub fn open(annual_rate: Decimal) -> Self {
        Self {
            below: None,
            annual_rate,
        }
    }

    fn matches(&self, amount: Decimal) -> bool {
        self.below.map_or(true, |limit| amount < limit)
    }
}

/// How the quoted return accumulates over the term.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Compounding {
    Simple,
    Compound,
}

/// Term-deposit product: a flat long-term offer plus an amount-tiered annual offer.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct DepositSchedule {
    /// Term that earns `flat_total_rate` over its whole life, independent of amount.
    #[serde(default = "default_flat_term")]
    pub flat_term_months: u32,
    #[serde(default = "default_flat_total_rate")]
    pub flat_total_rate: Decimal,
    #[serde(default = "default_min_term")]
    pub min_term_months: u32,
    /// Evaluated in order; the first matching tier wins.
    #[serde(default = "default_tiers")]
    pub tiers: Vec<DepositTier>,
}

impl Default for DepositSchedule {
    fn default() -> Self {
        Self {
            flat_term_months: default_flat_term(),
            flat_total_rate: default_flat_total_rate(),
            min_term_months: default_min_term(),
            tiers: default_tiers(),
        }
    }
}

impl DepositSchedule {
    /// Annual rate (fraction) for the tier the amount falls into.
    pub fn tier_rate(&self, amount: Decimal) -> Decimal {
        self.tiers
            .iter()
            .find(|tier| tier.matches(amount))
            .or_else(|| self.tiers.last())
            .map(|tier| tier.annual_rate)
            .unwrap_or(Decimal::ZERO)
    }

    pub fn clamp_term(&self, term_months: u32) -> u32 {
        let high = self.flat_term_months.max(1);
        let low = self.min_term_months.clamp(1, high);
        term_months.clamp(low, high)
    }

    /// Quote the return on `principal` locked for `term_months`.
    pub fn quote(&self, principal: Decimal, term_months: u32) -> DepositQuote {
        let principal = principal.clamp(Decimal::ZERO, MAX_DEPOSIT_PRINCIPAL);
        let term_months = self.clamp_term(term_months);
        let years = Decimal::from(term_months) / Decimal::from(12);

        let (rate, total_return, compounding) = if term_months == self.flat_term_months {
            (
                self.flat_total_rate,
                principal * (Decimal::ONE + self.flat_total_rate),
                Compounding::Simple,
            )
        } else {
            let rate = self.tier_rate(principal);
            let growth = if term_months % 12 == 0 {
                (Decimal::ONE + rate).powu(u64::from(term_months / 12))
            } else {
                (Decimal::ONE + rate).powd(years)
            };
            (rate, principal * growth, Compounding::Compound)
        };

        let total_profit = total_return - principal;
        let yearly_profit = total_profit / years;
        DepositQuote {
            principal,
            term_months,
            rate: rate * Decimal::ONE_HUNDRED,
            total_return,
            total_profit,
            yearly_profit,
            monthly_profit: yearly_profit / Decimal::from(12),
            compounding,
        }
    }
}

/// Projected outcome of a term deposit. `rate` is expressed in percent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DepositQuote {
    pub principal: Decimal,
    pub term_months: u32,
    pub rate: Decimal,
    pub total_return: Decimal,
    pub total_profit: Decimal,
    pub yearly_profit: Decimal,
    pub monthly_profit: Decimal,
    pub compounding: Compounding,
}
