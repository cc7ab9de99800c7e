use dayrate_core::round_currency;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

fn default_annual_rate() -> Decimal {
    Decimal::new(2, 2)
}

fn default_days_in_year() -> u32 {
    365
}

fn default_days_in_month() -> u32 {
    30
}

/// Savings-account rate model shared by the accrual job and the preview.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct SavingsRate {
    /// Annual rate as a fraction (`0.02` is 2%).
    #[serde(default = "default_annual_rate")]
    pub annual_rate: Decimal,
    #[serde(default = "default_days_in_year")]
    pub days_in_year: u32,
    /// Day count used to project a "monthly" figure from the daily interest.
    #[serde(default = "default_days_in_month")]
    pub days_in_month: u32,
}

impl SavingsRate {
    pub fn new(annual_rate: Decimal) -> Self {
        Self {
            annual_rate,
            ..Self::default()
        }
    }

    pub fn daily_rate(&self) -> Decimal {
        self.annual_rate / Decimal::from(self.days_in_year.max(1))
    }

    /// Unrounded interest earned by `balance` over one day. Non-positive balances earn nothing.
    pub fn daily_interest(&self, balance: Decimal) -> Decimal {
        if balance <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        balance * self.daily_rate()
    }

    /// Amount actually posted to the ledger for one day of interest.
    pub fn daily_accrual(&self, balance: Decimal) -> Decimal {
        round_currency(self.daily_interest(balance))
    }

    /// Display-only projection of the interest a balance earns.
    pub fn preview(&self, balance: Decimal) -> InterestPreview {
        let daily_interest = self.daily_interest(balance);
        let yearly_interest = if balance > Decimal::ZERO {
            balance * self.annual_rate
        } else {
            Decimal::ZERO
        };
        InterestPreview {
            daily_interest,
            daily_interest_rounded: round_currency(daily_interest),
            monthly_interest: daily_interest * Decimal::from(self.days_in_month),
            yearly_interest,
            daily_rate_percent: self.daily_rate() * Decimal::ONE_HUNDRED,
        }
    }
}

impl Default for SavingsRate {
    fn default() -> Self {
        Self {
            annual_rate: default_annual_rate(),
            days_in_year: default_days_in_year(),
            days_in_month: default_days_in_month(),
        }
    }
}

/// Unrounded interest estimates for a balance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InterestPreview {
    pub daily_interest: Decimal,
    pub daily_interest_rounded: Decimal,
    pub monthly_interest: Decimal,
    pub yearly_interest: Decimal,
    pub daily_rate_percent: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn preview_matches_product_rate() {
        let preview = SavingsRate::default().preview(dec!(10000));
        assert_eq!(preview.daily_interest.round_dp(4), dec!(0.5479));
        assert_eq!(preview.daily_interest_rounded, dec!(0.55));
        assert_eq!(preview.monthly_interest.round_dp(2), dec!(16.44));
        assert_eq!(preview.yearly_interest, dec!(200.00));
        assert_eq!(preview.daily_rate_percent.round_dp(6), dec!(0.005479));
    }

    #[test]
    fn preview_agrees_with_posted_accrual() {
        let rate = SavingsRate::default();
        for balance in [dec!(1), dec!(99.99), dec!(10000), dec!(123456.78)] {
            assert_eq!(
                rate.preview(balance).daily_interest_rounded,
                rate.daily_accrual(balance)
            );
        }
    }

    #[test]
    fn empty_or_negative_balances_earn_nothing() {
        let rate = SavingsRate::default();
        assert_eq!(rate.daily_accrual(Decimal::ZERO), Decimal::ZERO);
        let preview = rate.preview(dec!(-50));
        assert_eq!(preview.daily_interest, Decimal::ZERO);
        assert_eq!(preview.yearly_interest, Decimal::ZERO);
    }

    #[test]
    fn alternate_rate_regimes_are_deterministic() {
        let rate = SavingsRate::new(dec!(0.0365));
        assert_eq!(rate.daily_accrual(dec!(1000)), dec!(0.10));
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let rate: SavingsRate = toml::from_str("annual_rate = \"0.03\"").unwrap();
        assert_eq!(rate.annual_rate, dec!(0.03));
        assert_eq!(rate.days_in_year, 365);
        assert_eq!(rate.days_in_month, 30);
    }
}
