use rust_decimal::{Decimal, RoundingStrategy};

/// Number of fractional digits carried by posted amounts.
pub const CURRENCY_SCALE: u32 = 2;

/// Round an amount to currency precision (half away from zero).
pub fn round_currency(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}
