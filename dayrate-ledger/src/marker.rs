use chrono::{DateTime, NaiveDate, Utc};
use dayrate_core::AccrualInitiator;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Completion record of a daily accrual run. At most one exists per calendar date and
/// its presence means the run for that date already happened.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccrualMarker {
    pub calculation_date: NaiveDate,
    pub accounts_processed: u32,
    pub total_interest_paid: Decimal,
    pub initiator: AccrualInitiator,
    pub calculated_at: DateTime<Utc>,
}
