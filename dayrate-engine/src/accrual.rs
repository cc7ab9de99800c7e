use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use dayrate_calc::SavingsRate;
use dayrate_core::{AccountId, AccrualInitiator, TransactionKind};
use dayrate_ledger::{AccrualMarker, BankStore};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::events::{AccrualCompletedEvent, BankEvent, EventBus};
use crate::{BalanceMutator, BankError, BankResult, Clock, MutationRequest};

/// Interest credited to one account by an accrual run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccrualPosting {
    pub account_id: AccountId,
    pub interest: Decimal,
    pub new_balance: Decimal,
}

/// Result of a completed accrual run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccrualOutcome {
    pub marker: AccrualMarker,
    pub postings: Vec<AccrualPosting>,
}

/// Whether today's accrual has already happened.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AccrualStatus {
    pub date: NaiveDate,
    pub calculated_today: bool,
    pub accounts_processed: Option<u32>,
    pub total_interest_paid: Option<Decimal>,
    pub calculated_at: Option<DateTime<Utc>>,
    pub initiator: Option<AccrualInitiator>,
}

impl AccrualStatus {
    fn from_marker(date: NaiveDate, marker: Option<AccrualMarker>) -> Self {
        match marker {
            Some(marker) => Self {
                date,
                calculated_today: true,
                accounts_processed: Some(marker.accounts_processed),
                total_interest_paid: Some(marker.total_interest_paid),
                calculated_at: Some(marker.calculated_at),
                initiator: Some(marker.initiator),
            },
            None => Self {
                date,
                calculated_today: false,
                accounts_processed: None,
                total_interest_paid: None,
                calculated_at: None,
                initiator: None,
            },
        }
    }
}

/// Once-per-calendar-day interest batch.
///
/// The marker check, every interest posting and the marker insert share one unit of
/// work. A run that finds the marker, or loses the marker insert to a concurrent run,
/// leaves no trace.
#[derive(Clone)]
pub struct DailyAccrualJob {
    store: Arc<dyn BankStore>,
    clock: Arc<dyn Clock>,
    rate: SavingsRate,
    events: Option<Arc<EventBus>>,
}

impl DailyAccrualJob {
    pub fn new(store: Arc<dyn BankStore>, clock: Arc<dyn Clock>, rate: SavingsRate) -> Self {
        Self {
            store,
            clock,
            rate,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn rate(&self) -> &SavingsRate {
        &self.rate
    }

    pub fn run(&self, initiator: AccrualInitiator) -> BankResult<AccrualOutcome> {
        let now = self.clock.now();
        let date = now.date_naive();
        let mut tx = self.store.begin()?;
        if let Some(marker) = tx.marker(date)? {
            debug!(%date, "accrual marker already present");
            return Err(BankError::AlreadyCalculatedToday {
                marker: Box::new(marker),
            });
        }

        let accounts = tx.funded_accounts()?;
        let description = format!("Daily interest {date}");
        let mut postings = Vec::with_capacity(accounts.len());
        let mut total = Decimal::ZERO;
        for account in accounts {
            let interest = self.rate.daily_accrual(account.balance);
            if interest <= Decimal::ZERO {
                debug!(
                    account = %account.account_id,
                    balance = %account.balance,
                    "daily interest rounds to zero; nothing posted"
                );
                continue;
            }
            let request = MutationRequest::new(
                account.user_id.clone(),
                interest,
                TransactionKind::DailyInterest,
                description.clone(),
            );
            let receipt = BalanceMutator::apply_in(tx.as_mut(), &account, &request, now)?;
            total = total
                .checked_add(interest)
                .ok_or_else(|| BankError::validation("interest total out of range"))?;
            postings.push(AccrualPosting {
                account_id: account.account_id,
                interest,
                new_balance: receipt.new_balance,
            });
        }

        let marker = AccrualMarker {
            calculation_date: date,
            accounts_processed: processed_count(postings.len())?,
            total_interest_paid: total,
            initiator,
            calculated_at: now,
        };
        if !tx.insert_marker(&marker)? {
            let existing = tx.marker(date)?;
            warn!(%date, "accrual marker inserted concurrently; discarding this run");
            return Err(BankError::AlreadyCalculatedToday {
                marker: Box::new(existing.unwrap_or(marker)),
            });
        }
        tx.commit()?;

        info!(
            %date,
            initiator = %initiator,
            accounts = marker.accounts_processed,
            total = %marker.total_interest_paid,
            "daily interest accrued"
        );
        if let Some(events) = &self.events {
            events.publish(BankEvent::AccrualCompleted(AccrualCompletedEvent {
                marker: marker.clone(),
            }));
        }
        Ok(AccrualOutcome { marker, postings })
    }

    pub fn status_today(&self) -> BankResult<AccrualStatus> {
        let date = self.clock.today();
        let marker = self.store.marker(date)?;
        Ok(AccrualStatus::from_marker(date, marker))
    }
}

fn processed_count(postings: usize) -> BankResult<u32> {
    u32::try_from(postings).map_err(|err| {
        BankError::validation(format!("too many accounts for one accrual run: {err}"))
    })
}
