use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc};
use dayrate_core::AccrualInitiator;
use dayrate_engine::BankService;
use tokio::sync::watch;
use tracing::{error, info};

/// Cooperative shutdown flag shared by long-running tasks.
#[derive(Clone)]
pub struct ShutdownSignal {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    pub fn trigger(&self) {
        let _ = self.sender.send(true);
    }

    pub fn triggered(&self) -> bool {
        *self.receiver.borrow()
    }

    pub async fn wait(&self) {
        let mut receiver = self.receiver.clone();
        while !*receiver.borrow_and_update() {
            if receiver.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// First instant strictly after `now` whose UTC wall-clock time is `run_at`.
pub fn next_run_after(now: DateTime<Utc>, run_at: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(run_at).and_utc();
    if today > now {
        today
    } else {
        today + ChronoDuration::days(1)
    }
}

/// Fires the daily accrual job at a fixed UTC time.
pub struct AccrualScheduler {
    service: BankService,
    run_at: NaiveTime,
    catch_up: bool,
}

impl AccrualScheduler {
    pub fn new(service: BankService, run_at: NaiveTime, catch_up: bool) -> Self {
        Self {
            service,
            run_at,
            catch_up,
        }
    }

    pub async fn run(self, shutdown: ShutdownSignal) {
        if self.catch_up && Utc::now().time() >= self.run_at {
            match self.service.accrual_status_today().await {
                Ok(status) if !status.calculated_today => {
                    info!(date = %status.date, "running missed accrual");
                    self.run_once().await;
                }
                Ok(_) => {}
                Err(err) => error!(error = %err, "failed to read accrual status"),
            }
        }

        loop {
            let now = Utc::now();
            let next = next_run_after(now, self.run_at);
            let wait = (next - now).to_std().unwrap_or_default();
            info!(next_run = %next, "accrual scheduled");
            tokio::select! {
                _ = tokio::time::sleep(wait) => self.run_once().await,
                _ = shutdown.wait() => {
                    info!("accrual scheduler stopping");
                    break;
                }
            }
        }
    }

    async fn run_once(&self) {
        match self
            .service
            .run_daily_accrual(AccrualInitiator::Scheduled)
            .await
        {
            Ok(outcome) => info!(
                date = %outcome.marker.calculation_date,
                accounts = outcome.marker.accounts_processed,
                total = %outcome.marker.total_interest_paid,
                "scheduled accrual finished"
            ),
            Err(err) if err.is_benign() => info!(reason = %err, "scheduled accrual skipped"),
            Err(err) => error!(error = %err, retryable = err.is_retryable(), "scheduled accrual failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use dayrate_ledger::{BankStore, MemoryBankStore};
    use std::time::Duration;

    #[test]
    fn next_run_rolls_over_midnight() {
        let run_at = NaiveTime::from_hms_opt(0, 5, 0).unwrap();
        let before = Utc.with_ymd_and_hms(2024, 12, 31, 0, 1, 0).unwrap();
        assert_eq!(
            next_run_after(before, run_at),
            Utc.with_ymd_and_hms(2024, 12, 31, 0, 5, 0).unwrap()
        );
        let after = Utc.with_ymd_and_hms(2024, 12, 31, 0, 5, 0).unwrap();
        assert_eq!(
            next_run_after(after, run_at),
            Utc.with_ymd_and_hms(2025, 1, 1, 0, 5, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn shutdown_wakes_waiters() {
        let signal = ShutdownSignal::new();
        assert!(!signal.triggered());
        let waiter = signal.clone();
        let handle = tokio::spawn(async move { waiter.wait().await });
        signal.trigger();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(signal.triggered());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn catch_up_runs_once_then_stops_on_shutdown() {
        let store: Arc<dyn BankStore> = Arc::new(MemoryBankStore::new());
        let service = BankService::builder(store).build();
        let scheduler = AccrualScheduler::new(service.clone(), NaiveTime::MIN, true);
        let shutdown = ShutdownSignal::new();
        let handle = tokio::spawn(scheduler.run(shutdown.clone()));
        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(service.accrual_status_today().await.unwrap().calculated_today);
    }
}
