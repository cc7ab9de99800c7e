use std::sync::Arc;
use std::time::Duration;

use dayrate_calc::{DepositQuote, DepositSchedule, InterestPreview, LoanCalculation, LoanTerms, SavingsRate};
use dayrate_core::{AccrualInitiator, UserId};
use dayrate_ledger::{AccountBalance, BankStore, LedgerEntry, LedgerQuery, NewAccount, TermDepositContract};
use rust_decimal::Decimal;
use tracing::warn;

use crate::events::{EventBus, EventStream};
use crate::{
    audit_ledger, AccrualOutcome, AccrualStatus, BalanceMutator, BankError, BankResult, Clock,
    DailyAccrualJob, LedgerAudit, MutationReceipt, MutationRequest, RoleDirectory,
    SignedContract, StaticRoles, SystemClock, TermDepositDesk, TransferReceipt, TransferRequest,
};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

struct ServiceInner {
    store: Arc<dyn BankStore>,
    mutator: BalanceMutator,
    accrual: DailyAccrualJob,
    deposits: TermDepositDesk,
    loans: LoanTerms,
    roles: Arc<dyn RoleDirectory>,
    events: Arc<EventBus>,
    request_timeout: Duration,
}

/// Async entry point used by request handlers and the scheduler.
///
/// Storage work runs on the blocking pool. A caller-side timeout reports a transient
/// failure; it does not cancel a mutation the store has already accepted.
#[derive(Clone)]
pub struct BankService {
    inner: Arc<ServiceInner>,
}

pub struct BankServiceBuilder {
    store: Arc<dyn BankStore>,
    clock: Arc<dyn Clock>,
    savings: SavingsRate,
    loans: LoanTerms,
    deposits: DepositSchedule,
    roles: Arc<dyn RoleDirectory>,
    request_timeout: Duration,
    event_capacity: usize,
}

impl BankServiceBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn savings(mut self, savings: SavingsRate) -> Self {
        self.savings = savings;
        self
    }

    pub fn loans(mut self, loans: LoanTerms) -> Self {
        self.loans = loans;
        self
    }

    pub fn deposits(mut self, deposits: DepositSchedule) -> Self {
        self.deposits = deposits;
        self
    }

    pub fn roles(mut self, roles: Arc<dyn RoleDirectory>) -> Self {
        self.roles = roles;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn build(self) -> BankService {
        let events = Arc::new(EventBus::new(self.event_capacity));
        let mutator =
            BalanceMutator::new(self.store.clone(), self.clock.clone()).with_events(events.clone());
        let accrual = DailyAccrualJob::new(self.store.clone(), self.clock.clone(), self.savings)
            .with_events(events.clone());
        let deposits = TermDepositDesk::new(self.store.clone(), self.clock, self.deposits)
            .with_events(events.clone());
        BankService {
            inner: Arc::new(ServiceInner {
                store: self.store,
                mutator,
                accrual,
                deposits,
                loans: self.loans,
                roles: self.roles,
                events,
                request_timeout: self.request_timeout,
            }),
        }
    }
}

impl BankService {
    pub fn builder(store: Arc<dyn BankStore>) -> BankServiceBuilder {
        BankServiceBuilder {
            store,
            clock: Arc::new(SystemClock),
            savings: SavingsRate::default(),
            loans: LoanTerms::default(),
            deposits: DepositSchedule::default(),
            roles: Arc::new(StaticRoles::default()),
            request_timeout: DEFAULT_TIMEOUT,
            event_capacity: 256,
        }
    }

    pub fn subscribe(&self) -> EventStream {
        self.inner.events.subscribe()
    }

    pub fn savings_rate(&self) -> &SavingsRate {
        self.inner.accrual.rate()
    }

    pub async fn open_account(&self, account: NewAccount) -> BankResult<AccountBalance> {
        self.blocking("open_account", move |inner| {
            Ok(inner.store.open_account(account)?)
        })
        .await
    }

    pub async fn account_for_user(&self, user: UserId) -> BankResult<AccountBalance> {
        self.blocking("account_for_user", move |inner| {
            inner
                .store
                .account_for_user(&user)?
                .ok_or_else(|| BankError::AccountNotFound(format!("no account for user {user}")))
        })
        .await
    }

    pub async fn history(&self, query: LedgerQuery) -> BankResult<Vec<LedgerEntry>> {
        self.blocking("history", move |inner| Ok(inner.store.entries(query)?))
            .await
    }

    pub async fn mutate_balance(&self, request: MutationRequest) -> BankResult<MutationReceipt> {
        self.blocking("mutate_balance", move |inner| inner.mutator.mutate(&request))
            .await
    }

    pub async fn transfer(&self, request: TransferRequest) -> BankResult<TransferReceipt> {
        self.blocking("transfer", move |inner| inner.mutator.transfer(&request))
            .await
    }

    /// Credit funds confirmed by the payment gateway.
    pub async fn credit_external_deposit(
        &self,
        user: UserId,
        amount: Decimal,
        reference: String,
    ) -> BankResult<MutationReceipt> {
        if amount <= Decimal::ZERO {
            return Err(BankError::validation("external deposit must be positive"));
        }
        let request = MutationRequest::deposit(user, amount, format!("Card deposit {reference}"))
            .with_counterpart(None, Some("payment gateway".to_string()));
        self.mutate_balance(request).await
    }

    pub async fn run_daily_accrual(&self, initiator: AccrualInitiator) -> BankResult<AccrualOutcome> {
        self.blocking("run_daily_accrual", move |inner| inner.accrual.run(initiator))
            .await
    }

    /// Manual trigger, restricted to admins.
    pub async fn run_manual_accrual(&self, requested_by: &UserId) -> BankResult<AccrualOutcome> {
        if !self.inner.roles.is_admin(requested_by) {
            warn!(user = %requested_by, "manual accrual refused for non-admin");
            return Err(BankError::Forbidden(format!(
                "user {requested_by} may not trigger interest accrual"
            )));
        }
        self.run_daily_accrual(AccrualInitiator::Manual).await
    }

    pub async fn accrual_status_today(&self) -> BankResult<AccrualStatus> {
        self.blocking("accrual_status_today", |inner| inner.accrual.status_today())
            .await
    }

    pub fn preview_interest(&self, balance: Decimal) -> InterestPreview {
        self.inner.accrual.rate().preview(balance)
    }

    pub fn compute_loan_schedule(&self, principal: Decimal, term_months: u32) -> LoanCalculation {
        self.inner.loans.schedule(principal, term_months)
    }

    pub fn compute_term_deposit_return(&self, principal: Decimal, term_months: u32) -> DepositQuote {
        self.inner.deposits.quote(principal, term_months)
    }

    pub async fn sign_term_deposit(
        &self,
        user: UserId,
        principal: Decimal,
        term_months: u32,
    ) -> BankResult<SignedContract> {
        self.blocking("sign_term_deposit", move |inner| {
            inner.deposits.sign(&user, principal, term_months)
        })
        .await
    }

    pub async fn contracts(&self, user: Option<UserId>) -> BankResult<Vec<TermDepositContract>> {
        self.blocking("contracts", move |inner| inner.deposits.contracts(user.as_ref()))
            .await
    }

    pub async fn audit(&self) -> BankResult<LedgerAudit> {
        self.blocking("audit", |inner| audit_ledger(inner.store.as_ref()))
            .await
    }

    async fn blocking<T, F>(&self, operation: &'static str, work: F) -> BankResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&ServiceInner) -> BankResult<T> + Send + 'static,
    {
        let inner = self.inner.clone();
        let handle = tokio::task::spawn_blocking(move || work(&inner));
        match tokio::time::timeout(self.inner.request_timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => Err(BankError::Transient(format!(
                "{operation} worker failed: {err}"
            ))),
            Err(_) => {
                warn!(
                    operation,
                    timeout_ms = self.inner.request_timeout.as_millis() as u64,
                    "request timed out"
                );
                Err(BankError::Transient(format!(
                    "{operation} timed out after {:?}",
                    self.inner.request_timeout
                )))
            }
        }
    }
}
