use std::sync::{Arc, Barrier};
use std::thread;

use chrono::{TimeZone, Utc};
use dayrate_calc::{DepositSchedule, LoanTerms, SavingsRate};
use dayrate_core::{AccountId, AccrualInitiator, TransactionKind, UserId};
use dayrate_engine::{
    audit_ledger, BalanceMutator, BankError, Clock, DailyAccrualJob, FixedClock, MutationRequest,
    TermDepositDesk, TransferRequest,
};
use dayrate_ledger::{BankStore, LedgerQuery, MemoryBankStore, NewAccount, SqliteBankStore};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;

struct Harness {
    name: &'static str,
    store: Arc<dyn BankStore>,
    clock: Arc<FixedClock>,
    _dir: Option<TempDir>,
}

impl Harness {
    fn mutator(&self) -> BalanceMutator {
        BalanceMutator::new(self.store.clone(), self.clock.clone())
    }

    fn accrual(&self) -> DailyAccrualJob {
        DailyAccrualJob::new(self.store.clone(), self.clock.clone(), SavingsRate::default())
    }

    fn desk(&self) -> TermDepositDesk {
        TermDepositDesk::new(self.store.clone(), self.clock.clone(), DepositSchedule::default())
    }

    fn balance(&self, account: &str) -> Decimal {
        self.store
            .account(&AccountId::from(account))
            .unwrap()
            .unwrap()
            .balance
    }
}

fn harnesses() -> Vec<Harness> {
    let clock = || {
        Arc::new(FixedClock::new(
            Utc.with_ymd_and_hms(2024, 6, 1, 9, 30, 0).unwrap(),
        ))
    };
    let dir = tempfile::tempdir().unwrap();
    let sqlite = SqliteBankStore::new(dir.path().join("bank.db")).unwrap();
    let harnesses = vec![
        Harness {
            name: "memory",
            store: Arc::new(MemoryBankStore::new()),
            clock: clock(),
            _dir: None,
        },
        Harness {
            name: "sqlite",
            store: Arc::new(sqlite),
            clock: clock(),
            _dir: Some(dir),
        },
    ];
    for harness in &harnesses {
        for (account, user) in [("acc-a", "alice"), ("acc-b", "bob"), ("acc-c", "carol")] {
            harness
                .store
                .open_account(NewAccount::new(account, user))
                .unwrap();
        }
    }
    harnesses
}

#[test]
fn ledger_stays_consistent_across_mixed_operations() {
    for h in harnesses() {
        let mutator = h.mutator();
        mutator
            .mutate(&MutationRequest::deposit("alice".into(), dec!(2500), "salary"))
            .unwrap();
        mutator
            .mutate(&MutationRequest::deposit("bob".into(), dec!(40), "gift"))
            .unwrap();
        mutator
            .transfer(&TransferRequest::new(
                "acc-a".into(),
                "acc-c".into(),
                dec!(700.25),
                "car",
            ))
            .unwrap();
        let overdraft =
            mutator.mutate(&MutationRequest::withdrawal("bob".into(), dec!(41), "atm"));
        assert!(
            matches!(overdraft, Err(BankError::InsufficientFunds { .. })),
            "{}: {overdraft:?}",
            h.name
        );
        mutator
            .mutate(&MutationRequest::withdrawal("bob".into(), dec!(15.5), "atm"))
            .unwrap();
        h.accrual().run(AccrualInitiator::Scheduled).unwrap();
        h.desk().sign(&UserId::from("alice"), dec!(1000), 72).unwrap();

        let audit = audit_ledger(h.store.as_ref()).unwrap();
        assert_eq!(audit.accounts_checked, 3, "{}", h.name);
        assert!(audit.is_consistent(), "{}: {:?}", h.name, audit.discrepancies);
    }
}

#[test]
fn rejected_debit_leaves_state_unchanged() {
    for h in harnesses() {
        let mutator = h.mutator();
        mutator
            .mutate(&MutationRequest::deposit("alice".into(), dec!(12.34), "seed"))
            .unwrap();
        let before = h.store.account(&AccountId::from("acc-a")).unwrap().unwrap();
        let err = mutator
            .mutate(&MutationRequest::withdrawal("alice".into(), dec!(12.35), "atm"))
            .unwrap_err();
        assert!(matches!(err, BankError::InsufficientFunds { .. }), "{}", h.name);
        let after = h.store.account(&AccountId::from("acc-a")).unwrap().unwrap();
        assert_eq!(before, after, "{}", h.name);
        assert_eq!(after.balance.to_string(), "12.34");
    }
}

#[test]
fn accrual_runs_once_per_day() {
    for h in harnesses() {
        let mutator = h.mutator();
        mutator
            .mutate(&MutationRequest::deposit("alice".into(), dec!(10000), "seed"))
            .unwrap();
        mutator
            .mutate(&MutationRequest::deposit("bob".into(), dec!(5000), "seed"))
            .unwrap();
        let job = h.accrual();
        let first = job.run(AccrualInitiator::Scheduled).unwrap();
        assert_eq!(first.marker.accounts_processed, 2);
        let second = job.run(AccrualInitiator::Manual).unwrap_err();
        assert!(second.is_benign(), "{}", h.name);

        let interest = h
            .store
            .entries(LedgerQuery::default().with_kind(TransactionKind::DailyInterest))
            .unwrap();
        assert_eq!(interest.len(), 2, "{}", h.name);
        assert!(h.store.marker(h.clock.today()).unwrap().is_some());
        assert_eq!(h.balance("acc-a"), dec!(10000.55));
        assert_eq!(h.balance("acc-b"), dec!(5000.27));
    }
}

#[test]
fn posted_interest_matches_preview() {
    for h in harnesses() {
        h.mutator()
            .mutate(&MutationRequest::deposit("carol".into(), dec!(10000), "seed"))
            .unwrap();
        let preview = SavingsRate::default().preview(dec!(10000));
        let outcome = h.accrual().run(AccrualInitiator::Scheduled).unwrap();
        assert_eq!(outcome.postings[0].interest, preview.daily_interest_rounded);
        assert_eq!(preview.daily_interest.round_dp(4), dec!(0.5479));
        assert_eq!(preview.monthly_interest.round_dp(2), dec!(16.44));
        assert_eq!(preview.yearly_interest.round_dp(2), dec!(200.00));
    }
}

#[test]
fn term_deposit_with_insufficient_balance_creates_nothing() {
    for h in harnesses() {
        h.mutator()
            .mutate(&MutationRequest::deposit("bob".into(), dec!(999.99), "seed"))
            .unwrap();
        let entries_before = h.store.entries(LedgerQuery::default()).unwrap().len();
        let err = h
            .desk()
            .sign(&UserId::from("bob"), dec!(1000), 12)
            .unwrap_err();
        assert!(matches!(err, BankError::InsufficientFunds { .. }), "{}", h.name);
        assert!(h.store.contracts(None).unwrap().is_empty(), "{}", h.name);
        assert_eq!(
            h.store.entries(LedgerQuery::default()).unwrap().len(),
            entries_before
        );
        assert_eq!(h.balance("acc-b"), dec!(999.99));
    }
}

#[test]
fn calculators_satisfy_published_figures() {
    let loan = LoanTerms::default().schedule(dec!(10000), 24);
    let last = loan.schedule.last().unwrap();
    assert!(last.remaining_balance.abs() <= dec!(0.01));
    let repaid: Decimal = loan.schedule.iter().map(|row| row.principal).sum();
    assert!((repaid - dec!(10000)).abs() <= dec!(0.01));

    let deposits = DepositSchedule::default();
    assert_eq!(deposits.quote(dec!(50000), 12).rate, dec!(10));
    assert_eq!(deposits.quote(dec!(150000), 12).rate, dec!(12));
    assert_eq!(deposits.quote(dec!(3210.5), 72).total_return, dec!(6421.0));
}

#[test]
fn concurrent_debits_cannot_overdraw() {
    for h in harnesses() {
        h.mutator()
            .mutate(&MutationRequest::deposit("alice".into(), dec!(100), "seed"))
            .unwrap();
        let workers = 10;
        let barrier = Arc::new(Barrier::new(workers));
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let mutator = h.mutator();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    mutator.mutate(&MutationRequest::withdrawal(
                        "alice".into(),
                        dec!(20),
                        "race",
                    ))
                })
            })
            .collect();
        let results: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();

        let succeeded = results.iter().filter(|result| result.is_ok()).count();
        let rejected = results
            .iter()
            .filter(|result| matches!(result, Err(BankError::InsufficientFunds { .. })))
            .count();
        assert_eq!(succeeded, 5, "{}", h.name);
        assert_eq!(rejected, 5, "{}", h.name);
        assert_eq!(h.balance("acc-a"), Decimal::ZERO);
        assert!(audit_ledger(h.store.as_ref()).unwrap().is_consistent());
    }
}

#[test]
fn concurrent_accrual_runs_post_once() {
    for h in harnesses() {
        h.mutator()
            .mutate(&MutationRequest::deposit("alice".into(), dec!(10000), "seed"))
            .unwrap();
        let barrier = Arc::new(Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let job = h.accrual();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    job.run(AccrualInitiator::Scheduled)
                })
            })
            .collect();
        let results: Vec<_> = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1, "{}", h.name);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(BankError::is_benign));
        let interest = h
            .store
            .entries(LedgerQuery::default().with_kind(TransactionKind::DailyInterest))
            .unwrap();
        assert_eq!(interest.len(), 1, "{}", h.name);
    }
}

#[test]
fn audit_running_alongside_transfers_sees_no_discrepancy() {
    for h in harnesses() {
        let mutator = h.mutator();
        mutator
            .mutate(&MutationRequest::deposit("alice".into(), dec!(500), "seed"))
            .unwrap();
        mutator
            .mutate(&MutationRequest::deposit("bob".into(), dec!(500), "seed"))
            .unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let mover = {
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for round in 0..50 {
                    let (from, to) = if round % 2 == 0 {
                        ("acc-a", "acc-b")
                    } else {
                        ("acc-b", "acc-a")
                    };
                    mutator
                        .transfer(&TransferRequest::new(from.into(), to.into(), dec!(7), "ping"))
                        .unwrap();
                }
            })
        };
        barrier.wait();
        for _ in 0..50 {
            let audit = audit_ledger(h.store.as_ref()).unwrap();
            assert_eq!(audit.accounts_checked, 3, "{}", h.name);
            assert!(audit.is_consistent(), "{}: {:?}", h.name, audit.discrepancies);
        }
        mover.join().unwrap();
        assert_eq!(h.balance("acc-a") + h.balance("acc-b"), dec!(1000), "{}", h.name);
    }
}
