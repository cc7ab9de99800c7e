use std::process::{Command, Output};
use std::str::FromStr;

use anyhow::Result;
use assert_cmd::prelude::*;
use rust_decimal::Decimal;
use serde_json::Value;
use tempfile::{tempdir, TempDir};

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Result<Self> {
        let workspace = Self { dir: tempdir()? };
        workspace.run(&["init"]).assert().success();
        Ok(workspace)
    }

    fn run(&self, args: &[&str]) -> Command {
        let binary = assert_cmd::cargo::cargo_bin!("dayrate");
        let mut cmd = Command::new(binary);
        cmd.current_dir(self.dir.path())
            .env("DAYRATE__DATABASE__PATH", self.dir.path().join("bank.db"))
            .env("DAYRATE__ADMINS", "root")
            .env_remove("RUST_LOG")
            .args(args);
        cmd
    }

    fn stdout(&self, args: &[&str]) -> Result<String> {
        let output = self.run(args).assert().success().get_output().clone();
        Ok(String::from_utf8(output.stdout)?)
    }

    fn json(&self, args: &[&str]) -> Result<Value> {
        let mut full = vec!["--json"];
        full.extend_from_slice(args);
        Ok(serde_json::from_str(&self.stdout(&full)?)?)
    }

    fn failure(&self, args: &[&str]) -> Result<String> {
        let output: Output = self.run(args).assert().failure().get_output().clone();
        Ok(String::from_utf8(output.stderr)?)
    }

    fn open(&self, account: &str, user: &str) {
        self.run(&["account", "open", account, user])
            .assert()
            .success();
    }
}

fn decimal(value: &Value) -> Decimal {
    Decimal::from_str(value.as_str().expect("decimal encoded as string")).unwrap()
}

#[test]
fn deposits_withdrawals_and_transfers_keep_ledger_consistent() -> Result<()> {
    let bank = Workspace::new()?;
    bank.open("acc-1", "alice");
    bank.open("acc-2", "bob");

    bank.run(&["deposit", "alice", "100.00"]).assert().success();
    bank.run(&["transfer", "acc-1", "acc-2", "40", "--description", "rent"])
        .assert()
        .success();
    bank.run(&["withdraw", "bob", "15.25"]).assert().success();

    let alice = bank.json(&["account", "show", "alice"])?;
    assert_eq!(decimal(&alice["balance"]), Decimal::from(60));
    let bob = bank.json(&["account", "show", "bob"])?;
    assert_eq!(decimal(&bob["balance"]), Decimal::new(2475, 2));

    let history = bank.json(&["history", "--account", "acc-2"])?;
    let entries = history.as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["kind"], "withdrawal");
    assert_eq!(entries[1]["kind"], "transfer_in");
    assert_eq!(entries[1]["counterpart_account"], "acc-1");

    assert!(bank.stdout(&["audit"])?.contains("ledger consistent across 2 accounts"));
    Ok(())
}

#[test]
fn overdraft_is_rejected() -> Result<()> {
    let bank = Workspace::new()?;
    bank.open("acc-1", "alice");
    bank.run(&["deposit", "alice", "10"]).assert().success();

    let stderr = bank.failure(&["withdraw", "alice", "10.01"])?;
    assert!(stderr.contains("insufficient funds"), "{stderr}");
    let stderr = bank.failure(&["deposit", "alice", "1.005"])?;
    assert!(stderr.contains("validation failed"), "{stderr}");
    let stderr = bank.failure(&["deposit", "alice", "--", "-50"])?;
    assert!(stderr.contains("validation failed"), "{stderr}");
    let stderr = bank.failure(&["withdraw", "alice", "--", "-50"])?;
    assert!(stderr.contains("validation failed"), "{stderr}");

    let alice = bank.json(&["account", "show", "alice"])?;
    assert_eq!(decimal(&alice["balance"]), Decimal::from(10));
    let history = bank.json(&["history", "--user", "alice"])?;
    assert_eq!(history.as_array().unwrap().len(), 1);
    Ok(())
}

#[test]
fn manual_accrual_is_admin_only_and_once_per_day() -> Result<()> {
    let bank = Workspace::new()?;
    bank.open("acc-1", "alice");
    bank.run(&["deposit", "alice", "10000"]).assert().success();

    let stderr = bank.failure(&["accrue", "--as", "alice"])?;
    assert!(stderr.contains("forbidden"), "{stderr}");
    let status = bank.json(&["accrual-status"])?;
    assert_eq!(status["calculated_today"], false);

    let outcome = bank.json(&["accrue", "--as", "root"])?;
    assert_eq!(outcome["marker"]["accounts_processed"], 1);
    assert_eq!(outcome["marker"]["initiator"], "manual");
    assert_eq!(decimal(&outcome["postings"][0]["interest"]), Decimal::new(55, 2));

    let again = bank.stdout(&["accrue", "--as", "root"])?;
    assert!(again.contains("already calculated"), "{again}");
    let alice = bank.json(&["account", "show", "alice"])?;
    assert_eq!(decimal(&alice["balance"]), Decimal::new(1000055, 2));

    let interest = bank.json(&["history", "--kind", "daily_interest"])?;
    assert_eq!(interest.as_array().unwrap().len(), 1);
    Ok(())
}

#[test]
fn term_deposit_is_signed_against_balance() -> Result<()> {
    let bank = Workspace::new()?;
    bank.open("acc-1", "alice");
    bank.run(&["deposit", "alice", "5000"]).assert().success();

    let signed = bank.json(&["deposit-term", "sign", "alice", "1000", "24"])?;
    assert_eq!(decimal(&signed["funding"]["new_balance"]), Decimal::from(4000));
    assert_eq!(decimal(&signed["contract"]["interest_rate"]), Decimal::from(8));
    assert_eq!(signed["contract"]["status"], "active");

    let stderr = bank.failure(&["deposit-term", "sign", "alice", "9000", "24"])?;
    assert!(stderr.contains("insufficient funds"), "{stderr}");

    let contracts = bank.json(&["deposit-term", "list", "--user", "alice"])?;
    assert_eq!(contracts.as_array().unwrap().len(), 1);
    assert!(bank.stdout(&["audit"])?.contains("ledger consistent"));
    Ok(())
}

#[test]
fn calculators_need_no_accounts() -> Result<()> {
    let bank = Workspace::new()?;

    let preview = bank.stdout(&["preview", "10000"])?;
    assert!(preview.contains("daily 0.5479 (posted 0.55)"), "{preview}");
    assert!(preview.contains("monthly 16.44"), "{preview}");

    let loan = bank.stdout(&["loan", "10000", "24"])?;
    assert!(loan.contains("monthly payment 480.13"), "{loan}");
    let schedule = bank.json(&["loan", "10000", "24"])?;
    assert_eq!(schedule["schedule"].as_array().unwrap().len(), 24);

    let quote = bank.json(&["deposit-term", "quote", "1000", "24"])?;
    assert_eq!(decimal(&quote["total_return"]).round_dp(2), Decimal::new(11664, 1));
    let flat = bank.json(&["deposit-term", "quote", "60000", "72"])?;
    assert_eq!(decimal(&flat["yearly_profit"]).round_dp(2), Decimal::from(10000));
    Ok(())
}

#[test]
fn config_command_reflects_environment_overrides() -> Result<()> {
    let bank = Workspace::new()?;
    let rendered = bank.stdout(&["config"])?;
    assert!(rendered.contains("\"root\""), "{rendered}");
    assert!(rendered.contains("bank.db"), "{rendered}");
    Ok(())
}
