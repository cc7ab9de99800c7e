use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand};
use dayrate_config::{load_config, BankConfig};
use dayrate_core::{AccountId, Currency, TransactionKind, UserId};
use dayrate_engine::{
    BankError, BankEvent, BankService, MutationReceipt, MutationRequest, StaticRoles,
    TransferRequest,
};
use dayrate_ledger::{BankStore, LedgerQuery, NewAccount, SqliteBankStore};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::scheduler::{AccrualScheduler, ShutdownSignal};
use crate::telemetry::init_tracing;

#[derive(Parser)]
#[command(name = "dayrate", author, version, about = "Daily-interest bank ledger")]
pub struct Cli {
    /// Configuration file layered over the built-in defaults
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Selects config/<env>.toml when --config is not given
    #[arg(long, default_value = "default", global = true)]
    env: String,
    /// Increase logging verbosity (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the database and its schema
    Init,
    /// Print the effective configuration
    Config,
    /// Account management
    Account {
        #[command(subcommand)]
        action: AccountCommand,
    },
    /// Credit funds to a user's account
    Deposit {
        user: String,
        amount: Decimal,
        #[arg(long, default_value = "Cash deposit")]
        description: String,
        /// Payment gateway reference; marks the credit as an external card deposit
        #[arg(long)]
        reference: Option<String>,
    },
    /// Debit funds from a user's account
    Withdraw {
        user: String,
        amount: Decimal,
        #[arg(long, default_value = "Cash withdrawal")]
        description: String,
    },
    /// Move funds between two accounts
    Transfer {
        from: String,
        to: String,
        amount: Decimal,
        #[arg(long, default_value = "Transfer")]
        description: String,
    },
    /// List ledger entries, newest first
    History(HistoryArgs),
    /// Run today's interest accrual on behalf of an admin
    Accrue {
        /// User requesting the run; must be listed in `admins`
        #[arg(long = "as")]
        requested_by: String,
    },
    /// Show whether today's accrual has run
    AccrualStatus,
    /// Project savings interest for a balance
    Preview { balance: Decimal },
    /// Compute a loan amortization schedule
    Loan {
        principal: Decimal,
        term_months: u32,
        /// Print every month of the schedule
        #[arg(long)]
        schedule: bool,
    },
    /// Term-deposit quotes and contracts
    DepositTerm {
        #[command(subcommand)]
        action: DepositTermCommand,
    },
    /// Verify every balance against its ledger
    Audit,
    /// Run the daily accrual scheduler until interrupted
    Serve,
}

#[derive(Subcommand)]
pub enum AccountCommand {
    /// Open an account for a user
    Open {
        account: String,
        user: String,
        #[arg(long)]
        currency: Option<String>,
    },
    /// Show the account owned by a user
    Show { user: String },
    /// List all accounts
    List,
}

#[derive(Subcommand)]
pub enum DepositTermCommand {
    /// Quote a term deposit without signing it
    Quote { principal: Decimal, term_months: u32 },
    /// Debit the principal and open a contract
    Sign {
        user: String,
        principal: Decimal,
        term_months: u32,
    },
    /// List contracts, optionally for one user
    List {
        #[arg(long)]
        user: Option<String>,
    },
}

#[derive(Args)]
pub struct HistoryArgs {
    #[arg(long)]
    account: Option<String>,
    #[arg(long)]
    user: Option<String>,
    #[arg(long)]
    kind: Option<TransactionKind>,
    #[arg(long, default_value_t = 50)]
    limit: usize,
    /// Oldest first
    #[arg(long)]
    ascending: bool,
}

impl HistoryArgs {
    fn query(&self) -> LedgerQuery {
        let mut query = LedgerQuery::default().with_limit(self.limit);
        if let Some(account) = &self.account {
            query = query.with_account(AccountId::from(account.as_str()));
        }
        if let Some(user) = &self.user {
            query = query.with_user(UserId::from(user.as_str()));
        }
        if let Some(kind) = self.kind {
            query = query.with_kind(kind);
        }
        if self.ascending {
            query = query.ascending();
        }
        query
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(Some(&cli.env), cli.config.as_deref())?;
    let _telemetry = init_tracing(&config.telemetry, cli.verbose)?;
    execute(cli, config).await
}

async fn execute(cli: Cli, config: BankConfig) -> Result<()> {
    let json = cli.json;
    match cli.command {
        Commands::Init => {
            let store = open_store(&config)?;
            let path = store.path().display().to_string();
            info!(path = %path, "database ready");
            emit(json, &serde_json::json!({ "database": path }), || {
                format!("database initialized at {path}")
            })
        }
        Commands::Config => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Commands::Account { action } => account_command(&config, action, json).await,
        Commands::Deposit {
            user,
            amount,
            description,
            reference,
        } => {
            let service = build_service(&config)?;
            let user = UserId::from(user);
            let receipt = match reference {
                Some(reference) => {
                    service
                        .credit_external_deposit(user, amount, reference)
                        .await?
                }
                None => {
                    service
                        .mutate_balance(MutationRequest::deposit(user, amount, description))
                        .await?
                }
            };
            print_receipt(json, &receipt)
        }
        Commands::Withdraw {
            user,
            amount,
            description,
        } => {
            let service = build_service(&config)?;
            let receipt = service
                .mutate_balance(MutationRequest::withdrawal(
                    UserId::from(user),
                    amount,
                    description,
                ))
                .await?;
            print_receipt(json, &receipt)
        }
        Commands::Transfer {
            from,
            to,
            amount,
            description,
        } => {
            let service = build_service(&config)?;
            let receipt = service
                .transfer(TransferRequest::new(
                    AccountId::from(from),
                    AccountId::from(to),
                    amount,
                    description,
                ))
                .await?;
            emit(json, &receipt, || {
                format!(
                    "transferred {} from {} (balance {}) to {} (balance {})",
                    receipt.credit.entry.amount,
                    receipt.debit.entry.account_id,
                    receipt.debit.new_balance,
                    receipt.credit.entry.account_id,
                    receipt.credit.new_balance
                )
            })
        }
        Commands::History(args) => {
            let service = build_service(&config)?;
            let entries = service.history(args.query()).await?;
            emit(json, &entries, || {
                entries
                    .iter()
                    .map(|entry| {
                        format!(
                            "#{:<6} {} {:<10} {:<14} {:>12} {}",
                            entry.sequence,
                            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
                            entry.account_id,
                            entry.kind,
                            entry.amount,
                            entry.description
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
        Commands::Accrue { requested_by } => {
            let service = build_service(&config)?;
            match service
                .run_manual_accrual(&UserId::from(requested_by))
                .await
            {
                Ok(outcome) => emit(json, &outcome, || {
                    format!(
                        "accrued {} across {} accounts for {}",
                        outcome.marker.total_interest_paid,
                        outcome.marker.accounts_processed,
                        outcome.marker.calculation_date
                    )
                }),
                Err(BankError::AlreadyCalculatedToday { marker }) => {
                    emit(json, &serde_json::json!({ "already_calculated": marker }), || {
                        format!(
                            "interest already calculated for {} ({} accounts, {} paid)",
                            marker.calculation_date,
                            marker.accounts_processed,
                            marker.total_interest_paid
                        )
                    })
                }
                Err(err) => Err(err.into()),
            }
        }
        Commands::AccrualStatus => {
            let service = build_service(&config)?;
            let status = service.accrual_status_today().await?;
            emit(json, &status, || match (status.calculated_at, status.total_interest_paid) {
                (Some(at), Some(total)) => format!(
                    "{}: calculated at {} ({} paid)",
                    status.date,
                    at.format("%H:%M:%S UTC"),
                    total
                ),
                _ => format!("{}: not calculated yet", status.date),
            })
        }
        Commands::Preview { balance } => {
            let preview = config.savings.preview(balance);
            emit(json, &preview, || {
                format!(
                    "daily {} (posted {})\nmonthly {}\nyearly {}\ndaily rate {}%",
                    preview.daily_interest.round_dp(4),
                    preview.daily_interest_rounded,
                    preview.monthly_interest.round_dp(2),
                    preview.yearly_interest.round_dp(2),
                    preview.daily_rate_percent.round_dp(6)
                )
            })
        }
        Commands::Loan {
            principal,
            term_months,
            schedule,
        } => {
            let calculation = config.loans.schedule(principal, term_months);
            emit(json, &calculation, || {
                let mut lines = vec![format!(
                    "{} over {} months at {}%: monthly payment {}, total interest {}",
                    calculation.principal,
                    calculation.term_months,
                    (calculation.annual_rate * Decimal::ONE_HUNDRED).normalize(),
                    calculation.monthly_payment.round_dp(2),
                    calculation.total_interest.round_dp(2)
                )];
                if schedule {
                    lines.extend(calculation.schedule.iter().map(|row| {
                        format!(
                            "{:>3} {:>10} {:>10} {:>10} {:>12}",
                            row.month,
                            row.payment.round_dp(2),
                            row.principal.round_dp(2),
                            row.interest.round_dp(2),
                            row.remaining_balance.round_dp(2)
                        )
                    }));
                }
                lines.join("\n")
            })
        }
        Commands::DepositTerm { action } => deposit_term_command(&config, action, json).await,
        Commands::Audit => {
            let service = build_service(&config)?;
            let audit = service.audit().await?;
            let consistent = audit.is_consistent();
            emit(json, &audit, || {
                if consistent {
                    format!("ledger consistent across {} accounts", audit.accounts_checked)
                } else {
                    audit
                        .discrepancies
                        .iter()
                        .map(|d| {
                            format!(
                                "{}: balance {} != ledger {}",
                                d.account_id, d.balance, d.ledger_sum
                            )
                        })
                        .collect::<Vec<_>>()
                        .join("\n")
                }
            })?;
            if consistent {
                Ok(())
            } else {
                anyhow::bail!("{} accounts disagree with their ledger", audit.discrepancies.len())
            }
        }
        Commands::Serve => serve(&config).await,
    }
}

async fn account_command(config: &BankConfig, action: AccountCommand, json: bool) -> Result<()> {
    match action {
        AccountCommand::Open {
            account,
            user,
            currency,
        } => {
            let currency = currency
                .map(Currency::new)
                .unwrap_or_else(|| config.currency.clone());
            let opened = build_service(config)?
                .open_account(NewAccount::new(account, user).with_currency(currency))
                .await?;
            emit(json, &opened, || {
                format!(
                    "opened {} for {} ({})",
                    opened.account_id, opened.user_id, opened.currency
                )
            })
        }
        AccountCommand::Show { user } => {
            let account = build_service(config)?
                .account_for_user(UserId::from(user))
                .await?;
            emit(json, &account, || {
                format!(
                    "{} {} {} {}",
                    account.account_id, account.user_id, account.balance, account.currency
                )
            })
        }
        AccountCommand::List => {
            let accounts = open_store(config)?.accounts()?;
            emit(json, &accounts, || {
                accounts
                    .iter()
                    .map(|a| format!("{} {} {} {}", a.account_id, a.user_id, a.balance, a.currency))
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
    }
}

async fn deposit_term_command(
    config: &BankConfig,
    action: DepositTermCommand,
    json: bool,
) -> Result<()> {
    match action {
        DepositTermCommand::Quote {
            principal,
            term_months,
        } => {
            let quote = config.deposits.quote(principal, term_months);
            emit(json, &quote, || {
                format!(
                    "{} for {} months at {}%: return {}, profit {} ({} per year, {} per month)",
                    quote.principal,
                    quote.term_months,
                    quote.rate.normalize(),
                    quote.total_return.round_dp(2),
                    quote.total_profit.round_dp(2),
                    quote.yearly_profit.round_dp(2),
                    quote.monthly_profit.round_dp(2)
                )
            })
        }
        DepositTermCommand::Sign {
            user,
            principal,
            term_months,
        } => {
            let service = build_service(config)?;
            let signed = service
                .sign_term_deposit(UserId::from(user), principal, term_months)
                .await?;
            emit(json, &signed, || {
                format!(
                    "contract {} matures {} with {}; balance {}",
                    signed.contract.id,
                    signed.contract.maturity_date.format("%Y-%m-%d"),
                    signed.contract.total_return,
                    signed.funding.new_balance
                )
            })
        }
        DepositTermCommand::List { user } => {
            let service = build_service(config)?;
            let contracts = service.contracts(user.map(UserId::from)).await?;
            emit(json, &contracts, || {
                contracts
                    .iter()
                    .map(|c| {
                        format!(
                            "{} {} {} {}m {}% -> {} ({}, matures {})",
                            c.id,
                            c.user_id,
                            c.principal,
                            c.term_months,
                            c.interest_rate.normalize(),
                            c.total_return,
                            c.status,
                            c.maturity_date.format("%Y-%m-%d")
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }
    }
}

async fn serve(config: &BankConfig) -> Result<()> {
    let service = build_service(config)?;
    let run_at = config.accrual.run_at()?;
    let shutdown = ShutdownSignal::new();

    let mut events = service.subscribe();
    let event_shutdown = shutdown.clone();
    let event_log = tokio::spawn(async move {
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(BankEvent::AccrualCompleted(event)) => info!(
                        date = %event.marker.calculation_date,
                        total = %event.marker.total_interest_paid,
                        "accrual event"
                    ),
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => warn!(skipped, "event log fell behind"),
                    Err(RecvError::Closed) => break,
                },
                _ = event_shutdown.wait() => break,
            }
        }
    });

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
        }
        signal.trigger();
    });

    info!(run_at = %run_at, "accrual scheduler started");
    AccrualScheduler::new(service, run_at, config.accrual.catch_up_on_start)
        .run(shutdown)
        .await;
    let _ = event_log.await;
    Ok(())
}

fn open_store(config: &BankConfig) -> Result<SqliteBankStore> {
    let path = &config.database.path;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    SqliteBankStore::with_busy_timeout(path, config.database.busy_timeout())
        .with_context(|| format!("failed to open database {}", path.display()))
}

fn build_service(config: &BankConfig) -> Result<BankService> {
    let store: Arc<dyn BankStore> = Arc::new(open_store(config)?);
    Ok(BankService::builder(store)
        .savings(config.savings.clone())
        .loans(config.loans.clone())
        .deposits(config.deposits.clone())
        .roles(Arc::new(StaticRoles::new(config.admins.iter().cloned())))
        .request_timeout(config.service.request_timeout())
        .build())
}

fn print_receipt(json: bool, receipt: &MutationReceipt) -> Result<()> {
    emit(json, receipt, || {
        format!(
            "{} {} on {}: balance {}",
            receipt.entry.kind, receipt.entry.amount, receipt.entry.account_id, receipt.new_balance
        )
    })
}

fn emit<T, F>(json: bool, value: &T, text: F) -> Result<()>
where
    T: Serialize + ?Sized,
    F: FnOnce() -> String,
{
    if json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        let text = text();
        if !text.is_empty() {
            println!("{text}");
        }
    }
    Ok(())
}
