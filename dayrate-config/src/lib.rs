use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::NaiveTime;
use config::{Config, Environment, File, FileFormat};
use dayrate_calc::{DepositSchedule, LoanTerms, SavingsRate};
use dayrate_core::{Currency, UserId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Built-in settings every other source is layered on top of.
pub const DEFAULT_CONFIG: &str = include_str!("../default.toml");

/// Prefix of environment overrides, e.g. `DAYRATE__DATABASE__PATH`.
pub const ENV_PREFIX: &str = "DAYRATE";

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct BankConfig {
    #[serde(default)]
    pub currency: Currency,
    #[serde(default)]
    pub admins: Vec<UserId>,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub savings: SavingsRate,
    #[serde(default)]
    pub loans: LoanTerms,
    #[serde(default)]
    pub deposits: DepositSchedule,
    #[serde(default)]
    pub accrual: AccrualScheduleConfig,
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl DatabaseConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct AccrualScheduleConfig {
    /// Wall-clock time (UTC, `HH:MM`) of the daily run.
    #[serde(default = "default_run_at")]
    pub run_at_utc: String,
    /// Run immediately at startup when today's slot has passed without a marker.
    #[serde(default = "default_true")]
    pub catch_up_on_start: bool,
}

impl Default for AccrualScheduleConfig {
    fn default() -> Self {
        Self {
            run_at_utc: default_run_at(),
            catch_up_on_start: true,
        }
    }
}

impl AccrualScheduleConfig {
    pub fn run_at(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.run_at_utc, "%H:%M")
            .with_context(|| format!("invalid accrual.run_at_utc '{}'", self.run_at_utc))
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct ServiceConfig {
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl ServiceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    /// Daily rolling log files are written here when set.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
            log_dir: None,
        }
    }
}

impl BankConfig {
    /// Rejects settings the calculators cannot work with.
    pub fn validate(&self) -> Result<()> {
        self.accrual.run_at()?;
        if self.savings.annual_rate < Decimal::ZERO {
            bail!("savings.annual_rate must not be negative");
        }
        if self.savings.days_in_year == 0 || self.savings.days_in_month == 0 {
            bail!("savings day counts must be positive");
        }
        if self.loans.min_principal > self.loans.max_principal {
            bail!("loans.min_principal exceeds loans.max_principal");
        }
        if self.loans.min_term_months == 0 || self.loans.min_term_months > self.loans.max_term_months
        {
            bail!("loans term bounds are inconsistent");
        }
        if self.deposits.tiers.is_empty() {
            bail!("deposits.tiers must contain at least one tier");
        }
        if self
            .deposits
            .tiers
            .iter()
            .any(|tier| tier.annual_rate < Decimal::ZERO || tier.annual_rate > Decimal::ONE)
        {
            bail!("deposits.tiers annual_rate must lie between 0 and 1");
        }
        if self.deposits.flat_total_rate < Decimal::ZERO
            || self.deposits.flat_total_rate > Decimal::TEN
        {
            bail!("deposits.flat_total_rate must lie between 0 and 10");
        }
        if self.deposits.min_term_months > self.deposits.flat_term_months {
            bail!("deposits.min_term_months exceeds deposits.flat_term_months");
        }
        if self.service.request_timeout_ms == 0 {
            bail!("service.request_timeout_ms must be positive");
        }
        Ok(())
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("failed to render configuration")
    }
}

/// Load configuration.
///
/// Sources, lowest precedence first: the built-in defaults, then `path` when given
/// (required) or `config/<env>.toml` relative to the working directory (optional),
/// then `DAYRATE__SECTION__KEY` environment variables.
pub fn load_config(env: Option<&str>, path: Option<&Path>) -> Result<BankConfig> {
    let env = env.unwrap_or("default");
    let mut builder =
        Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml));
    builder = match path {
        Some(path) => builder.add_source(File::from(path).format(FileFormat::Toml)),
        None => builder.add_source(File::with_name(&format!("config/{env}")).required(false)),
    };
    let settings = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("admins"),
        )
        .build()
        .with_context(|| format!("failed to load configuration for env '{env}'"))?;
    let config: BankConfig = settings
        .try_deserialize()
        .context("failed to deserialize configuration")?;
    config.validate()?;
    Ok(config)
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_run_at() -> String {
    "00:05".to_string()
}

fn default_true() -> bool {
    true
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_level() -> String {
    "info".to_string()
}
