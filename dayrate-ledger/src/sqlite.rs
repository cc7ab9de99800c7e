use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use dayrate_core::{AccountId, Currency, TransactionStatus, UserId};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{
    AccountBalance, AccrualMarker, BankStore, LedgerEntry, LedgerError, LedgerQuery,
    LedgerResult, LedgerTx, NewAccount, TermDepositContract,
};

const BANK_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS accounts (
    account_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL UNIQUE,
    balance TEXT NOT NULL,
    currency TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS ledger_entries (
    sequence INTEGER PRIMARY KEY,
    entry_id TEXT NOT NULL UNIQUE,
    user_id TEXT NOT NULL,
    account_id TEXT NOT NULL REFERENCES accounts(account_id),
    amount TEXT NOT NULL,
    kind TEXT NOT NULL,
    counterpart_account TEXT,
    counterpart_name TEXT,
    description TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS ledger_idx_account_created
    ON ledger_entries(account_id, created_at);
CREATE INDEX IF NOT EXISTS ledger_idx_kind
    ON ledger_entries(kind);
CREATE TABLE IF NOT EXISTS accrual_markers (
    calculation_date TEXT PRIMARY KEY,
    accounts_processed INTEGER NOT NULL,
    total_interest_paid TEXT NOT NULL,
    initiator TEXT NOT NULL,
    calculated_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS term_deposit_contracts (
    contract_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    account_id TEXT NOT NULL REFERENCES accounts(account_id),
    principal TEXT NOT NULL,
    term_months INTEGER NOT NULL,
    interest_rate TEXT NOT NULL,
    total_return TEXT NOT NULL,
    maturity_date TEXT NOT NULL,
    status TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS contracts_idx_user
    ON term_deposit_contracts(user_id);
"#;

const ACCOUNT_COLUMNS: &str = "account_id, user_id, balance, currency, updated_at";
const ENTRY_COLUMNS: &str = "sequence, entry_id, user_id, account_id, amount, kind, \
    counterpart_account, counterpart_name, description, status, created_at";
const MARKER_COLUMNS: &str =
    "calculation_date, accounts_processed, total_interest_paid, initiator, calculated_at";
const CONTRACT_COLUMNS: &str = "contract_id, user_id, account_id, principal, term_months, \
    interest_rate, total_return, maturity_date, status, created_at";

/// SQLite-backed bank store.
///
/// Every unit of work starts with `BEGIN IMMEDIATE`, which takes the database write
/// lock up front: two writers can never read the same balance and both act on it.
#[derive(Clone, Debug)]
pub struct SqliteBankStore {
    path: PathBuf,
    busy_timeout: Duration,
}

impl SqliteBankStore {
    pub fn new(path: impl Into<PathBuf>) -> LedgerResult<Self> {
        Self::with_busy_timeout(path, Duration::from_secs(5))
    }

    pub fn with_busy_timeout(path: impl Into<PathBuf>, busy_timeout: Duration) -> LedgerResult<Self> {
        let store = Self {
            path: path.into(),
            busy_timeout,
        };
        store.initialize_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn initialize_schema(&self) -> LedgerResult<()> {
        let conn = self.connect()?;
        conn.execute_batch(BANK_SCHEMA)?;
        Ok(())
    }

    fn connect(&self) -> LedgerResult<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL; PRAGMA foreign_keys = ON;",
        )?;
        Ok(conn)
    }
}

struct SqliteTx {
    conn: Connection,
    finished: bool,
}

impl Drop for SqliteTx {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.conn.execute_batch("ROLLBACK");
        }
    }
}

impl LedgerTx for SqliteTx {
    fn account(&mut self, id: &AccountId) -> LedgerResult<Option<AccountBalance>> {
        load_account(&self.conn, "account_id", id.as_str())
    }

    fn account_for_user(&mut self, user: &UserId) -> LedgerResult<Option<AccountBalance>> {
        load_account(&self.conn, "user_id", user.as_str())
    }

    fn accounts(&mut self) -> LedgerResult<Vec<AccountBalance>> {
        load_accounts(&self.conn)
    }

    fn ledger_sum(&mut self, account: &AccountId) -> LedgerResult<Decimal> {
        // Amounts are stored as text, so they are summed after decoding.
        let mut stmt = self
            .conn
            .prepare("SELECT amount FROM ledger_entries WHERE account_id = ?1")?;
        let mut rows = stmt.query(params![account.as_str()])?;
        let mut sum = Decimal::ZERO;
        while let Some(row) = rows.next()? {
            let amount: String = row.get(0)?;
            sum = sum.checked_add(parse_decimal(&amount)?).ok_or_else(|| {
                LedgerError::InvalidState(format!("ledger sum of {account} out of range"))
            })?;
        }
        Ok(sum)
    }

    fn funded_accounts(&mut self) -> LedgerResult<Vec<AccountBalance>> {
        // Balances are stored as text, so positivity is checked after decoding.
        Ok(load_accounts(&self.conn)?
            .into_iter()
            .filter(|account| account.balance > Decimal::ZERO)
            .collect())
    }

    fn set_balance(
        &mut self,
        account: &AccountId,
        balance: Decimal,
        at: DateTime<Utc>,
    ) -> LedgerResult<()> {
        let updated = self.conn.execute(
            "UPDATE accounts SET balance = ?1, updated_at = ?2 WHERE account_id = ?3",
            params![balance.to_string(), encode_time(at), account.as_str()],
        )?;
        if updated != 1 {
            return Err(LedgerError::InvalidState(format!("unknown account {account}")));
        }
        Ok(())
    }

    fn append_entry(&mut self, entry: LedgerEntry) -> LedgerResult<LedgerEntry> {
        self.conn.execute(
            "INSERT INTO ledger_entries (
                entry_id, user_id, account_id, amount, kind, counterpart_account,
                counterpart_name, description, status, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                entry.id.to_string(),
                entry.user_id.as_str(),
                entry.account_id.as_str(),
                entry.amount.to_string(),
                entry.kind.as_str(),
                entry.counterpart_account.as_ref().map(|id| id.to_string()),
                entry.counterpart_name,
                entry.description,
                entry.status.as_str(),
                encode_time(entry.created_at),
            ],
        )?;
        let sequence = self.conn.last_insert_rowid() as u64;
        Ok(entry.with_sequence(sequence))
    }

    fn marker(&mut self, date: NaiveDate) -> LedgerResult<Option<AccrualMarker>> {
        load_marker(&self.conn, date)
    }

    fn insert_marker(&mut self, marker: &AccrualMarker) -> LedgerResult<bool> {
        let inserted = self.conn.execute(
            "INSERT INTO accrual_markers (
                calculation_date, accounts_processed, total_interest_paid, initiator, calculated_at
             ) VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(calculation_date) DO NOTHING",
            params![
                marker.calculation_date.to_string(),
                i64::from(marker.accounts_processed),
                marker.total_interest_paid.to_string(),
                marker.initiator.as_str(),
                encode_time(marker.calculated_at),
            ],
        )?;
        Ok(inserted == 1)
    }

    fn insert_contract(&mut self, contract: &TermDepositContract) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO term_deposit_contracts (
                contract_id, user_id, account_id, principal, term_months, interest_rate,
                total_return, maturity_date, status, created_at
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                contract.id.to_string(),
                contract.user_id.as_str(),
                contract.account_id.as_str(),
                contract.principal.to_string(),
                i64::from(contract.term_months),
                contract.interest_rate.to_string(),
                contract.total_return.to_string(),
                encode_time(contract.maturity_date),
                contract.status.as_str(),
                encode_time(contract.created_at),
            ],
        )?;
        Ok(())
    }

    fn commit(mut self: Box<Self>) -> LedgerResult<()> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }
}

impl BankStore for SqliteBankStore {
    fn begin(&self) -> LedgerResult<Box<dyn LedgerTx + '_>> {
        let conn = self.connect()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(Box::new(SqliteTx {
            conn,
            finished: false,
        }))
    }

    fn open_account(&self, account: NewAccount) -> LedgerResult<AccountBalance> {
        let conn = self.connect()?;
        let balance = account.into_balance(Utc::now());
        conn.execute(
            &format!("INSERT INTO accounts ({ACCOUNT_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5)"),
            params![
                balance.account_id.as_str(),
                balance.user_id.as_str(),
                balance.balance.to_string(),
                balance.currency.code(),
                encode_time(balance.updated_at),
            ],
        )?;
        Ok(balance)
    }

    fn account(&self, id: &AccountId) -> LedgerResult<Option<AccountBalance>> {
        load_account(&self.connect()?, "account_id", id.as_str())
    }

    fn account_for_user(&self, user: &UserId) -> LedgerResult<Option<AccountBalance>> {
        load_account(&self.connect()?, "user_id", user.as_str())
    }

    fn accounts(&self) -> LedgerResult<Vec<AccountBalance>> {
        load_accounts(&self.connect()?)
    }

    fn entries(&self, query: LedgerQuery) -> LedgerResult<Vec<LedgerEntry>> {
        let conn = self.connect()?;
        let mut sql = format!(
            "SELECT {ENTRY_COLUMNS}
             FROM ledger_entries
             WHERE (?1 IS NULL OR account_id = ?1)
               AND (?2 IS NULL OR user_id = ?2)
               AND (?3 IS NULL OR kind = ?3)
               AND (?4 IS NULL OR created_at >= ?4)
               AND (?5 IS NULL OR created_at <= ?5)"
        );
        sql.push_str(if query.ascending {
            " ORDER BY sequence ASC"
        } else {
            " ORDER BY sequence DESC"
        });
        if query.limit.is_some() {
            sql.push_str(" LIMIT ?6");
        }

        let mut params: Vec<Value> = Vec::with_capacity(6);
        params.push(optional_text(query.account.map(|id| id.to_string())));
        params.push(optional_text(query.user.map(|id| id.to_string())));
        params.push(optional_text(query.kind.map(|kind| kind.as_str().to_string())));
        params.push(optional_text(query.start_time.map(encode_time)));
        params.push(optional_text(query.end_time.map(encode_time)));
        if let Some(limit) = query.limit {
            params.push(Value::Integer(limit as i64));
        }

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(row_to_entry(row)?);
        }
        Ok(entries)
    }

    fn marker(&self, date: NaiveDate) -> LedgerResult<Option<AccrualMarker>> {
        load_marker(&self.connect()?, date)
    }

    fn contracts(&self, user: Option<&UserId>) -> LedgerResult<Vec<TermDepositContract>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {CONTRACT_COLUMNS} FROM term_deposit_contracts
             WHERE (?1 IS NULL OR user_id = ?1)
             ORDER BY created_at ASC"
        ))?;
        let mut rows = stmt.query(params![user.map(|id| id.to_string())])?;
        let mut contracts = Vec::new();
        while let Some(row) = rows.next()? {
            contracts.push(row_to_contract(row)?);
        }
        Ok(contracts)
    }

    fn update_entry_status(&self, id: Uuid, status: TransactionStatus) -> LedgerResult<()> {
        let conn = self.connect()?;
        let updated = conn.execute(
            "UPDATE ledger_entries SET status = ?1 WHERE entry_id = ?2",
            params![status.as_str(), id.to_string()],
        )?;
        if updated != 1 {
            return Err(LedgerError::InvalidState(format!("unknown ledger entry {id}")));
        }
        Ok(())
    }
}

fn load_account(conn: &Connection, column: &str, key: &str) -> LedgerResult<Option<AccountBalance>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE {column} = ?1"
    ))?;
    let mut rows = stmt.query(params![key])?;
    match rows.next()? {
        Some(row) => Ok(Some(row_to_account(row)?)),
        None => Ok(None),
    }
}

fn load_accounts(conn: &Connection) -> LedgerResult<Vec<AccountBalance>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY account_id ASC"
    ))?;
    let mut rows = stmt.query([])?;
    let mut accounts = Vec::new();
    while let Some(row) = rows.next()? {
        accounts.push(row_to_account(row)?);
    }
    Ok(accounts)
}

fn load_marker(conn: &Connection, date: NaiveDate) -> LedgerResult<Option<AccrualMarker>> {
    let raw = conn
        .query_row(
            &format!("SELECT {MARKER_COLUMNS} FROM accrual_markers WHERE calculation_date = ?1"),
            params![date.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        )
        .optional()?;
    let Some((date_str, processed, total, initiator, calculated_at)) = raw else {
        return Ok(None);
    };
    Ok(Some(AccrualMarker {
        calculation_date: NaiveDate::from_str(&date_str).map_err(|err| {
            LedgerError::Serialization(format!("invalid calculation date {date_str}: {err}"))
        })?,
        accounts_processed: u32::try_from(processed).map_err(|err| {
            LedgerError::Serialization(format!("invalid accounts processed {processed}: {err}"))
        })?,
        total_interest_paid: parse_decimal(&total)?,
        initiator: initiator
            .parse()
            .map_err(|err| LedgerError::Serialization(format!("{err}")))?,
        calculated_at: parse_time(&calculated_at)?,
    }))
}

fn encode_time(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn optional_text(value: Option<String>) -> Value {
    value.map(Value::from).unwrap_or(Value::Null)
}

fn parse_time(value: &str) -> LedgerResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)
        .map_err(|err| LedgerError::Serialization(format!("invalid timestamp {value}: {err}")))?
        .with_timezone(&Utc))
}

fn parse_decimal(value: &str) -> LedgerResult<Decimal> {
    Decimal::from_str(value)
        .map_err(|err| LedgerError::Serialization(format!("invalid decimal {value}: {err}")))
}

fn parse_uuid(value: &str) -> LedgerResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|err| LedgerError::Serialization(format!("invalid id {value}: {err}")))
}

fn row_to_account(row: &rusqlite::Row<'_>) -> LedgerResult<AccountBalance> {
    let account_id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let balance: String = row.get(2)?;
    let currency: String = row.get(3)?;
    let updated_at: String = row.get(4)?;
    Ok(AccountBalance {
        account_id: AccountId::new(account_id),
        user_id: UserId::new(user_id),
        balance: parse_decimal(&balance)?,
        currency: Currency::new(currency),
        updated_at: parse_time(&updated_at)?,
    })
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> LedgerResult<LedgerEntry> {
    let sequence: i64 = row.get(0)?;
    let entry_id: String = row.get(1)?;
    let user_id: String = row.get(2)?;
    let account_id: String = row.get(3)?;
    let amount: String = row.get(4)?;
    let kind: String = row.get(5)?;
    let counterpart_account: Option<String> = row.get(6)?;
    let counterpart_name: Option<String> = row.get(7)?;
    let description: String = row.get(8)?;
    let status: String = row.get(9)?;
    let created_at: String = row.get(10)?;

    Ok(LedgerEntry {
        id: parse_uuid(&entry_id)?,
        sequence: sequence as u64,
        user_id: UserId::new(user_id),
        account_id: AccountId::new(account_id),
        amount: parse_decimal(&amount)?,
        kind: kind
            .parse()
            .map_err(|err| LedgerError::Serialization(format!("{err}")))?,
        counterpart_account: counterpart_account.map(AccountId::new),
        counterpart_name,
        description,
        status: status
            .parse()
            .map_err(|err| LedgerError::Serialization(format!("{err}")))?,
        created_at: parse_time(&created_at)?,
    })
}

fn row_to_contract(row: &rusqlite::Row<'_>) -> LedgerResult<TermDepositContract> {
    let contract_id: String = row.get(0)?;
    let user_id: String = row.get(1)?;
    let account_id: String = row.get(2)?;
    let principal: String = row.get(3)?;
    let term_months: i64 = row.get(4)?;
    let interest_rate: String = row.get(5)?;
    let total_return: String = row.get(6)?;
    let maturity_date: String = row.get(7)?;
    let status: String = row.get(8)?;
    let created_at: String = row.get(9)?;

    Ok(TermDepositContract {
        id: parse_uuid(&contract_id)?,
        user_id: UserId::new(user_id),
        account_id: AccountId::new(account_id),
        principal: parse_decimal(&principal)?,
        term_months: u32::try_from(term_months).map_err(|err| {
            LedgerError::Serialization(format!("invalid term {term_months}: {err}"))
        })?,
        interest_rate: parse_decimal(&interest_rate)?,
        total_return: parse_decimal(&total_return)?,
        maturity_date: parse_time(&maturity_date)?,
        status: status
            .parse()
            .map_err(|err| LedgerError::Serialization(format!("{err}")))?,
        created_at: parse_time(&created_at)?,
    })
}
