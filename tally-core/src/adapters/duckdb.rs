//! DuckDB repository implementation

use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use duckdb::{params, Connection};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::result::{Error, Result};
use crate::domain::{Transaction, TransactionKind, User};
use crate::ports::Repository;
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of attempts when the database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

const USER_COLUMNS: &str = "user_id, email, password_hash, firstname, balance::VARCHAR, \
                            token, verified, verification_token";

const TRANSACTION_COLUMNS: &str =
    "transaction_id, kind, category, amount::VARCHAR, date, comment, owner_id";

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

/// DuckDB-backed record store
///
/// A single connection guarded by a mutex. Amounts and balances live in
/// `DECIMAL(18,2)` columns and cross the driver boundary as strings so no
/// precision is lost to floats.
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
}

impl DuckDbRepository {
    /// Open (or create) a database file
    ///
    /// Retries with exponential backoff when another process holds the file.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut attempt = 0;
        loop {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                    })
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if !is_retryable_error(&err_msg) || attempt + 1 >= MAX_RETRIES {
                        return Err(e.into());
                    }
                    let delay = Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                    eprintln!(
                        "[tally] Database busy, retrying in {}ms (attempt {}/{}): {}",
                        delay.as_millis(),
                        attempt + 1,
                        MAX_RETRIES,
                        err_msg
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }

    /// Private in-memory database, gone when dropped
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn try_open_connection(db_path: &Path) -> duckdb::Result<Connection> {
        // Extension autoloading stays off; nothing here needs one
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        Connection::open_with_flags(db_path, config)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::database("Database connection lock poisoned"))
    }

    /// Run pending migrations and report what was applied
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.conn()?;
        MigrationService::new(&conn).run_pending()
    }

    fn query_user(&self, column: &str, value: &str) -> Result<Option<User>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {USER_COLUMNS} FROM sys_users WHERE {column} = ?");
        let mut stmt = conn.prepare(&sql)?;
        let row = stmt.query_map([value], UserRow::read)?.next().transpose()?;
        row.map(UserRow::into_user).transpose()
    }

    fn query_transactions(&self, filter: Option<&str>, value: &[&str]) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;
        let sql = match filter {
            Some(column) => format!(
                "SELECT {TRANSACTION_COLUMNS} FROM sys_transactions WHERE {column} = ? ORDER BY seq"
            ),
            None => format!("SELECT {TRANSACTION_COLUMNS} FROM sys_transactions ORDER BY seq"),
        };
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(duckdb::params_from_iter(value), TransactionRow::read)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        // Rows with an unknown kind never surface
        Ok(rows.into_iter().filter_map(TransactionRow::decode).collect())
    }
}

impl Repository for DuckDbRepository {
    fn ensure_schema(&self) -> Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    // === Users ===

    fn insert_user(&self, user: &User) -> Result<()> {
        let conn = self.conn()?;
        let taken: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sys_users WHERE email = ?",
            [&user.email],
            |row| row.get(0),
        )?;
        if taken > 0 {
            return Err(Error::conflict("Email in use"));
        }

        conn.execute(
            "INSERT INTO sys_users (user_id, email, password_hash, firstname, balance,
                                    token, verified, verification_token)
             VALUES (?, ?, ?, ?, CAST(? AS DECIMAL(18,2)), ?, ?, ?)",
            params![
                user.id.to_string(),
                user.email,
                user.password_hash,
                user.firstname,
                user.balance.to_string(),
                user.token,
                user.verified,
                user.verification_token,
            ],
        )?;
        Ok(())
    }

    fn get_user_by_id(&self, id: Uuid) -> Result<Option<User>> {
        self.query_user("user_id", &id.to_string())
    }

    fn get_user_by_email(&self, email: &str) -> Result<Option<User>> {
        self.query_user("email", email)
    }

    fn get_user_by_verification_token(&self, token: &str) -> Result<Option<User>> {
        self.query_user("verification_token", token)
    }

    fn get_user_by_token(&self, token: &str) -> Result<Option<User>> {
        self.query_user("token", token)
    }

    fn list_users(&self) -> Result<Vec<User>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {USER_COLUMNS} FROM sys_users ORDER BY email");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], UserRow::read)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(UserRow::into_user).collect()
    }

    fn mark_verified(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE sys_users SET verified = TRUE, verification_token = NULL WHERE user_id = ?",
            [id.to_string()],
        )?;
        Ok(updated > 0)
    }

    fn set_user_token(&self, id: Uuid, token: Option<&str>) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE sys_users SET token = ? WHERE user_id = ?",
            params![token, id.to_string()],
        )?;
        Ok(updated > 0)
    }

    fn get_user_balance(&self, id: Uuid) -> Result<Option<Decimal>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT balance::VARCHAR FROM sys_users WHERE user_id = ?")?;
        let raw: Option<String> = stmt
            .query_map([id.to_string()], |row| row.get(0))?
            .next()
            .transpose()?;
        raw.map(|value| parse_decimal(&value)).transpose()
    }

    fn set_user_balance(&self, id: Uuid, balance: Decimal) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE sys_users SET balance = CAST(? AS DECIMAL(18,2)) WHERE user_id = ?",
            params![balance.to_string(), id.to_string()],
        )?;
        Ok(updated > 0)
    }

    // === Transactions ===

    fn insert_transaction(&self, tx: &Transaction) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO sys_transactions (transaction_id, kind, category, amount, date, comment, owner_id)
             VALUES (?, ?, ?, CAST(? AS DECIMAL(18,2)), ?, ?, ?)",
            params![
                tx.id.to_string(),
                tx.kind.as_str(),
                tx.category,
                tx.amount.to_string(),
                tx.date,
                tx.comment,
                tx.owner.to_string(),
            ],
        )?;
        Ok(())
    }

    fn get_transaction_by_id(&self, id: Uuid) -> Result<Option<Transaction>> {
        let id = id.to_string();
        let found = self.query_transactions(Some("transaction_id"), &[id.as_str()])?;
        Ok(found.into_iter().next())
    }

    fn get_transactions_by_owner(&self, owner: Uuid) -> Result<Vec<Transaction>> {
        let owner = owner.to_string();
        self.query_transactions(Some("owner_id"), &[owner.as_str()])
    }

    fn get_transactions(&self) -> Result<Vec<Transaction>> {
        self.query_transactions(None, &[])
    }

    fn replace_transaction(&self, tx: &Transaction) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE sys_transactions
             SET kind = ?, category = ?, amount = CAST(? AS DECIMAL(18,2)),
                 date = ?, comment = ?, owner_id = ?
             WHERE transaction_id = ?",
            params![
                tx.kind.as_str(),
                tx.category,
                tx.amount.to_string(),
                tx.date,
                tx.comment,
                tx.owner.to_string(),
                tx.id.to_string(),
            ],
        )?;
        Ok(updated > 0)
    }

    fn delete_transaction(&self, id: Uuid) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute(
            "DELETE FROM sys_transactions WHERE transaction_id = ?",
            [id.to_string()],
        )?;
        Ok(deleted > 0)
    }
}

fn parse_decimal(raw: &str) -> Result<Decimal> {
    Decimal::from_str(raw).map_err(|e| Error::database(format!("Corrupt amount {raw:?}: {e}")))
}

fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| Error::database(format!("Corrupt id {raw:?}: {e}")))
}

/// Raw `sys_users` row as read from the driver
struct UserRow {
    id: String,
    email: String,
    password_hash: String,
    firstname: String,
    balance: String,
    token: Option<String>,
    verified: bool,
    verification_token: Option<String>,
}

impl UserRow {
    fn read(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            password_hash: row.get(2)?,
            firstname: row.get(3)?,
            balance: row.get(4)?,
            token: row.get(5)?,
            verified: row.get(6)?,
            verification_token: row.get(7)?,
        })
    }

    fn into_user(self) -> Result<User> {
        Ok(User {
            id: parse_id(&self.id)?,
            email: self.email,
            password_hash: self.password_hash,
            firstname: self.firstname,
            balance: parse_decimal(&self.balance)?,
            token: self.token,
            verified: self.verified,
            verification_token: self.verification_token,
        })
    }
}

/// Raw `sys_transactions` row as read from the driver
struct TransactionRow {
    id: String,
    kind: String,
    category: String,
    amount: String,
    date: String,
    comment: Option<String>,
    owner: String,
}

impl TransactionRow {
    fn read(row: &duckdb::Row) -> duckdb::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            category: row.get(2)?,
            amount: row.get(3)?,
            date: row.get(4)?,
            comment: row.get(5)?,
            owner: row.get(6)?,
        })
    }

    fn decode(self) -> Option<Transaction> {
        Some(Transaction {
            id: parse_id(&self.id).ok()?,
            kind: TransactionKind::from_str(&self.kind).ok()?,
            category: self.category,
            amount: parse_decimal(&self.amount).ok()?,
            date: self.date,
            comment: self.comment,
            owner: parse_id(&self.owner).ok()?,
        })
    }
}
