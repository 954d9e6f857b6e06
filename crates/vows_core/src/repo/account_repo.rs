//! SQLite account directory.
//!
//! # Responsibility
//! - Create and read `accounts` rows.
//! - Persist balances computed inside ledger units.
//!
//! # Invariants
//! - Read paths reject negative or malformed persisted balances instead of
//!   masking them.

use crate::model::account::{Account, AccountId};
use crate::model::now_epoch_ms;
use crate::repo::schema::ensure_ledger_schema;
use crate::repo::store::{AccountDirectory, RepoError, RepoResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use uuid::Uuid;

const ACCOUNT_SELECT_SQL: &str = "SELECT id, balance, created_at FROM accounts";

/// SQLite-backed account directory over a borrowed connection.
///
/// Accepts a `Transaction` through deref, so ledger units can share it.
pub struct SqliteAccountRepository<'conn> {
    conn: &'conn Connection,
}

impl<'conn> SqliteAccountRepository<'conn> {
    /// Creates repository from migrated connection.
    pub fn try_new(conn: &'conn Connection) -> RepoResult<Self> {
        ensure_ledger_schema(conn)?;
        Ok(Self { conn })
    }

    /// Wraps a connection already checked by the owning store.
    pub(crate) fn within(conn: &'conn Connection) -> Self {
        Self { conn }
    }

    /// Overwrites the stored balance of one account.
    pub(crate) fn store_balance(&self, account: &Account) -> RepoResult<()> {
        let changed = self.conn.execute(
            "UPDATE accounts SET balance = ?2 WHERE id = ?1;",
            params![account.id.to_string(), to_db_amount(account.balance)?],
        )?;
        if changed == 0 {
            return Err(RepoError::AccountNotFound(account.id));
        }
        Ok(())
    }

    /// Loads an account or fails with `AccountNotFound`.
    pub(crate) fn load_required(&self, id: AccountId) -> RepoResult<Account> {
        self.get_account(id)?.ok_or(RepoError::AccountNotFound(id))
    }
}

impl AccountDirectory for SqliteAccountRepository<'_> {
    fn create_account(&self, initial_balance: u64) -> RepoResult<Account> {
        let account = Account::open(initial_balance, now_epoch_ms())?;
        self.conn.execute(
            "INSERT INTO accounts (id, balance, created_at) VALUES (?1, ?2, ?3);",
            params![
                account.id.to_string(),
                to_db_amount(account.balance)?,
                account.created_at,
            ],
        )?;
        Ok(account)
    }

    fn get_account(&self, id: AccountId) -> RepoResult<Option<Account>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ACCOUNT_SELECT_SQL} WHERE id = ?1;"))?;
        let row = stmt
            .query_row([id.to_string()], |row| Ok(parse_account_row(row)))
            .optional()?;
        row.transpose()
    }

    fn list_accounts(&self) -> RepoResult<Vec<Account>> {
        let mut stmt = self
            .conn
            .prepare(&format!("{ACCOUNT_SELECT_SQL} ORDER BY rowid ASC;"))?;
        let mut rows = stmt.query([])?;
        let mut accounts = Vec::new();
        while let Some(row) = rows.next()? {
            accounts.push(parse_account_row(row)?);
        }
        Ok(accounts)
    }
}

fn parse_account_row(row: &Row<'_>) -> RepoResult<Account> {
    let id_text: String = row.get("id")?;
    Ok(Account {
        id: parse_uuid(&id_text, "accounts.id")?,
        balance: from_db_amount(row.get("balance")?, "accounts.balance")?,
        created_at: row.get("created_at")?,
    })
}

pub(crate) fn parse_uuid(value: &str, column: &'static str) -> RepoResult<Uuid> {
    Uuid::parse_str(value)
        .map_err(|_| RepoError::InvalidData(format!("invalid uuid `{value}` in {column}")))
}

pub(crate) fn to_db_amount(value: u64) -> RepoResult<i64> {
    i64::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("amount {value} exceeds storage range")))
}

pub(crate) fn from_db_amount(value: i64, column: &'static str) -> RepoResult<u64> {
    u64::try_from(value)
        .map_err(|_| RepoError::InvalidData(format!("negative amount `{value}` in {column}")))
}
