//! Ledger schema migrations.
//!
//! # Responsibility
//! - Register schema migrations in strictly increasing order.
//! - Apply pending migrations in one transaction, checking after each step
//!   that the vows held by the ledger are unchanged.
//!
//! # Invariants
//! - `version` values must remain monotonic.
//! - Applied migration version is mirrored to `PRAGMA user_version`.
//! - Held vows are account balances plus stakes escrowed by open promises.

use crate::db::{DbError, DbResult};
use crate::model::promise::PromiseStatus;
use log::info;
use rusqlite::{Connection, OptionalExtension};

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sql: include_str!("0001_accounts_promises.sql"),
    },
    Migration {
        version: 2,
        sql: include_str!("0002_promise_events.sql"),
    },
];

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

/// Applies all pending migrations on the provided connection.
///
/// # Errors
/// - `UnsupportedSchemaVersion` for a database written by a newer build.
/// - `LedgerValueChanged` when a step alters held vows; nothing is applied.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    run_migrations(conn, MIGRATIONS)
}

fn run_migrations(conn: &mut Connection, migrations: &[Migration]) -> DbResult<()> {
    let current_version = current_user_version(conn)?;
    let latest = migrations.last().map_or(0, |migration| migration.version);

    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }
    if current_version == latest {
        return Ok(());
    }

    let tx = conn.transaction()?;
    let held_before = held_vows(&tx)?;
    for migration in migrations
        .iter()
        .filter(|migration| migration.version > current_version)
    {
        tx.execute_batch(migration.sql)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;

        let held_after = held_vows(&tx)?;
        if held_after != held_before {
            return Err(DbError::LedgerValueChanged {
                version: migration.version,
                before: held_before,
                after: held_after,
            });
        }
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok from={current_version} to={latest} held_vows={held_before}"
    );
    Ok(())
}

/// Reads `PRAGMA user_version` from the connection.
pub fn current_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

/// Sum of balances and escrowed stakes; zero before the ledger tables exist.
fn held_vows(conn: &Connection) -> DbResult<u128> {
    let mut held: u128 = 0;

    if table_exists(conn, "accounts")? {
        let mut stmt = conn.prepare("SELECT balance FROM accounts;")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            held += non_negative(row.get(0)?, "accounts.balance")?;
        }
    }

    if table_exists(conn, "promises")? {
        let mut stmt = conn.prepare("SELECT status, stake FROM promises;")?;
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let status_text: String = row.get(0)?;
            let status = PromiseStatus::parse(&status_text).ok_or_else(|| {
                DbError::CorruptLedger(format!("invalid status `{status_text}` in promises"))
            })?;
            let stake = non_negative(row.get(1)?, "promises.stake")?;
            held += stake * u128::from(status.escrowed_stakes());
        }
    }

    Ok(held)
}

fn table_exists(conn: &Connection, table: &str) -> DbResult<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1;",
            [table],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

fn non_negative(value: i64, column: &str) -> DbResult<u128> {
    u128::try_from(value)
        .map_err(|_| DbError::CorruptLedger(format!("negative amount `{value}` in {column}")))
}
