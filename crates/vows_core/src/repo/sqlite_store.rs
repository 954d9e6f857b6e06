//! Durable ledger store on SQLite.
//!
//! # Responsibility
//! - Run every ledger unit inside one `BEGIN IMMEDIATE` transaction.
//! - Commit promise status, balances and history together or not at all.
//!
//! # Invariants
//! - A closure error rolls the whole transaction back.
//! - Status writes are compare-and-swap on the status read at unit start.
//! - One connection is shared behind a mutex, so units on this store run one
//!   at a time. SQLite admits a single writer anyway; this bounds throughput,
//!   not correctness.

use crate::db::{open_db, open_db_in_memory};
use crate::model::account::{Account, AccountId};
use crate::model::promise::{Promise, PromiseEvent, PromiseId};
use crate::repo::account_repo::SqliteAccountRepository;
use crate::repo::promise_repo::SqlitePromiseRepository;
use crate::repo::schema::ensure_ledger_schema;
use crate::repo::store::{
    AccountDirectory, LedgerSnapshot, LedgerStore, RepoError, RepoResult, Workset,
};
use parking_lot::Mutex;
use rusqlite::{Connection, Transaction, TransactionBehavior};
use std::path::Path;

/// Ledger store persisting to one SQLite connection.
pub struct SqliteLedgerStore {
    conn: Mutex<Connection>,
}

impl SqliteLedgerStore {
    /// Wraps a connection returned by `open_db`/`open_db_in_memory`.
    pub fn new(conn: Connection) -> RepoResult<Self> {
        ensure_ledger_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens (and migrates) a database file.
    pub fn open(path: impl AsRef<Path>) -> RepoResult<Self> {
        Self::new(open_db(path)?)
    }

    pub fn open_in_memory() -> RepoResult<Self> {
        Self::new(open_db_in_memory()?)
    }

    fn with_transaction<T, E>(&self, op: impl FnOnce(&Connection) -> Result<T, E>) -> Result<T, E>
    where
        E: From<RepoError>,
    {
        let conn = self.conn.lock();
        let tx = Transaction::new_unchecked(&conn, TransactionBehavior::Immediate)
            .map_err(RepoError::from)?;
        let value = op(&tx)?;
        tx.commit().map_err(RepoError::from)?;
        Ok(value)
    }
}

impl AccountDirectory for SqliteLedgerStore {
    fn create_account(&self, initial_balance: u64) -> RepoResult<Account> {
        let conn = self.conn.lock();
        SqliteAccountRepository::within(&conn).create_account(initial_balance)
    }

    fn get_account(&self, id: AccountId) -> RepoResult<Option<Account>> {
        let conn = self.conn.lock();
        SqliteAccountRepository::within(&conn).get_account(id)
    }

    fn list_accounts(&self) -> RepoResult<Vec<Account>> {
        let conn = self.conn.lock();
        SqliteAccountRepository::within(&conn).list_accounts()
    }
}

impl LedgerStore for SqliteLedgerStore {
    fn insert_promise<E, F>(&self, draft: Promise, apply: F) -> Result<Promise, E>
    where
        F: FnOnce(&mut Workset) -> Result<PromiseEvent, E>,
        E: From<RepoError>,
    {
        draft.validate().map_err(RepoError::from)?;

        self.with_transaction(|conn| {
            let accounts = SqliteAccountRepository::within(conn);
            let promises = SqlitePromiseRepository::within(conn);

            let mut workset = Workset {
                promiser: accounts.load_required(draft.promiser_id)?,
                promisee: accounts.load_required(draft.promisee_id)?,
                promise: draft,
                next_sequence: 1,
            };
            let event = apply(&mut workset)?;

            promises.insert_promise(&workset.promise)?;
            accounts.store_balance(&workset.promiser)?;
            accounts.store_balance(&workset.promisee)?;
            promises.append_event(&event)?;
            Ok(workset.promise)
        })
    }

    fn update_promise<E, F>(&self, id: PromiseId, apply: F) -> Result<Promise, E>
    where
        F: FnOnce(&mut Workset) -> Result<PromiseEvent, E>,
        E: From<RepoError>,
    {
        self.with_transaction(|conn| {
            let accounts = SqliteAccountRepository::within(conn);
            let promises = SqlitePromiseRepository::within(conn);

            let promise = promises
                .get_promise(id)?
                .ok_or(RepoError::PromiseNotFound(id))?;
            let expected = promise.status;
            let mut workset = Workset {
                promiser: accounts.load_required(promise.promiser_id)?,
                promisee: accounts.load_required(promise.promisee_id)?,
                next_sequence: promises.next_event_sequence(id)?,
                promise,
            };
            let event = apply(&mut workset)?;

            promises.update_status(&workset.promise, expected)?;
            accounts.store_balance(&workset.promiser)?;
            accounts.store_balance(&workset.promisee)?;
            promises.append_event(&event)?;
            Ok(workset.promise)
        })
    }

    fn get_promise(&self, id: PromiseId) -> RepoResult<Option<Promise>> {
        let conn = self.conn.lock();
        SqlitePromiseRepository::within(&conn).get_promise(id)
    }

    fn list_promises_for_account(&self, account_id: AccountId) -> RepoResult<Vec<Promise>> {
        let conn = self.conn.lock();
        SqlitePromiseRepository::within(&conn).list_for_account(account_id)
    }

    fn list_promise_events(&self, id: PromiseId) -> RepoResult<Vec<PromiseEvent>> {
        let conn = self.conn.lock();
        SqlitePromiseRepository::within(&conn).list_events(id)
    }

    fn snapshot(&self) -> RepoResult<LedgerSnapshot> {
        self.with_transaction(|conn| {
            Ok(LedgerSnapshot {
                accounts: SqliteAccountRepository::within(conn).list_accounts()?,
                promises: SqlitePromiseRepository::within(conn).list_all()?,
            })
        })
    }
}
