//! Abstract store interface consumed by the promise ledger.
//!
//! # Responsibility
//! - Define the account directory contract.
//! - Define atomic promise units: load a promise with both parties, let the
//!   caller decide, then commit promise, balances and history together.
//!
//! # Invariants
//! - A unit whose closure returns `Err` leaves no trace in the store.
//! - Units on the same promise are serialized; the second one observes the
//!   committed result of the first.
//! - Nothing outside a unit writes balances.

use crate::db::DbError;
use crate::model::account::{Account, AccountId, BalanceError};
use crate::model::promise::{
    Promise, PromiseAction, PromiseEvent, PromiseId, PromiseStatus, PromiseValidationError,
};
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RepoResult<T> = Result<T, RepoError>;

/// Persistence-layer error shared by every store backend.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    Validation(PromiseValidationError),
    AccountNotFound(AccountId),
    PromiseNotFound(PromiseId),
    /// Requested opening balance is outside the storable range.
    Balance(BalanceError),
    /// Compare-and-swap on the promise status lost against another writer.
    StatusConflict {
        promise_id: PromiseId,
        expected: PromiseStatus,
    },
    /// Persisted data cannot be converted to a valid domain record.
    InvalidData(String),
    /// Connection schema is not at the expected migrated version.
    UninitializedConnection {
        expected_version: u32,
        actual_version: u32,
    },
    /// Required table is missing.
    MissingRequiredTable(&'static str),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::AccountNotFound(id) => write!(f, "account not found: {id}"),
            Self::PromiseNotFound(id) => write!(f, "promise not found: {id}"),
            Self::Balance(err) => write!(f, "{err}"),
            Self::StatusConflict {
                promise_id,
                expected,
            } => write!(
                f,
                "promise {promise_id} is no longer `{expected}`; concurrent update won"
            ),
            Self::InvalidData(message) => write!(f, "invalid persisted ledger data: {message}"),
            Self::UninitializedConnection {
                expected_version,
                actual_version,
            } => write!(
                f,
                "ledger store requires schema version {expected_version}, got {actual_version}"
            ),
            Self::MissingRequiredTable(table) => {
                write!(f, "ledger store requires table `{table}`")
            }
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Balance(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<BalanceError> for RepoError {
    fn from(value: BalanceError) -> Self {
        Self::Balance(value)
    }
}

impl From<PromiseValidationError> for RepoError {
    fn from(value: PromiseValidationError) -> Self {
        Self::Validation(value)
    }
}

/// Account directory: creation and read access to balances.
///
/// Balance writes happen only inside `LedgerStore` units, through
/// `Account::credit` and `Account::debit`.
pub trait AccountDirectory {
    /// Creates an account holding `initial_balance` vows.
    ///
    /// Fails with `RepoError::Balance` above `MAX_BALANCE`.
    fn create_account(&self, initial_balance: u64) -> RepoResult<Account>;
    fn get_account(&self, id: AccountId) -> RepoResult<Option<Account>>;
    /// Lists accounts in creation order.
    fn list_accounts(&self) -> RepoResult<Vec<Account>>;

    /// Current balance, or `AccountNotFound`.
    fn balance(&self, id: AccountId) -> RepoResult<u64> {
        self.get_account(id)?
            .map(|account| account.balance)
            .ok_or(RepoError::AccountNotFound(id))
    }
}

/// Owned copies of everything one ledger operation may touch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workset {
    pub promise: Promise,
    pub promiser: Account,
    pub promisee: Account,
    /// Sequence number the next history event must carry.
    pub next_sequence: u32,
}

impl Workset {
    /// Builds the history event for a transition out of `from`.
    pub fn event(
        &self,
        action: PromiseAction,
        actor_id: AccountId,
        from: Option<PromiseStatus>,
        at: i64,
    ) -> PromiseEvent {
        PromiseEvent {
            promise_id: self.promise.id,
            sequence: self.next_sequence,
            action,
            actor_id,
            from_status: from,
            to_status: self.promise.status,
            at,
        }
    }
}

/// Point-in-time copy of every account and promise.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub accounts: Vec<Account>,
    /// Promises in insertion order.
    pub promises: Vec<Promise>,
}

/// Store interface the promise ledger is built against.
pub trait LedgerStore: AccountDirectory {
    /// Inserts `draft` atomically with its creating side effects.
    ///
    /// Loads both parties (`AccountNotFound` if either is missing), runs
    /// `apply` on owned copies and, on `Ok`, persists the promise, both
    /// balances and the returned event as one unit.
    fn insert_promise<E, F>(&self, draft: Promise, apply: F) -> Result<Promise, E>
    where
        F: FnOnce(&mut Workset) -> Result<PromiseEvent, E>,
        E: From<RepoError>;

    /// Transitions an existing promise atomically.
    ///
    /// Holds the promise and both parties exclusively while `apply` runs.
    /// On `Ok`, persists the new status, `resolved_at`, both balances and
    /// the returned event as one unit. `PromiseNotFound` if `id` is unknown.
    fn update_promise<E, F>(&self, id: PromiseId, apply: F) -> Result<Promise, E>
    where
        F: FnOnce(&mut Workset) -> Result<PromiseEvent, E>,
        E: From<RepoError>;

    fn get_promise(&self, id: PromiseId) -> RepoResult<Option<Promise>>;

    /// Promises where `account_id` is a party, in insertion order.
    fn list_promises_for_account(&self, account_id: AccountId) -> RepoResult<Vec<Promise>>;

    /// History of one promise ordered by sequence.
    fn list_promise_events(&self, id: PromiseId) -> RepoResult<Vec<PromiseEvent>>;

    /// Consistent copy of all accounts and promises.
    fn snapshot(&self) -> RepoResult<LedgerSnapshot>;
}
