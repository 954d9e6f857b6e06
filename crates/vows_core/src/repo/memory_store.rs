//! In-process ledger store with per-entity locking.
//!
//! # Responsibility
//! - Keep accounts, promises and promise history in memory.
//! - Serialize units per promise and per account, never globally.
//!
//! # Invariants
//! - Lock order inside a unit: gate (shared), promise entry, then account
//!   entries sorted by id. Index locks are only held to clone an entry
//!   handle or to insert, never while waiting on an entry.
//! - `snapshot` takes the gate exclusively, so it never observes a unit
//!   half-applied.
//! - Closures run on copies; entries are written back only on `Ok`.

use crate::model::account::{Account, AccountId};
use crate::model::now_epoch_ms;
use crate::model::promise::{Promise, PromiseEvent, PromiseId};
use crate::repo::store::{
    AccountDirectory, LedgerSnapshot, LedgerStore, RepoError, RepoResult, Workset,
};
use parking_lot::{Mutex, MutexGuard, RwLock};
use std::collections::HashMap;
use std::sync::Arc;

type AccountEntry = Arc<Mutex<Account>>;
type PromiseEntry = Arc<Mutex<PromiseRecord>>;

#[derive(Debug)]
struct PromiseRecord {
    promise: Promise,
    events: Vec<PromiseEvent>,
}

#[derive(Debug, Default)]
struct AccountIndex {
    by_id: HashMap<AccountId, AccountEntry>,
    order: Vec<AccountId>,
}

#[derive(Debug, Default)]
struct PromiseIndex {
    by_id: HashMap<PromiseId, PromiseEntry>,
    order: Vec<PromiseId>,
}

/// Ledger store held entirely in process memory.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    gate: RwLock<()>,
    accounts: RwLock<AccountIndex>,
    promises: RwLock<PromiseIndex>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn account_entry(&self, id: AccountId) -> RepoResult<AccountEntry> {
        self.accounts
            .read()
            .by_id
            .get(&id)
            .cloned()
            .ok_or(RepoError::AccountNotFound(id))
    }

    fn promise_entry(&self, id: PromiseId) -> Option<PromiseEntry> {
        self.promises.read().by_id.get(&id).cloned()
    }

    fn promise_entries(&self) -> Vec<PromiseEntry> {
        let index = self.promises.read();
        index
            .order
            .iter()
            .filter_map(|id| index.by_id.get(id).cloned())
            .collect()
    }
}

/// Locks both party entries in id order and hands back (promiser, promisee).
fn lock_parties<'a>(
    promiser_id: AccountId,
    promiser: &'a AccountEntry,
    promisee: &'a AccountEntry,
    promisee_id: AccountId,
) -> (MutexGuard<'a, Account>, MutexGuard<'a, Account>) {
    if promiser_id < promisee_id {
        let first = promiser.lock();
        let second = promisee.lock();
        (first, second)
    } else {
        let first = promisee.lock();
        let second = promiser.lock();
        (second, first)
    }
}

impl AccountDirectory for MemoryLedgerStore {
    fn create_account(&self, initial_balance: u64) -> RepoResult<Account> {
        let account = Account::open(initial_balance, now_epoch_ms())?;
        let mut index = self.accounts.write();
        index
            .by_id
            .insert(account.id, Arc::new(Mutex::new(account.clone())));
        index.order.push(account.id);
        Ok(account)
    }

    fn get_account(&self, id: AccountId) -> RepoResult<Option<Account>> {
        let entry = self.accounts.read().by_id.get(&id).cloned();
        Ok(entry.map(|entry| entry.lock().clone()))
    }

    fn list_accounts(&self) -> RepoResult<Vec<Account>> {
        let entries: Vec<AccountEntry> = {
            let index = self.accounts.read();
            index
                .order
                .iter()
                .filter_map(|id| index.by_id.get(id).cloned())
                .collect()
        };
        Ok(entries.iter().map(|entry| entry.lock().clone()).collect())
    }
}

impl LedgerStore for MemoryLedgerStore {
    fn insert_promise<E, F>(&self, draft: Promise, apply: F) -> Result<Promise, E>
    where
        F: FnOnce(&mut Workset) -> Result<PromiseEvent, E>,
        E: From<RepoError>,
    {
        draft.validate().map_err(RepoError::from)?;

        let _gate = self.gate.read();
        let promiser_entry = self.account_entry(draft.promiser_id)?;
        let promisee_entry = self.account_entry(draft.promisee_id)?;
        let (mut promiser, mut promisee) = lock_parties(
            draft.promiser_id,
            &promiser_entry,
            &promisee_entry,
            draft.promisee_id,
        );

        let mut workset = Workset {
            promise: draft,
            promiser: promiser.clone(),
            promisee: promisee.clone(),
            next_sequence: 1,
        };
        let event = apply(&mut workset)?;
        workset.promise.validate().map_err(RepoError::from)?;

        {
            let mut index = self.promises.write();
            if index.by_id.contains_key(&workset.promise.id) {
                return Err(RepoError::InvalidData(format!(
                    "duplicate promise id {}",
                    workset.promise.id
                ))
                .into());
            }
            index.by_id.insert(
                workset.promise.id,
                Arc::new(Mutex::new(PromiseRecord {
                    promise: workset.promise.clone(),
                    events: vec![event],
                })),
            );
            index.order.push(workset.promise.id);
        }
        *promiser = workset.promiser;
        *promisee = workset.promisee;
        Ok(workset.promise)
    }

    fn update_promise<E, F>(&self, id: PromiseId, apply: F) -> Result<Promise, E>
    where
        F: FnOnce(&mut Workset) -> Result<PromiseEvent, E>,
        E: From<RepoError>,
    {
        let _gate = self.gate.read();
        let entry = self
            .promise_entry(id)
            .ok_or(RepoError::PromiseNotFound(id))?;
        let mut record = entry.lock();

        let promiser_id = record.promise.promiser_id;
        let promisee_id = record.promise.promisee_id;
        let promiser_entry = self.account_entry(promiser_id)?;
        let promisee_entry = self.account_entry(promisee_id)?;
        let (mut promiser, mut promisee) =
            lock_parties(promiser_id, &promiser_entry, &promisee_entry, promisee_id);

        let sequence = u32::try_from(record.events.len())
            .map_err(|_| RepoError::InvalidData(format!("history of {id} is too long")))?;
        let mut workset = Workset {
            promise: record.promise.clone(),
            promiser: promiser.clone(),
            promisee: promisee.clone(),
            next_sequence: sequence + 1,
        };
        let event = apply(&mut workset)?;
        workset.promise.validate().map_err(RepoError::from)?;

        record.promise.status = workset.promise.status;
        record.promise.resolved_at = workset.promise.resolved_at;
        record.events.push(event);
        *promiser = workset.promiser;
        *promisee = workset.promisee;
        Ok(record.promise.clone())
    }

    fn get_promise(&self, id: PromiseId) -> RepoResult<Option<Promise>> {
        Ok(self
            .promise_entry(id)
            .map(|entry| entry.lock().promise.clone()))
    }

    fn list_promises_for_account(&self, account_id: AccountId) -> RepoResult<Vec<Promise>> {
        Ok(self
            .promise_entries()
            .iter()
            .map(|entry| entry.lock().promise.clone())
            .filter(|promise| promise.involves(account_id))
            .collect())
    }

    fn list_promise_events(&self, id: PromiseId) -> RepoResult<Vec<PromiseEvent>> {
        Ok(self
            .promise_entry(id)
            .map(|entry| entry.lock().events.clone())
            .unwrap_or_default())
    }

    fn snapshot(&self) -> RepoResult<LedgerSnapshot> {
        let _gate = self.gate.write();
        Ok(LedgerSnapshot {
            accounts: self.list_accounts()?,
            promises: self
                .promise_entries()
                .iter()
                .map(|entry| entry.lock().promise.clone())
                .collect(),
        })
    }
}
