use rusqlite::Connection;
use vows_core::db::open_db_in_memory;
use vows_core::{
    AccountDirectory, LedgerError, LedgerStore, MemoryLedgerStore, Promise, PromiseLedger,
    PromiseStatus, PromiseValidationError, RepoError, SqliteAccountRepository,
    SqliteLedgerStore, SqlitePromiseRepository,
};

#[test]
fn repositories_reject_uninitialized_connection() {
    let conn = Connection::open_in_memory().unwrap();

    let account_err = SqliteAccountRepository::try_new(&conn).err().unwrap();
    assert!(matches!(
        account_err,
        RepoError::UninitializedConnection {
            actual_version: 0,
            ..
        }
    ));
    assert!(SqlitePromiseRepository::try_new(&conn).is_err());
    assert!(SqliteLedgerStore::new(conn).is_err());
}

#[test]
fn status_update_is_compare_and_swap() {
    let conn = open_db_in_memory().unwrap();
    let accounts = SqliteAccountRepository::try_new(&conn).unwrap();
    let promises = SqlitePromiseRepository::try_new(&conn).unwrap();
    let a = accounts.create_account(100).unwrap();
    let b = accounts.create_account(100).unwrap();

    let mut promise = Promise::new(a.id, b.id, "wash car", 20, 1_000);
    promises.insert_promise(&promise).unwrap();

    promise.advance(PromiseStatus::Kept, 2_000);
    let err = promises
        .update_status(&promise, PromiseStatus::Accepted)
        .unwrap_err();
    assert!(matches!(
        err,
        RepoError::StatusConflict {
            expected: PromiseStatus::Accepted,
            ..
        }
    ));
    assert_eq!(
        promises.get_promise(promise.id).unwrap().unwrap().status,
        PromiseStatus::Pending
    );

    let mut accepted = promises.get_promise(promise.id).unwrap().unwrap();
    accepted.advance(PromiseStatus::Accepted, 1_500);
    promises
        .update_status(&accepted, PromiseStatus::Pending)
        .unwrap();
    assert_eq!(
        promises.get_promise(promise.id).unwrap().unwrap().status,
        PromiseStatus::Accepted
    );

    let stranger = Promise::new(a.id, b.id, "never stored", 1, 0);
    assert!(matches!(
        promises.update_status(&stranger, PromiseStatus::Pending),
        Err(RepoError::PromiseNotFound(_))
    ));
}

#[test]
fn corrupted_rows_are_reported_not_masked() {
    let conn = open_db_in_memory().unwrap();
    let accounts = SqliteAccountRepository::try_new(&conn).unwrap();
    let promises = SqlitePromiseRepository::try_new(&conn).unwrap();
    let a = accounts.create_account(100).unwrap();
    let b = accounts.create_account(100).unwrap();
    let promise = Promise::new(a.id, b.id, "wash car", 20, 1_000);
    promises.insert_promise(&promise).unwrap();

    conn.execute(
        "UPDATE promises SET description = '   ' WHERE id = ?1;",
        [promise.id.to_string()],
    )
    .unwrap();

    let err = promises.get_promise(promise.id).unwrap_err();
    assert!(matches!(
        err,
        RepoError::Validation(PromiseValidationError::EmptyDescription)
    ));
}

#[test]
fn ledger_state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("vows.sqlite3");

    let (a, b, kept_id, pending_id) = {
        let ledger = PromiseLedger::new(SqliteLedgerStore::open(&path).unwrap());
        let a = ledger.open_account().unwrap();
        let b = ledger.open_account().unwrap();
        let kept = ledger.create(a.id, b.id, "wash car", 20).unwrap();
        ledger.accept(kept.id, b.id).unwrap();
        ledger.resolve(kept.id, b.id, true).unwrap();
        let pending = ledger.create(b.id, a.id, "mow lawn", 5).unwrap();
        (a.id, b.id, kept.id, pending.id)
    };

    let ledger = PromiseLedger::new(SqliteLedgerStore::open(&path).unwrap());
    assert_eq!(ledger.balance(a).unwrap(), 110);
    assert_eq!(ledger.balance(b).unwrap(), 105);
    assert_eq!(
        ledger.get_by_id(kept_id).unwrap().status,
        PromiseStatus::Kept
    );
    assert_eq!(ledger.history(kept_id).unwrap().len(), 3);
    assert_eq!(
        ledger.get_by_id(pending_id).unwrap().status,
        PromiseStatus::Pending
    );
    assert_eq!(ledger.audit_conservation().unwrap().baseline(), 200);

    ledger.decline(pending_id, a).unwrap();
    assert_eq!(ledger.balance(b).unwrap(), 110);
}

#[test]
fn two_stores_on_one_file_see_each_other() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.sqlite3");
    let first = PromiseLedger::new(SqliteLedgerStore::open(&path).unwrap());
    let second = PromiseLedger::new(SqliteLedgerStore::open(&path).unwrap());

    let a = first.open_account().unwrap();
    let b = first.open_account().unwrap();
    let promise = first.create(a.id, b.id, "wash car", 20).unwrap();

    second.accept(promise.id, b.id).unwrap();
    let err = first.cancel(promise.id, a.id).unwrap_err();

    assert!(matches!(
        err,
        LedgerError::InvalidState {
            status: PromiseStatus::Accepted,
            ..
        }
    ));
    assert_eq!(first.balance(b.id).unwrap(), 80);
}

fn failed_unit_leaves_no_trace<S: LedgerStore>(ledger: PromiseLedger<S>) {
    let a = ledger.open_account().unwrap();
    let b = ledger.open_account().unwrap();
    let promise = ledger.create(a.id, b.id, "wash car", 20).unwrap();

    let result: Result<Promise, RepoError> = ledger.store().update_promise(promise.id, |workset| {
        workset.promiser.credit(1_000).unwrap();
        workset.promisee.debit(50).unwrap();
        workset.promise.advance(PromiseStatus::Accepted, 2_000);
        Err(RepoError::InvalidData("abort".to_string()))
    });
    assert!(result.is_err());

    assert_eq!(ledger.balance(a.id).unwrap(), 80);
    assert_eq!(ledger.balance(b.id).unwrap(), 100);
    assert_eq!(
        ledger.get_by_id(promise.id).unwrap().status,
        PromiseStatus::Pending
    );
    assert_eq!(ledger.history(promise.id).unwrap().len(), 1);
}

#[test]
fn failed_unit_leaves_no_trace_in_sqlite() {
    failed_unit_leaves_no_trace(PromiseLedger::new(
        SqliteLedgerStore::open_in_memory().unwrap(),
    ));
}

#[test]
fn failed_unit_leaves_no_trace_in_memory() {
    failed_unit_leaves_no_trace(PromiseLedger::new(MemoryLedgerStore::new()));
}

#[test]
fn directory_lists_accounts_in_creation_order() {
    let store = SqliteLedgerStore::open_in_memory().unwrap();
    let first = store.create_account(100).unwrap();
    let second = store.create_account(7).unwrap();

    let listed = store.list_accounts().unwrap();
    assert_eq!(listed, vec![first.clone(), second]);
    assert_eq!(store.balance(first.id).unwrap(), 100);
    assert!(matches!(
        store.balance(uuid::Uuid::new_v4()),
        Err(RepoError::AccountNotFound(_))
    ));
}
