use std::sync::Barrier;
use std::thread;
use vows_core::{
    LedgerError, LedgerStore, MemoryLedgerStore, PromiseLedger, PromiseStatus, SqliteLedgerStore,
};

const ROUNDS: usize = 50;

/// Races `cancel` (promiser) against `accept` (promisee) on one promise.
fn cancel_races_accept<S: LedgerStore + Sync>(ledger: &PromiseLedger<S>) {
    for _ in 0..ROUNDS {
        let a = ledger.open_account().unwrap();
        let b = ledger.open_account().unwrap();
        let promise = ledger.create(a.id, b.id, "race", 10).unwrap();
        let barrier = Barrier::new(2);

        let (cancel, accept) = thread::scope(|scope| {
            let cancel = scope.spawn(|| {
                barrier.wait();
                ledger.cancel(promise.id, a.id)
            });
            let accept = scope.spawn(|| {
                barrier.wait();
                ledger.accept(promise.id, b.id)
            });
            (cancel.join().unwrap(), accept.join().unwrap())
        });

        let final_promise = ledger.get_by_id(promise.id).unwrap();
        match (cancel, accept) {
            (Ok(_), Err(LedgerError::InvalidState { status, .. })) => {
                assert_eq!(status, PromiseStatus::Declined);
                assert_eq!(final_promise.status, PromiseStatus::Declined);
                assert_eq!(ledger.balance(a.id).unwrap(), 100);
                assert_eq!(ledger.balance(b.id).unwrap(), 100);
            }
            (Err(LedgerError::InvalidState { status, .. }), Ok(_)) => {
                assert_eq!(status, PromiseStatus::Accepted);
                assert_eq!(final_promise.status, PromiseStatus::Accepted);
                assert_eq!(ledger.balance(a.id).unwrap(), 90);
                assert_eq!(ledger.balance(b.id).unwrap(), 90);
            }
            other => panic!("exactly one operation must win: {other:?}"),
        }
    }
}

/// Many threads try to resolve the same accepted promise; only one pays out.
fn double_resolve_pays_once<S: LedgerStore + Sync>(ledger: &PromiseLedger<S>) {
    let a = ledger.open_account().unwrap();
    let b = ledger.open_account().unwrap();
    let promise = ledger.create(a.id, b.id, "pay once", 20).unwrap();
    ledger.accept(promise.id, b.id).unwrap();
    let (promise_id, promisee_id) = (promise.id, b.id);
    let barrier = Barrier::new(8);

    let outcomes: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    ledger.resolve(promise_id, promisee_id, i % 2 == 0)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect()
    });

    let winners: Vec<_> = outcomes.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners.len(), 1);
    for loser in outcomes.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(loser.code(), "invalid_state");
    }

    let (expected_a, expected_b) = match winners[0].status {
        PromiseStatus::Kept => (110, 110),
        PromiseStatus::Broken => (80, 120),
        other => panic!("unexpected status {other}"),
    };
    assert_eq!(ledger.balance(a.id).unwrap(), expected_a);
    assert_eq!(ledger.balance(b.id).unwrap(), expected_b);
    assert_eq!(ledger.history(promise.id).unwrap().len(), 3);
}

/// Unrelated promises on shared accounts never lose or mint value.
fn parallel_traffic_conserves_value<S: LedgerStore + Sync>(ledger: &PromiseLedger<S>) {
    let accounts: Vec<_> = (0..6).map(|_| ledger.open_account().unwrap()).collect();

    thread::scope(|scope| {
        for worker in 0..6 {
            let accounts = &accounts;
            scope.spawn(move || {
                for round in 0..40 {
                    let promiser = &accounts[(worker + round) % accounts.len()];
                    let promisee = &accounts[(worker + round + 1) % accounts.len()];
                    let Ok(promise) = ledger.create(promiser.id, promisee.id, "traffic", 3)
                    else {
                        continue;
                    };
                    if ledger.accept(promise.id, promisee.id).is_ok() {
                        ledger
                            .resolve(promise.id, promisee.id, round % 3 != 0)
                            .unwrap();
                    } else {
                        ledger.cancel(promise.id, promiser.id).unwrap();
                    }
                }
            });
        }
    });

    let report = ledger.audit_conservation().unwrap();
    assert_eq!(report.baseline(), 600);
    assert_eq!(report.escrowed, 0);
    for account in &accounts {
        let promises = ledger.list_by_account(account.id).unwrap();
        assert!(promises.iter().all(|promise| promise.status.is_terminal()));
    }
}

#[test]
fn memory_cancel_races_accept() {
    cancel_races_accept(&PromiseLedger::new(MemoryLedgerStore::new()));
}

#[test]
fn sqlite_cancel_races_accept() {
    cancel_races_accept(&PromiseLedger::new(
        SqliteLedgerStore::open_in_memory().unwrap(),
    ));
}

#[test]
fn memory_double_resolve_pays_once() {
    double_resolve_pays_once(&PromiseLedger::new(MemoryLedgerStore::new()));
}

#[test]
fn sqlite_double_resolve_pays_once() {
    double_resolve_pays_once(&PromiseLedger::new(
        SqliteLedgerStore::open_in_memory().unwrap(),
    ));
}

#[test]
fn memory_parallel_traffic_conserves_value() {
    parallel_traffic_conserves_value(&PromiseLedger::new(MemoryLedgerStore::new()));
}

#[test]
fn sqlite_parallel_traffic_conserves_value() {
    parallel_traffic_conserves_value(&PromiseLedger::new(
        SqliteLedgerStore::open_in_memory().unwrap(),
    ));
}
