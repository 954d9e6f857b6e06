use vows_core::{
    kept_bonus, AccountDirectory, AccountId, LedgerStore, MemoryLedgerStore, PromiseId,
    PromiseLedger, PromiseStatus, SqliteLedgerStore,
};

/// Deterministic xorshift so failures reproduce from the seed alone.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x
    }

    fn below(&mut self, bound: usize) -> usize {
        (self.next() % bound as u64) as usize
    }
}

/// Runs random operations, including invalid ones, and checks every law
/// after each step.
fn random_walk<S: LedgerStore>(ledger: PromiseLedger<S>, seed: u64, steps: usize) {
    let mut rng = Rng(seed);
    let accounts: Vec<AccountId> = (0..4)
        .map(|_| ledger.open_account().unwrap().id)
        .collect();
    let baseline = 4 * u128::from(ledger.starting_balance());
    let mut promises: Vec<PromiseId> = Vec::new();
    let mut expected_minted: u128 = 0;

    for _ in 0..steps {
        let actor = accounts[rng.below(accounts.len())];
        let before_balances = balances(&ledger);
        let target = if promises.is_empty() {
            None
        } else {
            Some(promises[rng.below(promises.len())])
        };
        let before_promise = target.map(|id| ledger.get_by_id(id).unwrap());

        let outcome = match (rng.below(6), target) {
            (0, _) | (_, None) => {
                let other = accounts[rng.below(accounts.len())];
                let stake = rng.below(40) as u64;
                ledger
                    .create(actor, other, "random walk", stake)
                    .map(|promise| {
                        promises.push(promise.id);
                        promise
                    })
            }
            (1, Some(id)) => ledger.accept(id, actor),
            (2, Some(id)) => ledger.decline(id, actor),
            (3, Some(id)) => ledger.cancel(id, actor),
            (4, Some(id)) => ledger.resolve(id, actor, true),
            (_, Some(id)) => ledger.resolve(id, actor, false),
        };

        match (&outcome, &before_promise) {
            (Err(_), _) => {
                assert_eq!(balances(&ledger), before_balances, "rejected op moved vows");
                if let (Some(id), Some(before)) = (target, &before_promise) {
                    assert_eq!(&ledger.get_by_id(id).unwrap(), before);
                }
            }
            (Ok(after), Some(before)) if after.id == before.id => {
                assert!(!before.status.is_terminal(), "terminal promise changed");
                assert_eq!(after.stake, before.stake);
                if after.status == PromiseStatus::Kept {
                    expected_minted += 2 * u128::from(kept_bonus(after.stake));
                }
            }
            (Ok(_), _) => {}
        }

        let report = ledger.audit_conservation().unwrap();
        assert_eq!(report.kept_bonus_minted, expected_minted);
        assert_eq!(report.baseline(), baseline, "value created or destroyed");
        assert_eq!(
            report.total_balances + report.escrowed,
            baseline + expected_minted
        );
    }
}

fn balances<S: LedgerStore>(ledger: &PromiseLedger<S>) -> Vec<(AccountId, u64)> {
    ledger
        .store()
        .list_accounts()
        .unwrap()
        .into_iter()
        .map(|account| (account.id, account.balance))
        .collect()
}

#[test]
fn conservation_holds_over_random_sequences_in_memory() {
    for seed in [1, 7, 42, 0x5eed, 0xdead_beef] {
        random_walk(PromiseLedger::new(MemoryLedgerStore::new()), seed, 300);
    }
}

#[test]
fn conservation_holds_over_random_sequences_in_sqlite() {
    for seed in [3, 99, 0xc0ffee] {
        random_walk(
            PromiseLedger::new(SqliteLedgerStore::open_in_memory().unwrap()),
            seed,
            200,
        );
    }
}

#[test]
fn conservation_report_matches_worked_example() {
    let ledger = PromiseLedger::new(MemoryLedgerStore::new());
    let a = ledger.open_account().unwrap();
    let b = ledger.open_account().unwrap();
    let c = ledger.open_account().unwrap();

    let kept = ledger.create(a.id, b.id, "kept", 20).unwrap();
    ledger.accept(kept.id, b.id).unwrap();
    ledger.resolve(kept.id, b.id, true).unwrap();
    let accepted = ledger.create(b.id, c.id, "accepted", 15).unwrap();
    ledger.accept(accepted.id, c.id).unwrap();
    ledger.create(c.id, a.id, "pending", 7).unwrap();

    let report = ledger.audit_conservation().unwrap();
    assert_eq!(report.accounts, 3);
    assert_eq!(report.kept_bonus_minted, 20);
    assert_eq!(report.escrowed, 15 * 2 + 7);
    assert_eq!(report.total_balances, 300 + 20 - 37);
    assert_eq!(report.baseline(), 300);
}
