//! Promise ledger use-case service.
//!
//! # Responsibility
//! - Validate actor and lifecycle state for every promise operation.
//! - Move vows between the parties as part of the same atomic store unit.
//! - Provide lookup, history and conservation-audit queries.
//!
//! # Invariants
//! - Check order is not-found, then authorization, then state, then funds.
//! - A rejected operation changes no balance, status or history.
//! - Summed balances plus escrow grow only by the kept bonus.

use crate::config::{ConfigError, LedgerConfig};
use crate::model::account::{Account, AccountId, BalanceError, DEFAULT_STARTING_BALANCE};
use crate::model::now_epoch_ms;
use crate::model::promise::{
    kept_bonus, transition, Movement, Party, Promise, PromiseAction, PromiseEvent, PromiseId,
    PromiseStatus, PromiseValidationError,
};
use crate::repo::store::{LedgerStore, RepoError, Workset};
use log::{error, info, warn};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Instant;

pub type LedgerResult<T> = Result<T, LedgerError>;

/// Typed failure of a ledger operation. No variant is retried internally.
#[derive(Debug)]
pub enum LedgerError {
    /// Malformed request data.
    InvalidInput(PromiseValidationError),
    /// Actor is not the party entitled to this operation.
    Unauthorized {
        promise_id: PromiseId,
        actor_id: AccountId,
        required: Party,
    },
    /// Promise is not in a status this operation can leave.
    InvalidState {
        promise_id: PromiseId,
        status: PromiseStatus,
        action: PromiseAction,
    },
    /// Account cannot cover the stake.
    InsufficientBalance {
        account_id: AccountId,
        balance: u64,
        requested: u64,
    },
    /// Unknown promise.
    NotFound(PromiseId),
    /// Unknown account.
    AccountNotFound(AccountId),
    /// Crediting would overflow the account balance.
    BalanceOverflow(AccountId),
    /// Persistence failure.
    Store(RepoError),
}

impl LedgerError {
    /// Stable snake_case code for logs and callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::Unauthorized { .. } => "unauthorized",
            Self::InvalidState { .. } => "invalid_state",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::NotFound(_) => "not_found",
            Self::AccountNotFound(_) => "account_not_found",
            Self::BalanceOverflow(_) => "balance_overflow",
            Self::Store(_) => "store_error",
        }
    }

    /// Every rejection reflects ledger state at the time of the call, so
    /// repeating the same call cannot succeed without another transition.
    pub fn is_retryable(&self) -> bool {
        false
    }

    fn from_balance(account_id: AccountId, err: BalanceError) -> Self {
        match err {
            BalanceError::Insufficient { balance, requested } => Self::InsufficientBalance {
                account_id,
                balance,
                requested,
            },
            BalanceError::Overflow { .. } => Self::BalanceOverflow(account_id),
        }
    }
}

impl Display for LedgerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidInput(err) => write!(f, "invalid input: {err}"),
            Self::Unauthorized {
                promise_id,
                actor_id,
                required,
            } => write!(
                f,
                "account {actor_id} is not the {} of promise {promise_id}",
                match required {
                    Party::Promiser => "promiser",
                    Party::Promisee => "promisee",
                }
            ),
            Self::InvalidState {
                promise_id,
                status,
                action,
            } => write!(f, "cannot {action} promise {promise_id} in status `{status}`"),
            Self::InsufficientBalance {
                account_id,
                balance,
                requested,
            } => write!(
                f,
                "account {account_id} holds {balance} vows, {requested} required"
            ),
            Self::NotFound(id) => write!(f, "promise not found: {id}"),
            Self::AccountNotFound(id) => write!(f, "account not found: {id}"),
            Self::BalanceOverflow(id) => write!(f, "balance of account {id} would overflow"),
            Self::Store(err) => write!(f, "{err}"),
        }
    }
}

impl Error for LedgerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidInput(err) => Some(err),
            Self::Store(err) => Some(err),
            _ => None,
        }
    }
}

impl From<RepoError> for LedgerError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::PromiseNotFound(id) => Self::NotFound(id),
            RepoError::AccountNotFound(id) => Self::AccountNotFound(id),
            RepoError::Validation(err) => Self::InvalidInput(err),
            other => Self::Store(other),
        }
    }
}

/// Totals proving that value is only minted by kept promises.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConservationReport {
    pub accounts: usize,
    /// Sum of all account balances.
    pub total_balances: u128,
    /// Stakes held by pending and accepted promises.
    pub escrowed: u128,
    /// Bonus minted by kept promises, both parties combined.
    pub kept_bonus_minted: u128,
}

impl ConservationReport {
    /// Value that existed before any promise was made.
    pub fn baseline(&self) -> u128 {
        (self.total_balances + self.escrowed).saturating_sub(self.kept_bonus_minted)
    }
}

/// The promise ledger over an injected store.
pub struct PromiseLedger<S: LedgerStore> {
    store: S,
    starting_balance: u64,
}

impl<S: LedgerStore> PromiseLedger<S> {
    /// Creates a ledger opening accounts with the default starting balance.
    pub fn new(store: S) -> Self {
        Self {
            store,
            starting_balance: DEFAULT_STARTING_BALANCE,
        }
    }

    /// Creates a ledger funded per `config`.
    ///
    /// # Errors
    /// - `ConfigError` when `config.validate()` fails.
    pub fn with_config(store: S, config: &LedgerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            store,
            starting_balance: config.starting_balance,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn starting_balance(&self) -> u64 {
        self.starting_balance
    }

    /// Opens an account funded with the starting balance.
    pub fn open_account(&self) -> LedgerResult<Account> {
        let account = self.store.create_account(self.starting_balance)?;
        info!(
            "event=account_open module=ledger status=ok account_id={} balance={}",
            account.id, account.balance
        );
        Ok(account)
    }

    pub fn account(&self, id: AccountId) -> LedgerResult<Account> {
        self.store
            .get_account(id)?
            .ok_or(LedgerError::AccountNotFound(id))
    }

    pub fn balance(&self, id: AccountId) -> LedgerResult<u64> {
        Ok(self.store.balance(id)?)
    }

    /// Creates a `pending` promise and moves the promiser's stake to escrow.
    ///
    /// # Errors
    /// - `InvalidInput` for identical parties, blank description or zero stake.
    /// - `AccountNotFound` when either party is unknown.
    /// - `InsufficientBalance` when the promiser cannot cover `stake`.
    pub fn create(
        &self,
        promiser_id: AccountId,
        promisee_id: AccountId,
        description: &str,
        stake: u64,
    ) -> LedgerResult<Promise> {
        let started_at = Instant::now();
        let at = now_epoch_ms();
        let draft = Promise::new(promiser_id, promisee_id, description, stake, at);
        let promise_id = draft.id;

        let result = draft
            .validate()
            .map_err(LedgerError::InvalidInput)
            .and_then(|()| {
                self.store.insert_promise(draft, |workset| -> LedgerResult<PromiseEvent> {
                    let to = transition(None, PromiseAction::Create).ok_or(
                        LedgerError::InvalidState {
                            promise_id,
                            status: workset.promise.status,
                            action: PromiseAction::Create,
                        },
                    )?;
                    settle(workset, PromiseAction::Create)?;
                    workset.promise.advance(to, at);
                    Ok(workset.event(PromiseAction::Create, promiser_id, None, at))
                })
            });

        log_outcome(PromiseAction::Create, promise_id, started_at, &result);
        result
    }

    /// Promisee accepts a pending promise, escrowing a matching stake.
    pub fn accept(&self, promise_id: PromiseId, actor_id: AccountId) -> LedgerResult<Promise> {
        self.apply(promise_id, actor_id, PromiseAction::Accept)
    }

    /// Promisee turns down a pending promise; the promiser is refunded.
    pub fn decline(&self, promise_id: PromiseId, actor_id: AccountId) -> LedgerResult<Promise> {
        self.apply(promise_id, actor_id, PromiseAction::Decline)
    }

    /// Promiser withdraws a pending promise; the stake is refunded.
    ///
    /// The promise ends `declined`; history records the `cancel` action.
    pub fn cancel(&self, promise_id: PromiseId, actor_id: AccountId) -> LedgerResult<Promise> {
        self.apply(promise_id, actor_id, PromiseAction::Cancel)
    }

    /// Promisee judges an accepted promise kept or broken.
    pub fn resolve(
        &self,
        promise_id: PromiseId,
        actor_id: AccountId,
        kept: bool,
    ) -> LedgerResult<Promise> {
        self.apply(promise_id, actor_id, PromiseAction::resolve(kept))
    }

    pub fn get_by_id(&self, promise_id: PromiseId) -> LedgerResult<Promise> {
        self.store
            .get_promise(promise_id)?
            .ok_or(LedgerError::NotFound(promise_id))
    }

    /// Promises where the account is promiser or promisee, in insertion order.
    pub fn list_by_account(&self, account_id: AccountId) -> LedgerResult<Vec<Promise>> {
        Ok(self.store.list_promises_for_account(account_id)?)
    }

    /// Ordered transition history of one promise.
    pub fn history(&self, promise_id: PromiseId) -> LedgerResult<Vec<PromiseEvent>> {
        self.get_by_id(promise_id)?;
        Ok(self.store.list_promise_events(promise_id)?)
    }

    /// Sums balances, escrow and minted bonus from a consistent snapshot.
    pub fn audit_conservation(&self) -> LedgerResult<ConservationReport> {
        let snapshot = self.store.snapshot()?;
        let total_balances = snapshot
            .accounts
            .iter()
            .map(|account| u128::from(account.balance))
            .sum();
        let escrowed = snapshot
            .promises
            .iter()
            .map(|promise| u128::from(promise.escrowed()))
            .sum();
        let kept_bonus_minted = snapshot
            .promises
            .iter()
            .filter(|promise| promise.status == PromiseStatus::Kept)
            .map(|promise| 2 * u128::from(kept_bonus(promise.stake)))
            .sum();

        Ok(ConservationReport {
            accounts: snapshot.accounts.len(),
            total_balances,
            escrowed,
            kept_bonus_minted,
        })
    }

    fn apply(
        &self,
        promise_id: PromiseId,
        actor_id: AccountId,
        action: PromiseAction,
    ) -> LedgerResult<Promise> {
        let started_at = Instant::now();
        let at = now_epoch_ms();

        let result = self
            .store
            .update_promise(promise_id, |workset| -> LedgerResult<PromiseEvent> {
                let from = workset.promise.status;
                let required = action.actor();
                if workset.promise.party(required) != actor_id {
                    return Err(LedgerError::Unauthorized {
                        promise_id,
                        actor_id,
                        required,
                    });
                }
                let to = transition(Some(from), action).ok_or(LedgerError::InvalidState {
                    promise_id,
                    status: from,
                    action,
                })?;
                settle(workset, action)?;
                workset.promise.advance(to, at);
                Ok(workset.event(action, actor_id, Some(from), at))
            })
            .or_else(|err| match err {
                LedgerError::Store(RepoError::StatusConflict { .. }) => {
                    Err(self.lost_race(promise_id, action))
                }
                other => Err(other),
            });

        log_outcome(action, promise_id, started_at, &result);
        result
    }

    /// Error for a unit that lost its status compare-and-swap.
    fn lost_race(&self, promise_id: PromiseId, action: PromiseAction) -> LedgerError {
        match self.get_by_id(promise_id) {
            Ok(current) => LedgerError::InvalidState {
                promise_id,
                status: current.status,
                action,
            },
            Err(err) => err,
        }
    }
}

fn settle(workset: &mut Workset, action: PromiseAction) -> LedgerResult<()> {
    let settlement = action.settlement(workset.promise.stake);
    apply_movement(&mut workset.promiser, settlement.promiser)?;
    apply_movement(&mut workset.promisee, settlement.promisee)?;
    Ok(())
}

fn apply_movement(account: &mut Account, movement: Movement) -> LedgerResult<()> {
    let outcome = match movement {
        Movement::None => Ok(()),
        Movement::Debit(amount) => account.debit(amount),
        Movement::Credit(amount) => account.credit(amount),
    };
    outcome.map_err(|err| LedgerError::from_balance(account.id, err))
}

fn log_outcome(
    action: PromiseAction,
    promise_id: PromiseId,
    started_at: Instant,
    result: &LedgerResult<Promise>,
) {
    let duration_ms = started_at.elapsed().as_millis();
    match result {
        Ok(promise) => info!(
            "event=promise_transition module=ledger status=ok action={action} promise_id={promise_id} to={} stake={} duration_ms={duration_ms}",
            promise.status, promise.stake
        ),
        Err(LedgerError::Store(err)) => error!(
            "event=promise_transition module=ledger status=error action={action} promise_id={promise_id} duration_ms={duration_ms} error_code=store_error error={err}"
        ),
        Err(err) => warn!(
            "event=promise_transition module=ledger status=rejected action={action} promise_id={promise_id} duration_ms={duration_ms} error_code={}",
            err.code()
        ),
    }
}
