//! Account domain model.
//!
//! # Responsibility
//! - Hold the vow balance for one participant.
//! - Provide the only two balance mutations: `credit` and `debit`.
//!
//! # Invariants
//! - `balance` is never negative (enforced by `u64` and checked `debit`).
//! - `balance` never exceeds `MAX_BALANCE`, the largest value every store
//!   backend can persist.
//! - A failed `credit`/`debit` leaves the balance untouched.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Stable account identifier.
pub type AccountId = Uuid;

/// Balance every account receives unless configured otherwise.
pub const DEFAULT_STARTING_BALANCE: u64 = 100;

/// Upper bound of any balance; SQLite stores balances as signed 64-bit.
pub const MAX_BALANCE: u64 = i64::MAX as u64;

/// One participant in the ledger and its current vow balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Current vow balance.
    pub balance: u64,
    /// Unix epoch milliseconds.
    pub created_at: i64,
}

/// Balance mutation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BalanceError {
    /// Debit amount exceeds the available balance.
    Insufficient { balance: u64, requested: u64 },
    /// Credit would push the balance above `MAX_BALANCE`.
    Overflow { balance: u64, amount: u64 },
}

impl Display for BalanceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Insufficient { balance, requested } => write!(
                f,
                "insufficient balance: requested {requested} vows, available {balance}"
            ),
            Self::Overflow { balance, amount } => {
                write!(f, "crediting {amount} vows to balance {balance} overflows")
            }
        }
    }
}

impl Error for BalanceError {}

impl Account {
    /// Creates an account with a generated ID.
    pub fn new(balance: u64, created_at: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            balance,
            created_at,
        }
    }

    /// Creates an account funded with `initial_balance`.
    ///
    /// # Errors
    /// - `BalanceError::Overflow` when `initial_balance > MAX_BALANCE`.
    pub fn open(initial_balance: u64, created_at: i64) -> Result<Self, BalanceError> {
        let mut account = Self::new(0, created_at);
        account.credit(initial_balance)?;
        Ok(account)
    }

    /// Adds `amount` vows to the balance.
    pub fn credit(&mut self, amount: u64) -> Result<(), BalanceError> {
        let overflow = BalanceError::Overflow {
            balance: self.balance,
            amount,
        };
        self.balance = self
            .balance
            .checked_add(amount)
            .filter(|total| *total <= MAX_BALANCE)
            .ok_or(overflow)?;
        Ok(())
    }

    /// Removes `amount` vows from the balance.
    ///
    /// # Errors
    /// - `BalanceError::Insufficient` when `amount > balance`; nothing changes.
    pub fn debit(&mut self, amount: u64) -> Result<(), BalanceError> {
        self.balance = self
            .balance
            .checked_sub(amount)
            .ok_or(BalanceError::Insufficient {
                balance: self.balance,
                requested: amount,
            })?;
        Ok(())
    }
}
