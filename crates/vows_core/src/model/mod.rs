//! Domain model for accounts, promises and their audit history.
//!
//! # Responsibility
//! - Define canonical data structures used by ledger business logic.
//! - Encode the promise lifecycle as a closed transition table.
//!
//! # Invariants
//! - Every account and promise is identified by a stable UUID.
//! - Promises are never deleted; terminal promises are retained as history.
//! - Balances are unsigned and can only change through `credit`/`debit`.

pub mod account;
pub mod promise;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in Unix epoch milliseconds.
///
/// Falls back to `0` if the system clock reports a pre-epoch time.
pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}
