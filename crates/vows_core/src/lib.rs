//! Core domain logic for the vows promise ledger.
//! This crate is the single source of truth for ledger invariants.

pub mod config;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;
pub mod service;

pub use config::{ConfigError, LedgerConfig};
pub use logging::{
    default_log_level, init_logging, init_logging_from_config, logging_status, LoggingError,
};
pub use model::account::{
    Account, AccountId, BalanceError, DEFAULT_STARTING_BALANCE, MAX_BALANCE,
};
pub use model::promise::{
    kept_bonus, transition, Movement, Party, Promise, PromiseAction, PromiseEvent, PromiseId,
    PromiseStatus, PromiseValidationError, Settlement, MAX_STAKE,
};
pub use repo::account_repo::SqliteAccountRepository;
pub use repo::memory_store::MemoryLedgerStore;
pub use repo::promise_repo::SqlitePromiseRepository;
pub use repo::sqlite_store::SqliteLedgerStore;
pub use repo::store::{
    AccountDirectory, LedgerSnapshot, LedgerStore, RepoError, RepoResult, Workset,
};
pub use service::ledger::{ConservationReport, LedgerError, LedgerResult, PromiseLedger};

/// Minimal health-check API for early integration.
pub fn ping() -> &'static str {
    "pong"
}

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::{core_version, ping};

    #[test]
    fn ping_returns_pong() {
        assert_eq!(ping(), "pong");
    }

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
