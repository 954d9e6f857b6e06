//! Store abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the store contract the promise ledger is built against.
//! - Isolate SQLite query details from ledger orchestration.
//! - Provide an in-memory backend with per-entity locking.
//!
//! # Invariants
//! - Writes validate promise records before persistence.
//! - Repository APIs return semantic errors (`PromiseNotFound`,
//!   `AccountNotFound`, `StatusConflict`) in addition to DB transport errors.

pub mod account_repo;
pub mod memory_store;
pub mod promise_repo;
mod schema;
pub mod sqlite_store;
pub mod store;
