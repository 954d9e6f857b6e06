//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate store units into ledger-level operations.
//! - Keep embedding processes decoupled from storage details.

pub mod ledger;
