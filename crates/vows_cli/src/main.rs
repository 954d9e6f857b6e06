//! CLI smoke entry point.
//!
//! # Responsibility
//! - Wire config, logging, the SQLite store and the ledger the way an
//!   embedding process would.
//! - Print a ledger summary for quick sanity checks.
//!
//! Usage: `vows_cli [config.json]`
//!
//! The summary reads existing state, so it is printed only when the config
//! names a `db_path`. Without one the CLI stops after ping/version, since a
//! fresh in-memory ledger has nothing to report.

use log::info;
use std::process::ExitCode;
use vows_core::{
    init_logging_from_config, LedgerConfig, LedgerStore, PromiseLedger, SqliteLedgerStore,
};

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("vows_cli error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => LedgerConfig::from_json_file(path)?,
        None => LedgerConfig::default(),
    };
    init_logging_from_config(&config)?;

    println!("vows_core ping={}", vows_core::ping());
    println!("vows_core version={}", vows_core::core_version());

    match config.db_path.as_deref() {
        Some(path) => summarize(&PromiseLedger::with_config(
            SqliteLedgerStore::open(path)?,
            &config,
        )?),
        None => {
            info!("event=cli_summary module=cli status=skipped reason=no_db_path");
            println!("summary=skipped (no db_path configured)");
            Ok(())
        }
    }
}

fn summarize<S: LedgerStore>(ledger: &PromiseLedger<S>) -> Result<(), Box<dyn std::error::Error>> {
    let report = ledger.audit_conservation()?;
    info!(
        "event=cli_summary module=cli status=ok accounts={} balances={} escrowed={}",
        report.accounts, report.total_balances, report.escrowed
    );
    println!("accounts={}", report.accounts);
    println!("starting_balance={}", ledger.starting_balance());
    println!("total_balances={}", report.total_balances);
    println!("escrowed={}", report.escrowed);
    println!("kept_bonus_minted={}", report.kept_bonus_minted);
    Ok(())
}
