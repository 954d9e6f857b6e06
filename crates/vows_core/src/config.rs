//! Runtime configuration for processes embedding the ledger.
//!
//! # Responsibility
//! - Describe where the ledger persists, how it logs and how accounts are
//!   funded when opened.
//! - Parse JSON configuration with every field optional.
//!
//! # Invariants
//! - `starting_balance` is at least 1 and at most `MAX_BALANCE`.

use crate::logging::default_log_level;
use crate::model::account::{DEFAULT_STARTING_BALANCE, MAX_BALANCE};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Ledger process configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    /// SQLite file. `None` keeps the ledger in memory.
    pub db_path: Option<PathBuf>,
    /// One of `trace|debug|info|warn|error`.
    pub log_level: String,
    /// Absolute directory for rolling log files. `None` disables file logs.
    pub log_dir: Option<PathBuf>,
    /// Vows granted to every account opened through the ledger.
    pub starting_balance: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            log_level: default_log_level().to_string(),
            log_dir: None,
            starting_balance: DEFAULT_STARTING_BALANCE,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io { path: PathBuf, source: std::io::Error },
    Parse(serde_json::Error),
    ZeroStartingBalance,
    StartingBalanceTooLarge(u64),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "failed to read config `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid config: {err}"),
            Self::ZeroStartingBalance => write!(f, "starting_balance must be at least 1"),
            Self::StartingBalanceTooLarge(value) => {
                write!(f, "starting_balance {value} exceeds {MAX_BALANCE}")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::ZeroStartingBalance | Self::StartingBalanceTooLarge(_) => None,
        }
    }
}

impl LedgerConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.starting_balance == 0 {
            return Err(ConfigError::ZeroStartingBalance);
        }
        if self.starting_balance > MAX_BALANCE {
            return Err(ConfigError::StartingBalanceTooLarge(self.starting_balance));
        }
        Ok(())
    }
}
