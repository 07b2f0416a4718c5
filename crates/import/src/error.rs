use serde::Serialize;
use tally_core::LedgerError;
use thiserror::Error;

use crate::csv::CsvError;
use crate::detect::{ColumnAnalysis, ColumnRole};

/// The CSV layout could not be classified. Carries the full column analysis
/// so a caller can pick explicit column hints and retry.
#[derive(Debug, Clone, Error, Serialize)]
#[error("unrecognized statement layout: {reason}")]
pub struct FormatError {
    pub reason: FormatFailure,
    pub columns: Vec<ColumnAnalysis>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FormatFailure {
    #[error("only {found} of 3 required column roles found (missing: {})", join_roles(.missing))]
    TooFewRoles {
        found: usize,
        missing: Vec<ColumnRole>,
    },
    #[error("{role} hint names column '{column}', which is not in the file")]
    UnknownHint { role: ColumnRole, column: String },
    #[error("no data rows")]
    NoDataRows,
    #[error("unreadable CSV: {message}")]
    Unreadable { message: String },
}

fn join_roles(roles: &[ColumnRole]) -> String {
    roles
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<CsvError> for FormatError {
    fn from(e: CsvError) -> Self {
        FormatError {
            reason: FormatFailure::Unreadable {
                message: e.to_string(),
            },
            columns: Vec::new(),
        }
    }
}

/// Why a reconciliation call produced no report.
#[derive(Debug, Clone, Error, Serialize)]
#[serde(tag = "error", rename_all = "snake_case")]
pub enum ReconcileError {
    #[error(transparent)]
    InputFormat(#[from] FormatError),
    #[error("Account not found: '{account}'")]
    AccountNotFound {
        account: String,
        available: Vec<String>,
    },
    #[error("ledger request '{operation}' failed: {message}")]
    Upstream { operation: String, message: String },
}

impl From<LedgerError> for ReconcileError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::Upstream { operation, message } => {
                ReconcileError::Upstream { operation, message }
            }
            LedgerError::AccountNotFound(account) => ReconcileError::AccountNotFound {
                account,
                available: Vec::new(),
            },
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
