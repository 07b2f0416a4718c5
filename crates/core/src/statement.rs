use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::money::Money;

/// One line of a bank statement after normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementTransaction {
    /// 1-based line number of the row in the source CSV.
    pub line: u64,
    pub date: NaiveDate,
    pub description: String,
    /// Signed amount; debits are negative.
    pub amount: Money,
    /// The row exactly as it appeared in the source file.
    pub raw_data: String,
}
