use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::money::Money;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerAccount {
    pub id: String,
    pub name: String,
    /// Current balance in milliunits.
    pub balance: i64,
    #[serde(default)]
    pub closed: bool,
}

impl LedgerAccount {
    pub fn balance(&self) -> Money {
        Money::from_milliunits(self.balance)
    }

    /// Matches on the exact id or a case-insensitive account name.
    pub fn is_identified_by(&self, reference: &str) -> bool {
        let reference = reference.trim();
        self.id == reference || self.name.trim().eq_ignore_ascii_case(reference)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerTransaction {
    pub id: String,
    pub date: NaiveDate,
    /// Signed amount in milliunits; outflows are negative.
    pub amount: i64,
    #[serde(default)]
    pub payee_name: Option<String>,
    #[serde(default)]
    pub memo: Option<String>,
    #[serde(default)]
    pub deleted: bool,
}

impl LedgerTransaction {
    pub fn amount(&self) -> Money {
        Money::from_milliunits(self.amount)
    }

    /// Payee and memo joined into a single free-text description.
    pub fn description(&self) -> String {
        [self.payee_name.as_deref(), self.memo.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("ledger request '{operation}' failed: {message}")]
    Upstream { operation: String, message: String },
    #[error("Account not found: {0}")]
    AccountNotFound(String),
}

impl LedgerError {
    pub fn upstream(operation: &str, message: impl Into<String>) -> Self {
        LedgerError::Upstream {
            operation: operation.to_string(),
            message: message.into(),
        }
    }
}

/// The budgeting service as seen by the reconciliation core.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn list_accounts(&self) -> Result<Vec<LedgerAccount>, LedgerError>;

    /// Transactions for one account, optionally restricted to those dated on
    /// or after `since`. Deleted transactions may be included; callers filter.
    async fn list_transactions(
        &self,
        account_id: &str,
        since: Option<NaiveDate>,
    ) -> Result<Vec<LedgerTransaction>, LedgerError>;
}

/// A ledger snapshot held in memory, e.g. loaded from a JSON export.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryLedger {
    pub accounts: Vec<LedgerAccount>,
    /// Transactions keyed by account id.
    #[serde(default)]
    pub transactions: HashMap<String, Vec<LedgerTransaction>>,
}

impl MemoryLedger {
    pub fn new(accounts: Vec<LedgerAccount>) -> Self {
        Self {
            accounts,
            transactions: HashMap::new(),
        }
    }

    pub fn with_transactions(
        mut self,
        account_id: &str,
        transactions: Vec<LedgerTransaction>,
    ) -> Self {
        self.transactions
            .entry(account_id.to_string())
            .or_default()
            .extend(transactions);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn list_accounts(&self) -> Result<Vec<LedgerAccount>, LedgerError> {
        Ok(self.accounts.clone())
    }

    async fn list_transactions(
        &self,
        account_id: &str,
        since: Option<NaiveDate>,
    ) -> Result<Vec<LedgerTransaction>, LedgerError> {
        if !self.accounts.iter().any(|a| a.id == account_id) {
            return Err(LedgerError::AccountNotFound(account_id.to_string()));
        }
        Ok(self
            .transactions
            .get(account_id)
            .map(|txs| {
                txs.iter()
                    .filter(|t| since.map_or(true, |s| t.date >= s))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn tx(id: &str, day: u32, payee: Option<&str>, memo: Option<&str>) -> LedgerTransaction {
        LedgerTransaction {
            id: id.to_string(),
            date: date(2025, 10, day),
            amount: -12_340,
            payee_name: payee.map(str::to_string),
            memo: memo.map(str::to_string),
            deleted: false,
        }
    }

    fn checking() -> LedgerAccount {
        LedgerAccount {
            id: "acc-1".to_string(),
            name: "Everyday Checking".to_string(),
            balance: 1_250_500,
            closed: false,
        }
    }

    #[test]
    fn description_joins_payee_and_memo() {
        assert_eq!(tx("a", 1, Some("Apple"), Some("iCloud")).description(), "Apple iCloud");
        assert_eq!(tx("b", 1, None, Some(" rent ")).description(), "rent");
        assert_eq!(tx("c", 1, None, None).description(), "");
    }

    #[test]
    fn account_matches_id_or_name() {
        let account = checking();
        assert!(account.is_identified_by("acc-1"));
        assert!(account.is_identified_by("everyday checking"));
        assert!(!account.is_identified_by("Savings"));
        assert_eq!(account.balance().amount(), dec!(1250.50));
    }

    #[test]
    fn ledger_from_json_defaults_optional_fields() {
        let json = r#"{
            "accounts": [{"id": "acc-1", "name": "Checking", "balance": 5000}],
            "transactions": {"acc-1": [{"id": "t1", "date": "2025-10-20", "amount": -99800}]}
        }"#;
        let ledger = MemoryLedger::from_json(json).unwrap();
        let t = &ledger.transactions["acc-1"][0];
        assert_eq!(t.payee_name, None);
        assert!(!t.deleted);
        assert!(!ledger.accounts[0].closed);
    }

    #[tokio::test]
    async fn memory_ledger_filters_by_since() {
        let ledger = MemoryLedger::new(vec![checking()])
            .with_transactions("acc-1", vec![tx("a", 1, None, None), tx("b", 15, None, None)]);
        let all = ledger.list_transactions("acc-1", None).await.unwrap();
        assert_eq!(all.len(), 2);
        let recent = ledger
            .list_transactions("acc-1", Some(date(2025, 10, 10)))
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].id, "b");
    }

    #[tokio::test]
    async fn memory_ledger_rejects_unknown_account() {
        let ledger = MemoryLedger::new(vec![checking()]);
        let err = ledger.list_transactions("nope", None).await.unwrap_err();
        assert_eq!(err, LedgerError::AccountNotFound("nope".to_string()));
    }
}
