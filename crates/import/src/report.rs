use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use tally_core::{LedgerAccount, Money};

use crate::csv::RowWarning;
use crate::match_engine::{MatchResult, MatchType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountRef {
    pub id: String,
    pub name: String,
}

impl From<&LedgerAccount> for AccountRef {
    fn from(account: &LedgerAccount) -> Self {
        AccountRef {
            id: account.id.clone(),
            name: account.name.clone(),
        }
    }
}

/// Why an unmatched item is outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemFlag {
    /// On the statement, absent from the ledger.
    MissingFromLedger,
    /// In the ledger, dated on or before the statement date, not on the
    /// statement.
    NotYetOnStatement,
    /// In the ledger, dated after the statement date.
    AfterStatementDate,
}

impl fmt::Display for ItemFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemFlag::MissingFromLedger => write!(f, "Missing from ledger"),
            ItemFlag::NotYetOnStatement => write!(f, "Not yet reflected on statement"),
            ItemFlag::AfterStatementDate => write!(f, "Dated after statement"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnmatchedItem {
    pub flag: ItemFlag,
    pub date: NaiveDate,
    pub description: String,
    pub amount: Money,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ledger_transaction_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statement_line: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchSummary {
    pub match_type: MatchType,
    pub count: usize,
    pub total: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationReport {
    pub account: AccountRef,
    pub statement_date: NaiveDate,
    pub statement_balance: Money,
    /// The ledger's own current balance.
    pub ledger_balance: Money,
    /// Ledger balance with outstanding items on both sides applied.
    pub computed_ledger_balance: Money,
    /// `statement_balance - computed_ledger_balance`.
    pub discrepancy: Money,
    pub summary: Vec<MatchSummary>,
    pub match_results: Vec<MatchResult>,
    pub unmatched_ledger: Vec<UnmatchedItem>,
    pub unmatched_statement: Vec<UnmatchedItem>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<RowWarning>,
}

impl ReconciliationReport {
    pub fn build(
        account: &LedgerAccount,
        statement_balance: Money,
        statement_date: NaiveDate,
        match_results: Vec<MatchResult>,
        warnings: Vec<RowWarning>,
    ) -> Self {
        let mut unmatched_ledger = Vec::new();
        let mut unmatched_statement = Vec::new();

        for result in match_results.iter().filter(|r| !r.is_matched()) {
            match (&result.ledger_transaction, &result.statement_transaction) {
                (Some(l), None) => unmatched_ledger.push(UnmatchedItem {
                    flag: if l.date <= statement_date {
                        ItemFlag::NotYetOnStatement
                    } else {
                        ItemFlag::AfterStatementDate
                    },
                    date: l.date,
                    description: l.description(),
                    amount: l.amount(),
                    ledger_transaction_id: Some(l.id.clone()),
                    statement_line: None,
                }),
                (None, Some(s)) => unmatched_statement.push(UnmatchedItem {
                    flag: ItemFlag::MissingFromLedger,
                    date: s.date,
                    description: s.description.clone(),
                    amount: s.amount,
                    ledger_transaction_id: None,
                    statement_line: Some(s.line),
                }),
                _ => {}
            }
        }

        let ledger_balance = account.balance();
        let outstanding_ledger: Money = unmatched_ledger.iter().map(|i| i.amount).sum();
        let missing_from_ledger: Money = unmatched_statement.iter().map(|i| i.amount).sum();
        let computed_ledger_balance = ledger_balance - outstanding_ledger + missing_from_ledger;
        let discrepancy = statement_balance - computed_ledger_balance;

        let summary = [MatchType::Exact, MatchType::Fuzzy, MatchType::Unmatched]
            .into_iter()
            .map(|match_type| {
                let of_type = match_results.iter().filter(|r| r.match_type == match_type);
                MatchSummary {
                    match_type,
                    count: of_type.clone().count(),
                    total: of_type.map(MatchResult::amount).sum(),
                }
            })
            .collect();

        ReconciliationReport {
            account: AccountRef::from(account),
            statement_date,
            statement_balance,
            ledger_balance,
            computed_ledger_balance,
            discrepancy,
            summary,
            match_results,
            unmatched_ledger,
            unmatched_statement,
            warnings,
        }
    }

    pub fn is_balanced(&self) -> bool {
        self.discrepancy.is_zero()
    }

    pub fn count(&self, match_type: MatchType) -> usize {
        self.summary
            .iter()
            .find(|s| s.match_type == match_type)
            .map_or(0, |s| s.count)
    }
}

impl fmt::Display for ReconciliationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Reconciliation for {} ({}) as of {}",
            self.account.name, self.account.id, self.statement_date
        )?;
        writeln!(f, "  Statement balance:        {:>14}", self.statement_balance.to_string())?;
        writeln!(f, "  Ledger balance:           {:>14}", self.ledger_balance.to_string())?;
        writeln!(
            f,
            "  Adjusted ledger balance:  {:>14}",
            self.computed_ledger_balance.to_string()
        )?;
        writeln!(f, "  Discrepancy:              {:>14}", self.discrepancy.to_string())?;

        writeln!(f)?;
        writeln!(f, "Matches")?;
        for s in &self.summary {
            writeln!(
                f,
                "  {:<10} {:>5} {:>14}",
                s.match_type.to_string(),
                s.count,
                s.total.to_string()
            )?;
        }

        for flag in [
            ItemFlag::MissingFromLedger,
            ItemFlag::NotYetOnStatement,
            ItemFlag::AfterStatementDate,
        ] {
            let items: Vec<&UnmatchedItem> = self
                .unmatched_statement
                .iter()
                .chain(&self.unmatched_ledger)
                .filter(|i| i.flag == flag)
                .collect();
            if items.is_empty() {
                continue;
            }
            writeln!(f)?;
            writeln!(f, "{flag} ({})", items.len())?;
            for item in items {
                writeln!(
                    f,
                    "  {}  {:>12}  {}",
                    item.date,
                    item.amount.to_string(),
                    item.description
                )?;
            }
        }

        if !self.warnings.is_empty() {
            writeln!(f)?;
            writeln!(f, "Skipped rows ({})", self.warnings.len())?;
            for w in &self.warnings {
                writeln!(f, "  line {}: {}", w.line, w.reason)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::match_engine::MatchEngine;
    use rust_decimal_macros::dec;
    use tally_core::{LedgerTransaction, StatementTransaction};

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 10, d).unwrap()
    }

    fn account(balance: i64) -> LedgerAccount {
        LedgerAccount {
            id: "acct-1".to_string(),
            name: "Checking".to_string(),
            balance,
            closed: false,
        }
    }

    fn ledger(id: &str, day: u32, milliunits: i64, payee: &str) -> LedgerTransaction {
        LedgerTransaction {
            id: id.to_string(),
            date: date(day),
            amount: milliunits,
            payee_name: Some(payee.to_string()),
            memo: None,
            deleted: false,
        }
    }

    fn stmt(line: u64, day: u32, amount: rust_decimal::Decimal, desc: &str) -> StatementTransaction {
        StatementTransaction {
            line,
            date: date(day),
            description: desc.to_string(),
            amount: Money::new(amount),
            raw_data: String::new(),
        }
    }

    fn sample_report() -> ReconciliationReport {
        // Ledger balance 1000.00 includes apple, a pending check and a
        // transfer dated after the statement. The statement has a bank fee
        // the ledger is missing.
        let ledger_txs = vec![
            ledger("a", 20, -99_800, "Apple"),
            ledger("b", 25, -150_000, "Check 104"),
            ledger("c", 31, -50_000, "Transfer"),
        ];
        let statement_txs = vec![
            stmt(2, 20, dec!(-99.80), "APPLE.COM/BILL"),
            stmt(3, 28, dec!(-5.00), "MONTHLY SERVICE FEE"),
        ];
        let results = MatchEngine::default().find_matches(&ledger_txs, &statement_txs);
        ReconciliationReport::build(
            &account(1_000_000),
            Money::new(dec!(1195.00)),
            date(30),
            results,
            Vec::new(),
        )
    }

    #[test]
    fn adjusted_balance_explains_statement() {
        let report = sample_report();
        assert_eq!(report.ledger_balance, Money::new(dec!(1000)));
        // 1000 + 150 + 50 - 5
        assert_eq!(report.computed_ledger_balance, Money::new(dec!(1195)));
        assert!(report.is_balanced());
    }

    #[test]
    fn discrepancy_is_statement_minus_adjusted() {
        let mut report = sample_report();
        report = ReconciliationReport::build(
            &account(1_000_000),
            Money::new(dec!(1200.00)),
            date(30),
            report.match_results,
            Vec::new(),
        );
        assert_eq!(report.discrepancy, Money::new(dec!(5)));
        assert!(!report.is_balanced());
    }

    #[test]
    fn flags_outstanding_items() {
        let report = sample_report();
        let flags: Vec<_> = report.unmatched_ledger.iter().map(|i| i.flag).collect();
        assert_eq!(flags, vec![ItemFlag::NotYetOnStatement, ItemFlag::AfterStatementDate]);
        assert_eq!(report.unmatched_statement.len(), 1);
        assert_eq!(report.unmatched_statement[0].flag, ItemFlag::MissingFromLedger);
        assert_eq!(report.unmatched_statement[0].statement_line, Some(3));
    }

    #[test]
    fn summarizes_per_match_type() {
        let report = sample_report();
        assert_eq!(report.count(MatchType::Exact), 1);
        assert_eq!(report.count(MatchType::Fuzzy), 0);
        assert_eq!(report.count(MatchType::Unmatched), 3);
        assert_eq!(report.summary[0].total, Money::new(dec!(-99.80)));
        assert_eq!(report.summary[2].total, Money::new(dec!(-205)));
    }

    #[test]
    fn renders_text() {
        let text = sample_report().to_string();
        assert!(text.starts_with("Reconciliation for Checking (acct-1) as of 2025-10-30"));
        assert!(text.contains("Missing from ledger (1)"));
        assert!(text.contains("MONTHLY SERVICE FEE"));
        assert!(text.contains("Dated after statement (1)"));
        assert!(!text.contains("Skipped rows"));
    }

    #[test]
    fn serializes_to_json() {
        let json = serde_json::to_value(sample_report()).unwrap();
        assert_eq!(json["account"]["name"], "Checking");
        assert_eq!(json["match_results"][0]["match_type"], "exact");
        assert_eq!(json["unmatched_statement"][0]["flag"], "missing_from_ledger");
        assert!(json.get("warnings").is_none());
    }
}
