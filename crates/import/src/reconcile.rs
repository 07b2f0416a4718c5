use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use tally_core::{LedgerAccount, LedgerClient, LedgerTransaction, Money};

use crate::config::ReconcileConfig;
use crate::csv::normalize;
use crate::detect::ColumnHints;
use crate::error::ReconcileError;
use crate::report::ReconciliationReport;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileRequest {
    /// Account id or name.
    pub account: String,
    pub csv: String,
    pub statement_balance: Money,
    pub statement_date: NaiveDate,
    #[serde(default)]
    pub hints: ColumnHints,
}

/// Fetches the account and its history, normalizes the statement, matches
/// both sides and builds the report.
///
/// Ledger failures abort before any matching. A statement whose layout cannot
/// be classified fails with the column analysis attached.
pub async fn reconcile<C>(
    client: &C,
    request: &ReconcileRequest,
    config: &ReconcileConfig,
) -> Result<ReconciliationReport, ReconcileError>
where
    C: LedgerClient + ?Sized,
{
    let accounts = client.list_accounts().await?;
    let account = resolve_account(&accounts, &request.account)?;
    tracing::debug!(account_id = %account.id, "resolved account");

    let statement = normalize(&request.csv, &request.hints, config.sample_rows)?;

    let since = statement
        .transactions
        .iter()
        .map(|t| t.date)
        .min()
        .and_then(|earliest| {
            let window = u64::try_from(config.date_window_days).ok()?;
            earliest.checked_sub_days(Days::new(window))
        });
    let ledger: Vec<LedgerTransaction> = client
        .list_transactions(&account.id, since)
        .await?
        .into_iter()
        .filter(|t| !t.deleted)
        .collect();
    tracing::debug!(
        ledger = ledger.len(),
        statement = statement.transactions.len(),
        ?since,
        "matching"
    );

    let results = config
        .match_engine()
        .find_matches(&ledger, &statement.transactions);
    let report = ReconciliationReport::build(
        account,
        request.statement_balance,
        request.statement_date,
        results,
        statement.warnings,
    );

    tracing::info!(
        account = %report.account.name,
        discrepancy = %report.discrepancy,
        unmatched_ledger = report.unmatched_ledger.len(),
        unmatched_statement = report.unmatched_statement.len(),
        "reconciliation complete"
    );
    Ok(report)
}

fn resolve_account<'a>(
    accounts: &'a [LedgerAccount],
    reference: &str,
) -> Result<&'a LedgerAccount, ReconcileError> {
    // closed accounts are reachable by id only
    accounts
        .iter()
        .find(|a| a.id == reference.trim())
        .or_else(|| {
            accounts
                .iter()
                .filter(|a| !a.closed)
                .find(|a| a.is_identified_by(reference))
        })
        .ok_or_else(|| ReconcileError::AccountNotFound {
            account: reference.to_string(),
            available: accounts.iter().map(|a| a.name.clone()).collect(),
        })
}
