use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use tally_core::{MemoryLedger, Money};
use tally_import::{
    ColumnAnalysis, ColumnHints, FormatError, ReconcileConfig, ReconcileError, ReconcileRequest,
};

use crate::{DetectArgs, HintArgs, ReconcileArgs};

/// What to print and whether it describes a failed reconciliation.
pub(crate) struct Output {
    pub text: String,
    pub failed: bool,
}

pub(crate) async fn reconcile(args: ReconcileArgs) -> Result<Output> {
    let csv = read(&args.csv)?;
    let ledger_json = read(&args.ledger)?;
    let ledger = MemoryLedger::from_json(&ledger_json)
        .with_context(|| format!("invalid ledger snapshot {}", args.ledger.display()))?;

    let mut config = match &args.config {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            ReconcileConfig::from_toml(&read(path)?)
                .with_context(|| format!("invalid config {}", path.display()))?
        }
        None => ReconcileConfig::default(),
    };
    if let Some(tolerance) = args.tolerance {
        config.amount_tolerance = tolerance;
    }
    if let Some(window) = args.window {
        config.date_window_days = window;
    }
    config.validate().context("invalid command-line override")?;

    let request = ReconcileRequest {
        account: args.account,
        csv,
        statement_balance: Money::new(args.balance),
        statement_date: args.date,
        hints: args.hints.into(),
    };

    match tally_import::reconcile(&ledger, &request, &config).await {
        Ok(report) => Ok(Output {
            text: if args.json {
                serde_json::to_string_pretty(&report)?
            } else {
                report.to_string()
            },
            failed: false,
        }),
        Err(err) => Ok(Output {
            text: if args.json {
                serde_json::to_string_pretty(&err)?
            } else {
                describe_failure(&err)
            },
            failed: true,
        }),
    }
}

pub(crate) fn detect(args: DetectArgs) -> Result<Output> {
    let csv = read(&args.csv)?;
    let hints: ColumnHints = args.hints.into();
    match tally_import::detect(&csv, &hints, ReconcileConfig::default().sample_rows) {
        Ok(detection) => Ok(Output {
            text: if args.json {
                serde_json::to_string_pretty(&detection)?
            } else {
                format!(
                    "Detected layout (confidence {:.2})\n{}",
                    detection.confidence,
                    column_table(&detection.columns)
                )
            },
            failed: false,
        }),
        Err(err) => Ok(Output {
            text: if args.json {
                serde_json::to_string_pretty(&err)?
            } else {
                describe_format_error(&err)
            },
            failed: true,
        }),
    }
}

fn read(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))
}

impl From<HintArgs> for ColumnHints {
    fn from(h: HintArgs) -> Self {
        ColumnHints {
            date_column: h.date_column,
            description_column: h.description_column,
            amount_column: h.amount_column,
        }
    }
}

// ── Rendering ─────────────────────────────────────────────────────────────────

fn describe_failure(err: &ReconcileError) -> String {
    match err {
        ReconcileError::InputFormat(e) => describe_format_error(e),
        ReconcileError::AccountNotFound { available, .. } if !available.is_empty() => {
            format!("{err}\nAvailable accounts: {}", available.join(", "))
        }
        _ => err.to_string(),
    }
}

fn describe_format_error(err: &FormatError) -> String {
    let mut out = format!("{err}\n");
    if !err.columns.is_empty() {
        out.push_str(&column_table(&err.columns));
        out.push_str(
            "Retry with --date-column, --description-column and --amount-column naming the right headers.",
        );
    }
    out
}

fn column_table(columns: &[ColumnAnalysis]) -> String {
    let mut out = format!(
        "{:>3}  {:<24} {:<12} {:>5} {:>5} {:>5} {:>5}  samples\n",
        "#", "header", "role", "conf", "date", "amt", "desc"
    );
    for c in columns {
        let _ = writeln!(
            out,
            "{:>3}  {:<24} {:<12} {:>5.2} {:>5.2} {:>5.2} {:>5.2}  {}",
            c.index,
            truncate(&c.header, 24),
            c.role.to_string(),
            c.confidence,
            c.scores.date,
            c.scores.amount,
            c.scores.description,
            c.samples.join(" | ")
        );
    }
    out
}

fn truncate(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut t: String = s.chars().take(width - 1).collect();
        t.push('~');
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::io::Write;
    use std::path::PathBuf;
    use std::str::FromStr;
    use tempfile::NamedTempFile;

    const LEDGER: &str = r#"{
        "accounts": [{"id": "acct-1", "name": "Checking", "balance": 900200}],
        "transactions": {"acct-1": [
            {"id": "t1", "date": "2025-10-20", "amount": -99800, "payee_name": "Apple"}
        ]}
    }"#;

    const CSV: &str = "Date,Description,Amount\n10/20/2025,APPLE.COM/BILL,-99.80\n";

    fn file(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    fn args(csv: &NamedTempFile, ledger: &NamedTempFile, account: &str) -> ReconcileArgs {
        ReconcileArgs {
            csv: csv.path().to_path_buf(),
            ledger: ledger.path().to_path_buf(),
            account: account.to_string(),
            balance: Decimal::from_str("900.20").unwrap(),
            date: NaiveDate::from_ymd_opt(2025, 10, 31).unwrap(),
            tolerance: None,
            window: None,
            config: None,
            hints: HintArgs::default(),
            json: false,
        }
    }

    #[tokio::test]
    async fn reconcile_renders_text_report() {
        let (csv, ledger) = (file(CSV), file(LEDGER));
        let out = reconcile(args(&csv, &ledger, "checking")).await.unwrap();
        assert!(!out.failed);
        assert!(out.text.contains("Reconciliation for Checking (acct-1)"));
        assert!(out.text.contains("Discrepancy:"));
    }

    #[tokio::test]
    async fn reconcile_json_report() {
        let (csv, ledger) = (file(CSV), file(LEDGER));
        let mut a = args(&csv, &ledger, "acct-1");
        a.json = true;
        let out = reconcile(a).await.unwrap();
        let json: serde_json::Value = serde_json::from_str(&out.text).unwrap();
        assert_eq!(json["match_results"][0]["match_type"], "exact");
    }

    #[tokio::test]
    async fn unknown_account_is_a_tagged_failure() {
        let (csv, ledger) = (file(CSV), file(LEDGER));
        let mut a = args(&csv, &ledger, "Savings");
        a.json = true;
        let out = reconcile(a).await.unwrap();
        assert!(out.failed);
        let json: serde_json::Value = serde_json::from_str(&out.text).unwrap();
        assert_eq!(json["error"], "account_not_found");
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let ledger = file(LEDGER);
        let mut a = args(&file(CSV), &ledger, "acct-1");
        a.csv = PathBuf::from("/nonexistent/statement.csv");
        let err = reconcile(a).await.err().unwrap();
        assert!(format!("{err:#}").contains("cannot read /nonexistent/statement.csv"));
    }

    #[tokio::test]
    async fn config_file_and_overrides_apply() {
        let (csv, ledger) = (file(CSV), file(LEDGER));
        let config = file("date_window_days = 5\n");
        let mut a = args(&csv, &ledger, "acct-1");
        a.config = Some(config.path().to_path_buf());
        a.window = Some(-1);
        let err = reconcile(a).await.err().unwrap();
        assert!(format!("{err:#}").contains("date_window_days"));
    }

    #[test]
    fn detect_prints_column_table() {
        let csv = file(CSV);
        let out = detect(DetectArgs {
            csv: csv.path().to_path_buf(),
            hints: HintArgs::default(),
            json: false,
        })
        .unwrap();
        assert!(!out.failed);
        assert!(out.text.contains("Description"));
        assert!(out.text.contains("amount"));
    }

    #[test]
    fn detect_failure_lists_columns_and_hint_flags() {
        let csv = file("Date,Description\n10/20/2025,APPLE.COM/BILL\n");
        let out = detect(DetectArgs {
            csv: csv.path().to_path_buf(),
            hints: HintArgs::default(),
            json: false,
        })
        .unwrap();
        assert!(out.failed);
        assert!(out.text.contains("missing: amount"));
        assert!(out.text.contains("--amount-column"));
    }

    #[test]
    fn truncates_long_headers() {
        assert_eq!(truncate("Transaction Posting Date", 10), "Transacti~");
        assert_eq!(truncate("Date", 10), "Date");
    }
}
