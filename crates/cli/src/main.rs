use std::path::PathBuf;
use std::process::ExitCode;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use tracing_subscriber::EnvFilter;

mod commands;

/// A report was produced.
const EXIT_SUCCESS: u8 = 0;
/// File or ledger snapshot could not be read.
const EXIT_ERROR: u8 = 1;
/// Reconciliation returned a tagged failure (format, account, upstream).
const EXIT_RECONCILE_FAILED: u8 = 2;

#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Reconcile a bank statement CSV against a budget ledger")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Match statement lines against ledger transactions and report the discrepancy
    #[command(after_help = "\
Examples:
  tally reconcile --csv october.csv --ledger ledger.json --account Checking \\
      --balance 2388.20 --date 2025-10-31
  tally reconcile --csv export.csv --ledger ledger.json --account acct-1 \\
      --balance -12.50 --date 2025-10-31 --amount-column \"Net Amount\" --json")]
    Reconcile(ReconcileArgs),

    /// Print the column analysis for a statement CSV
    Detect(DetectArgs),
}

#[derive(Args)]
struct ReconcileArgs {
    /// Bank statement export
    #[arg(long)]
    csv: PathBuf,

    /// Ledger snapshot (JSON with `accounts` and `transactions`)
    #[arg(long, env = "TALLY_LEDGER")]
    ledger: PathBuf,

    /// Account id or name
    #[arg(long)]
    account: String,

    /// Closing balance printed on the statement
    #[arg(long, allow_hyphen_values = true)]
    balance: Decimal,

    /// Statement closing date (YYYY-MM-DD)
    #[arg(long)]
    date: NaiveDate,

    /// Amount tolerance, overrides the config file
    #[arg(long)]
    tolerance: Option<Decimal>,

    /// Fuzzy date window in days, overrides the config file
    #[arg(long)]
    window: Option<i64>,

    /// TOML file with matching settings and lexicon additions
    #[arg(long, env = "TALLY_CONFIG")]
    config: Option<PathBuf>,

    #[command(flatten)]
    hints: HintArgs,

    /// Emit the report as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct DetectArgs {
    /// Bank statement export
    #[arg(long)]
    csv: PathBuf,

    #[command(flatten)]
    hints: HintArgs,

    /// Emit the analysis as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args, Default)]
struct HintArgs {
    /// Header of the date column
    #[arg(long)]
    date_column: Option<String>,

    /// Header of the description column
    #[arg(long)]
    description_column: Option<String>,

    /// Header of the signed amount column
    #[arg(long)]
    amount_column: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Reconcile(args) => commands::reconcile(args).await,
        Command::Detect(args) => commands::detect(args),
    };

    match outcome {
        Ok(commands::Output { text, failed }) => {
            println!("{text}");
            ExitCode::from(if failed {
                EXIT_RECONCILE_FAILED
            } else {
                EXIT_SUCCESS
            })
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_ERROR)
        }
    }
}
