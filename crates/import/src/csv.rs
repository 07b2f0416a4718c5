use std::str::FromStr;
use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_core::{Money, StatementTransaction};
use thiserror::Error;

use crate::detect::{self, AmountColumns, ColumnHints, Detection};
use crate::error::FormatError;

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

// Optional sign, optional parentheses, optional `$`, optional thousands
// separators. The integer part is capped so long reference numbers do not
// pass for amounts.
re!(re_currency,
    r"^[+-]?\(?\s*[+-]?\$?\s*[+-]?(?:\d{1,3}(?:,\d{3})+|\d{1,12})(?:\.\d+)?\s*\)?$");

const DATE_FORMATS: &[&str] = &[
    "%m/%d/%Y", "%Y-%m-%d", "%Y/%m/%d", "%m-%d-%Y", "%d/%m/%Y", "%m/%d/%y", "%m-%d-%y",
    "%b %d, %Y", "%B %d, %Y", "%b %d %Y", "%B %d %Y", "%d %b %Y", "%d %B %Y", "%d-%b-%Y",
    "%d-%b-%y",
];

const DELIMITERS: &[u8] = b",;\t|";

/// Leading rows with fewer non-empty fields than this, and no date or amount,
/// are treated as preamble (account banners, export titles) and skipped.
const MIN_TABLE_FIELDS: usize = 3;

#[derive(Error, Debug)]
pub enum CsvError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Missing column {0}")]
    MissingColumn(usize),
    #[error("Invalid date: '{0}'")]
    InvalidDate(String),
    #[error("Invalid amount: '{0}'")]
    InvalidAmount(String),
}

/// A data row that was skipped because its date or amount did not parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowWarning {
    pub line: u64,
    pub reason: String,
    pub raw_data: String,
}

/// Output of [`normalize`]: the parsed rows in file order plus everything that
/// was learned or skipped along the way.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedStatement {
    pub transactions: Vec<StatementTransaction>,
    pub warnings: Vec<RowWarning>,
    pub detection: Detection,
}

// ── Raw table ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub(crate) struct CsvRow {
    pub line: u64,
    pub fields: Vec<String>,
    pub raw: String,
}

impl CsvRow {
    pub fn field(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    fn non_empty_fields(&self) -> usize {
        self.fields.iter().filter(|f| !f.is_empty()).count()
    }

    /// Whether any field is date- or currency-shaped.
    fn has_data_field(&self) -> bool {
        self.fields
            .iter()
            .any(|f| parse_date(f).is_ok() || looks_like_amount(f))
    }
}

#[derive(Debug, Clone)]
pub(crate) struct CsvTable {
    pub delimiter: u8,
    pub has_header: bool,
    pub headers: Vec<String>,
    pub rows: Vec<CsvRow>,
}

impl CsvTable {
    pub fn parse(text: &str) -> Result<CsvTable, CsvError> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let delimiter = sniff_delimiter(text);
        let mut rows = read_rows(text, delimiter)?;

        let preamble = rows
            .iter()
            .take_while(|r| r.non_empty_fields() < MIN_TABLE_FIELDS && !r.has_data_field())
            .count();
        if preamble < rows.len() {
            rows.drain(..preamble);
        }

        let width = rows.iter().map(|r| r.fields.len()).max().unwrap_or(0);
        let has_header = rows.first().is_some_and(|first| !first.has_data_field());

        let headers = if has_header {
            let first = rows.remove(0);
            (0..width)
                .map(|i| match first.field(i) {
                    Some(h) if !h.is_empty() => h.to_string(),
                    _ => column_name(i),
                })
                .collect()
        } else {
            (0..width).map(column_name).collect()
        };

        Ok(CsvTable {
            delimiter,
            has_header,
            headers,
            rows,
        })
    }
}

fn column_name(index: usize) -> String {
    format!("column_{}", index + 1)
}

/// Picks the delimiter whose per-line field count is most consistent across
/// the first few lines. Commas win ties.
fn sniff_delimiter(text: &str) -> u8 {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .take(10)
        .collect();

    DELIMITERS
        .iter()
        .copied()
        .map(|d| {
            let counts: Vec<usize> = lines.iter().map(|l| count_unquoted(l, d)).collect();
            let best = counts
                .iter()
                .filter(|&&c| c > 0)
                .map(|&c| (counts.iter().filter(|&&x| x == c).count(), c))
                .max()
                .unwrap_or((0, 0));
            (d, best)
        })
        .fold((b',', (0, 0)), |acc, cand| if cand.1 > acc.1 { cand } else { acc })
        .0
}

fn count_unquoted(line: &str, delimiter: u8) -> usize {
    let mut quoted = false;
    let mut count = 0;
    for b in line.bytes() {
        if b == b'"' {
            quoted = !quoted;
        } else if b == delimiter && !quoted {
            count += 1;
        }
    }
    count
}

/// Reads every non-blank record, keeping the source line number and the raw
/// row text for traceability.
fn read_rows(text: &str, delimiter: u8) -> Result<Vec<CsvRow>, CsvError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());

    let mut pending: Vec<(usize, u64, Vec<String>)> = Vec::new();
    for result in reader.records() {
        let record = result?;
        let (byte, line) = record
            .position()
            .map(|p| (p.byte() as usize, p.line()))
            .unwrap_or((0, 0));
        let fields: Vec<String> = record.iter().map(str::to_string).collect();
        if fields.iter().all(|f| f.is_empty()) {
            continue;
        }
        pending.push((byte, line, fields));
    }

    let ends: Vec<usize> = pending
        .iter()
        .skip(1)
        .map(|(byte, _, _)| *byte)
        .chain(std::iter::once(text.len()))
        .collect();

    Ok(pending
        .into_iter()
        .zip(ends)
        .map(|((start, line, fields), end)| CsvRow {
            line,
            fields,
            raw: text.get(start..end).unwrap_or_default().trim_end().to_string(),
        })
        .collect())
}

// ── Normalization ─────────────────────────────────────────────────────────────

/// Parses an arbitrary bank export into statement transactions.
///
/// Column roles come from the detector; a layout that cannot be
/// classified fails with the same [`FormatError`] the detector reports. Rows
/// whose date or amount cannot be parsed are skipped and reported as
/// [`RowWarning`]s.
pub fn normalize(
    text: &str,
    hints: &ColumnHints,
    sample_rows: usize,
) -> Result<NormalizedStatement, FormatError> {
    let table = CsvTable::parse(text)?;
    let detection = detect::classify(&table, hints, sample_rows)?;

    let mut transactions = Vec::with_capacity(table.rows.len());
    let mut warnings = Vec::new();

    for row in &table.rows {
        match convert_row(row, &detection) {
            Ok(tx) => transactions.push(tx),
            Err(e) => {
                tracing::warn!(line = row.line, "skipping statement row: {e}");
                warnings.push(RowWarning {
                    line: row.line,
                    reason: e.to_string(),
                    raw_data: row.raw.clone(),
                });
            }
        }
    }

    tracing::info!(
        rows = transactions.len(),
        skipped = warnings.len(),
        confidence = detection.confidence,
        "normalized statement"
    );

    Ok(NormalizedStatement {
        transactions,
        warnings,
        detection,
    })
}

fn convert_row(row: &CsvRow, detection: &Detection) -> Result<StatementTransaction, CsvError> {
    let date_field = row
        .field(detection.date_column)
        .ok_or(CsvError::MissingColumn(detection.date_column))?;
    let date = parse_date(date_field)?;

    let description = row
        .field(detection.description_column)
        .unwrap_or_default()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let amount = match detection.amount {
        AmountColumns::Signed { column } => {
            let field = row.field(column).ok_or(CsvError::MissingColumn(column))?;
            parse_amount(field)?
        }
        AmountColumns::Split { debit, credit } => {
            let side = |col: Option<usize>| {
                col.and_then(|c| row.field(c))
                    .filter(|s| !s.is_empty())
                    .map(parse_amount)
                    .transpose()
            };
            match (side(debit)?, side(credit)?) {
                (Some(d), None) => -d.abs(),
                (None, Some(c)) => c.abs(),
                (Some(d), Some(c)) => c.abs() - d.abs(),
                (None, None) => {
                    return Err(CsvError::InvalidAmount(
                        "no debit or credit value".to_string(),
                    ))
                }
            }
        }
    };

    Ok(StatementTransaction {
        line: row.line,
        date,
        description,
        amount: Money::new(amount),
        raw_data: row.raw.clone(),
    })
}

// ── Field parsing ─────────────────────────────────────────────────────────────

/// Whether a field has the shape of a currency amount.
pub fn looks_like_amount(s: &str) -> bool {
    let s = s.trim();
    !s.is_empty() && re_currency().is_match(s) && parse_amount(s).is_ok()
}

/// Parses currency text such as `$99.80`, `($99.80)`, `-$4000.00` or
/// `1,234.56` into a signed decimal.
pub fn parse_amount(s: &str) -> Result<Decimal, CsvError> {
    let s = s.trim();
    if !re_currency().is_match(s) {
        return Err(CsvError::InvalidAmount(s.to_string()));
    }

    // parentheses carry the sign; an extra `-` or `+` is ambiguous
    let (mut negative, inner) = match (s.find('('), s.rfind(')')) {
        (Some(_), Some(_)) if s.contains(&['-', '+'][..]) => {
            return Err(CsvError::InvalidAmount(s.to_string()))
        }
        (Some(open), Some(close)) if open < close => {
            (true, s.replacen('(', "", 1).replacen(')', "", 1))
        }
        (None, None) => (false, s.to_string()),
        _ => return Err(CsvError::InvalidAmount(s.to_string())),
    };

    let mut digits = String::with_capacity(inner.len());
    for c in inner.chars() {
        match c {
            '-' => negative = !negative,
            '+' | '$' | ',' => {}
            c if c.is_whitespace() => {}
            c => digits.push(c),
        }
    }

    let value =
        Decimal::from_str(&digits).map_err(|_| CsvError::InvalidAmount(s.to_string()))?;
    Ok(if negative { -value } else { value })
}

/// Parses a statement date in any of the common export formats.
pub fn parse_date(s: &str) -> Result<NaiveDate, CsvError> {
    let s = s.trim();
    // ISO timestamps: keep the calendar date.
    let candidate = match s.get(..10) {
        Some(prefix) if s.len() > 10 && matches!(s.as_bytes()[10], b'T' | b' ') => prefix,
        _ => s,
    };

    DATE_FORMATS
        .iter()
        .filter_map(|fmt| NaiveDate::parse_from_str(candidate, fmt).ok())
        .find(|d| (1900..=2200).contains(&d.year()))
        .ok_or_else(|| CsvError::InvalidDate(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    // ── parse_amount ──────────────────────────────────────────────────────────

    #[test]
    fn parse_amount_plain() {
        assert_eq!(parse_amount("123.45").unwrap(), dec!(123.45));
    }

    #[test]
    fn parse_amount_with_dollar_sign() {
        assert_eq!(parse_amount("$99.80").unwrap(), dec!(99.80));
    }

    #[test]
    fn parse_amount_accounting_parens() {
        assert_eq!(parse_amount("($99.80)").unwrap(), dec!(-99.80));
        assert_eq!(parse_amount("(75.25)").unwrap(), dec!(-75.25));
    }

    #[test]
    fn parse_amount_sign_before_currency_symbol() {
        assert_eq!(parse_amount("-$4000.00").unwrap(), dec!(-4000.00));
        assert_eq!(parse_amount("$-4,000.00").unwrap(), dec!(-4000.00));
        assert_eq!(parse_amount("+12.00").unwrap(), dec!(12.00));
    }

    #[test]
    fn parse_amount_with_commas() {
        assert_eq!(parse_amount("1,234.56").unwrap(), dec!(1234.56));
    }

    #[test]
    fn parse_amount_invalid() {
        assert!(parse_amount("not_a_number").is_err());
        assert!(parse_amount("").is_err());
        assert!(parse_amount("(12.00").is_err());
        assert!(parse_amount("(-5.00)").is_err());
        assert!(parse_amount("-(5.00)").is_err());
        assert!(parse_amount("($+5.00)").is_err());
        assert!(parse_amount("10/20/2025").is_err());
        assert!(parse_amount("24492155296000000000000").is_err());
    }

    #[test]
    fn looks_like_amount_rejects_dates_and_text() {
        assert!(looks_like_amount("-99.80"));
        assert!(!looks_like_amount("2025-10-20"));
        assert!(!looks_like_amount("APPLE.COM/BILL"));
        assert!(!looks_like_amount("*"));
    }

    // ── parse_date ────────────────────────────────────────────────────────────

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn parse_date_common_formats() {
        assert_eq!(parse_date("2025-10-20").unwrap(), d(2025, 10, 20));
        assert_eq!(parse_date("10/20/2025").unwrap(), d(2025, 10, 20));
        assert_eq!(parse_date("2025/10/20").unwrap(), d(2025, 10, 20));
        assert_eq!(parse_date("Oct 20, 2025").unwrap(), d(2025, 10, 20));
        assert_eq!(parse_date("October 20, 2025").unwrap(), d(2025, 10, 20));
        assert_eq!(parse_date("20 Oct 2025").unwrap(), d(2025, 10, 20));
    }

    #[test]
    fn parse_date_two_digit_year_is_not_year_25() {
        assert_eq!(parse_date("10/20/25").unwrap(), d(2025, 10, 20));
    }

    #[test]
    fn parse_date_day_first_fallback() {
        assert_eq!(parse_date("20/10/2025").unwrap(), d(2025, 10, 20));
    }

    #[test]
    fn parse_date_iso_timestamp() {
        assert_eq!(parse_date("2025-10-20T08:15:00Z").unwrap(), d(2025, 10, 20));
    }

    #[test]
    fn parse_date_invalid() {
        assert!(parse_date("not-a-date").is_err());
        assert!(parse_date("99.80").is_err());
        assert!(parse_date("").is_err());
    }

    // ── table reading ─────────────────────────────────────────────────────────

    #[test]
    fn quoted_fields_keep_embedded_commas_and_raw_text() {
        let text = "Date,Description,Amount\n2025-10-20,\"APPLE, INC\",-99.80\n";
        let table = CsvTable::parse(text).unwrap();
        assert!(table.has_header);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].fields[1], "APPLE, INC");
        assert_eq!(table.rows[0].raw, "2025-10-20,\"APPLE, INC\",-99.80");
        assert_eq!(table.rows[0].line, 2);
    }

    #[test]
    fn blank_lines_and_preamble_are_skipped() {
        let text = "Account:,Checking\n\nDate,Description,Amount\n\n2025-10-20,Coffee,-4.50\n\n";
        let table = CsvTable::parse(text).unwrap();
        assert_eq!(table.headers, vec!["Date", "Description", "Amount"]);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].raw, "2025-10-20,Coffee,-4.50");
    }

    #[test]
    fn preamble_scan_stops_at_a_data_row() {
        let text = "10/20/2025,,-99.80\n10/21/2025,COFFEE SHOP,-4.50\n";
        let table = CsvTable::parse(text).unwrap();
        assert!(!table.has_header);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].line, 1);
    }

    #[test]
    fn headerless_file_gets_positional_names() {
        let text = "\"-99.80\",\"10/20/2025\",\"*\",\"\",\"APPLE.COM/BILL\"\n";
        let table = CsvTable::parse(text).unwrap();
        assert!(!table.has_header);
        assert_eq!(table.headers[0], "column_1");
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn semicolon_delimiter_is_sniffed() {
        let text = "Date;Description;Amount\n2025-10-20;Coffee;-4.50\n";
        let table = CsvTable::parse(text).unwrap();
        assert_eq!(table.delimiter, b';');
        assert_eq!(table.rows[0].fields[2], "-4.50");
    }
}
