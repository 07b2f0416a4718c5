use std::fmt;

use serde::{Deserialize, Serialize};

use crate::csv::{looks_like_amount, parse_date, CsvTable};
use crate::error::{FormatError, FormatFailure};

/// Minimum score for a column to be trusted with a role.
pub const MIN_ROLE_SCORE: f64 = 0.45;

/// Share of a column's score that comes from its values; header keywords
/// contribute at most the remainder.
const CONTENT_WEIGHT: f64 = 0.8;

/// Average text length below which a column cannot be a description, and the
/// length at which the length factor saturates.
const MIN_DESCRIPTION_LEN: f64 = 3.0;
const FULL_DESCRIPTION_LEN: f64 = 8.0;

/// Integer-only columns (check numbers, quantities) are weaker amount evidence.
const INTEGER_AMOUNT_FACTOR: f64 = 0.6;

const SAMPLES_PER_COLUMN: usize = 3;

// ── Header keyword tables ─────────────────────────────────────────────────────
//
// (keyword, adjustment) pairs matched against the lower-cased header. The
// largest positive match applies; all negative matches accumulate.

const DATE_HEADER_WEIGHTS: &[(&str, f64)] = &[
    ("post", 0.2),
    ("date", 0.15),
    ("effective", -0.05),
    ("settle", -0.05),
    ("value", -0.05),
];

const AMOUNT_HEADER_WEIGHTS: &[(&str, f64)] = &[
    ("amount", 0.2),
    ("debit", 0.15),
    ("credit", 0.15),
    ("withdrawal", 0.15),
    ("deposit", 0.15),
    ("balance", -0.6),
    ("quantity", -0.6),
    ("qty", -0.6),
    ("price", -0.6),
    ("shares", -0.6),
    ("number", -0.6),
    ("#", -0.6),
    ("reference", -0.6),
    ("check", -0.3),
];

const DESCRIPTION_HEADER_WEIGHTS: &[(&str, f64)] = &[
    ("description", 0.2),
    ("payee", 0.2),
    ("merchant", 0.2),
    ("narrative", 0.2),
    ("memo", 0.1),
    ("detail", 0.1),
    ("name", 0.1),
    ("address", -0.4),
    ("type", -0.2),
    ("category", -0.2),
    ("status", -0.2),
    ("action", -0.2),
    ("symbol", -0.2),
    ("account", -0.2),
    ("reference", -0.2),
    ("city", -0.2),
    ("card", -0.2),
];

const DEBIT_HEADERS: &[&str] = &["debit", "withdrawal", "money out", "paid out", "outflow"];
const CREDIT_HEADERS: &[&str] = &["credit", "deposit", "money in", "paid in", "inflow"];

// ── Types ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnRole {
    Date,
    Description,
    Amount,
    Unknown,
}

impl fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnRole::Date => write!(f, "date"),
            ColumnRole::Description => write!(f, "description"),
            ColumnRole::Amount => write!(f, "amount"),
            ColumnRole::Unknown => write!(f, "unknown"),
        }
    }
}

/// Explicit column names supplied by the caller. A hinted column takes its
/// role regardless of content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnHints {
    pub date_column: Option<String>,
    pub description_column: Option<String>,
    pub amount_column: Option<String>,
}

impl ColumnHints {
    fn for_role(&self, role: ColumnRole) -> Option<&str> {
        match role {
            ColumnRole::Date => self.date_column.as_deref(),
            ColumnRole::Description => self.description_column.as_deref(),
            ColumnRole::Amount => self.amount_column.as_deref(),
            ColumnRole::Unknown => None,
        }
    }
}

/// Per-role scores for one column, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RoleScores {
    pub date: f64,
    pub description: f64,
    pub amount: f64,
}

impl RoleScores {
    pub fn get(&self, role: ColumnRole) -> f64 {
        match role {
            ColumnRole::Date => self.date,
            ColumnRole::Description => self.description,
            ColumnRole::Amount => self.amount,
            ColumnRole::Unknown => 0.0,
        }
    }

    /// Highest-scoring role; ties resolve date, amount, description.
    pub fn best(&self) -> (ColumnRole, f64) {
        [
            (ColumnRole::Date, self.date),
            (ColumnRole::Amount, self.amount),
            (ColumnRole::Description, self.description),
        ]
        .into_iter()
        .fold((ColumnRole::Unknown, 0.0), |best, cand| {
            if cand.1 > best.1 {
                cand
            } else {
                best
            }
        })
    }
}

/// One row of the column analysis table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnAnalysis {
    pub index: usize,
    pub header: String,
    pub role: ColumnRole,
    pub confidence: f64,
    pub scores: RoleScores,
    pub samples: Vec<String>,
}

/// Where a row's signed amount comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AmountColumns {
    /// A single column holding signed values.
    Signed { column: usize },
    /// Separate debit and credit columns; debits become negative.
    Split {
        debit: Option<usize>,
        credit: Option<usize>,
    },
}

/// A successful classification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection {
    pub delimiter: char,
    pub has_header: bool,
    pub date_column: usize,
    pub description_column: usize,
    pub amount: AmountColumns,
    pub confidence: f64,
    pub columns: Vec<ColumnAnalysis>,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Classifies the columns of raw CSV text.
pub fn detect(
    text: &str,
    hints: &ColumnHints,
    sample_rows: usize,
) -> Result<Detection, FormatError> {
    let table = CsvTable::parse(text)?;
    classify(&table, hints, sample_rows)
}

/// Scores one column for every role from its header and sampled values.
pub fn score_column(header: &str, values: &[&str]) -> RoleScores {
    let header = header.to_lowercase();
    let values: Vec<&str> = values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect();
    if values.is_empty() {
        return RoleScores::default();
    }
    let n = values.len() as f64;

    let mut dates = 0usize;
    let mut amounts = 0usize;
    let mut text_lens = Vec::new();
    for v in &values {
        if parse_date(v).is_ok() {
            dates += 1;
        } else if looks_like_amount(v) {
            amounts += 1;
        } else if v.chars().any(char::is_alphabetic) {
            text_lens.push(v.chars().count());
        }
    }

    let date_ratio = dates as f64 / n;

    let mut amount_ratio = amounts as f64 / n;
    if !values.iter().any(|v| v.contains(&['.', '$'][..])) {
        amount_ratio *= INTEGER_AMOUNT_FACTOR;
    }

    let description_ratio = if text_lens.is_empty() {
        0.0
    } else {
        let avg_len = text_lens.iter().sum::<usize>() as f64 / text_lens.len() as f64;
        if avg_len < MIN_DESCRIPTION_LEN {
            0.0
        } else {
            (text_lens.len() as f64 / n) * (avg_len / FULL_DESCRIPTION_LEN).min(1.0)
        }
    };

    RoleScores {
        date: weigh(date_ratio, &header, DATE_HEADER_WEIGHTS),
        amount: weigh(amount_ratio, &header, AMOUNT_HEADER_WEIGHTS),
        description: weigh(description_ratio, &header, DESCRIPTION_HEADER_WEIGHTS),
    }
}

fn weigh(content: f64, header: &str, weights: &[(&str, f64)]) -> f64 {
    if content <= 0.0 {
        return 0.0;
    }
    let (bonus, penalty) = weights
        .iter()
        .filter(|(kw, _)| header.contains(kw))
        .fold((0.0f64, 0.0f64), |(bonus, penalty), &(_, w)| {
            if w > 0.0 {
                (bonus.max(w), penalty)
            } else {
                (bonus, penalty + w)
            }
        });
    (CONTENT_WEIGHT * content + bonus + penalty).clamp(0.0, 1.0)
}

// ── Classification ────────────────────────────────────────────────────────────

pub(crate) fn classify(
    table: &CsvTable,
    hints: &ColumnHints,
    sample_rows: usize,
) -> Result<Detection, FormatError> {
    let mut columns: Vec<ColumnAnalysis> = table
        .headers
        .iter()
        .enumerate()
        .map(|(index, header)| {
            let values: Vec<&str> = table
                .rows
                .iter()
                .take(sample_rows.max(1))
                .filter_map(|r| r.field(index))
                .collect();
            let scores = score_column(header, &values);
            let (role, confidence) = scores.best();
            let role = if confidence >= MIN_ROLE_SCORE { role } else { ColumnRole::Unknown };
            tracing::debug!(
                column = %header,
                date = scores.date,
                amount = scores.amount,
                description = scores.description,
                "scored column"
            );
            ColumnAnalysis {
                index,
                header: header.clone(),
                role,
                confidence,
                scores,
                samples: values
                    .iter()
                    .filter(|v| !v.is_empty())
                    .take(SAMPLES_PER_COLUMN)
                    .map(|v| v.to_string())
                    .collect(),
            }
        })
        .collect();

    if table.rows.is_empty() {
        return Err(FormatError {
            reason: FormatFailure::NoDataRows,
            columns,
        });
    }

    let mut assigned: Vec<Option<ColumnRole>> = vec![None; columns.len()];

    // Hints first: they win outright.
    let mut hinted = [None; 3];
    for (slot, role) in [ColumnRole::Date, ColumnRole::Description, ColumnRole::Amount]
        .into_iter()
        .enumerate()
    {
        let Some(name) = hints.for_role(role) else {
            continue;
        };
        let found = columns
            .iter()
            .position(|c| c.header.trim().eq_ignore_ascii_case(name.trim()));
        let Some(index) = found else {
            return Err(FormatError {
                reason: FormatFailure::UnknownHint {
                    role,
                    column: name.to_string(),
                },
                columns,
            });
        };
        assigned[index] = Some(role);
        hinted[slot] = Some(index);
    }

    let date_column = hinted[0].or_else(|| best_free(&columns, &assigned, ColumnRole::Date));
    if let Some(i) = date_column {
        assigned[i] = Some(ColumnRole::Date);
    }

    let amount = match hinted[2] {
        Some(column) => Some(AmountColumns::Signed { column }),
        None => pick_amount(&columns, &assigned),
    };
    match amount {
        Some(AmountColumns::Signed { column }) => assigned[column] = Some(ColumnRole::Amount),
        Some(AmountColumns::Split { debit, credit }) => {
            for i in [debit, credit].into_iter().flatten() {
                assigned[i] = Some(ColumnRole::Amount);
            }
        }
        None => {}
    }

    let description_column =
        hinted[1].or_else(|| best_free(&columns, &assigned, ColumnRole::Description));
    if let Some(i) = description_column {
        assigned[i] = Some(ColumnRole::Description);
    }

    // The analysis table reports the final assignment.
    for col in &mut columns {
        match assigned[col.index] {
            Some(role) => {
                col.role = role;
                col.confidence = if Some(col.index) == hinted_for(&hinted, role) {
                    1.0
                } else {
                    col.scores.get(role)
                };
            }
            None => col.role = ColumnRole::Unknown,
        }
    }

    let (date_column, description_column, amount) = match (date_column, description_column, amount)
    {
        (Some(d), Some(s), Some(a)) => (d, s, a),
        (d, s, a) => {
            let missing: Vec<ColumnRole> = [
                (ColumnRole::Date, d.is_some()),
                (ColumnRole::Description, s.is_some()),
                (ColumnRole::Amount, a.is_some()),
            ]
            .into_iter()
            .filter(|(_, found)| !found)
            .map(|(role, _)| role)
            .collect();
            tracing::debug!(?missing, "column classification failed");
            return Err(FormatError {
                reason: FormatFailure::TooFewRoles {
                    found: 3 - missing.len(),
                    missing,
                },
                columns,
            });
        }
    };

    let role_confidences: Vec<f64> = columns
        .iter()
        .filter(|c| c.role != ColumnRole::Unknown)
        .map(|c| c.confidence)
        .collect();
    let confidence = role_confidences.iter().sum::<f64>() / role_confidences.len() as f64;

    tracing::debug!(
        date = %columns[date_column].header,
        description = %columns[description_column].header,
        ?amount,
        confidence,
        "classified columns"
    );

    Ok(Detection {
        delimiter: char::from(table.delimiter),
        has_header: table.has_header,
        date_column,
        description_column,
        amount,
        confidence,
        columns,
    })
}

fn hinted_for(hinted: &[Option<usize>; 3], role: ColumnRole) -> Option<usize> {
    match role {
        ColumnRole::Date => hinted[0],
        ColumnRole::Description => hinted[1],
        ColumnRole::Amount => hinted[2],
        ColumnRole::Unknown => None,
    }
}

/// Best unassigned column for `role` at or above [`MIN_ROLE_SCORE`]. Ties go
/// to the leftmost column.
fn best_free(
    columns: &[ColumnAnalysis],
    assigned: &[Option<ColumnRole>],
    role: ColumnRole,
) -> Option<usize> {
    columns
        .iter()
        .filter(|c| assigned[c.index].is_none())
        .map(|c| (c.index, c.scores.get(role)))
        .filter(|&(_, score)| score >= MIN_ROLE_SCORE)
        .fold(None, |best: Option<(usize, f64)>, cand| match best {
            Some(b) if b.1 >= cand.1 => Some(b),
            _ => Some(cand),
        })
        .map(|(i, _)| i)
}

/// A debit/credit column pair wins over a single signed column. Either side
/// of a pair may be empty in the sample as long as the other is clearly an
/// amount column.
fn pick_amount(columns: &[ColumnAnalysis], assigned: &[Option<ColumnRole>]) -> Option<AmountColumns> {
    let free_with = |keywords: &[&str]| {
        columns
            .iter()
            .filter(|c| assigned[c.index].is_none())
            .filter(|c| c.samples.is_empty() || c.scores.amount >= MIN_ROLE_SCORE)
            .find(|c| {
                let header = c.header.to_lowercase();
                keywords.iter().any(|kw| header.contains(kw))
            })
            .map(|c| c.index)
    };

    let debit = free_with(DEBIT_HEADERS);
    let credit = free_with(CREDIT_HEADERS);
    if let (Some(d), Some(c)) = (debit, credit) {
        let sampled = [d, c]
            .iter()
            .any(|&i| columns[i].scores.amount >= MIN_ROLE_SCORE);
        if d != c && sampled {
            return Some(AmountColumns::Split {
                debit: Some(d),
                credit: Some(c),
            });
        }
    }

    best_free(columns, assigned, ColumnRole::Amount).map(|column| AmountColumns::Signed { column })
}
