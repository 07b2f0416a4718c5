use std::cmp::Ordering;
use std::collections::BTreeSet;

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tally_core::{LedgerTransaction, Money, StatementTransaction};

use crate::keywords::KeywordSet;
use crate::similarity::SimilarityScorer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Exact,
    Fuzzy,
    Unmatched,
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            MatchType::Exact => "exact",
            MatchType::Fuzzy => "fuzzy",
            MatchType::Unmatched => "unmatched",
        })
    }
}

/// Outcome for one ledger transaction, one statement line, or a pair of both.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchResult {
    pub ledger_transaction: Option<LedgerTransaction>,
    pub statement_transaction: Option<StatementTransaction>,
    pub match_type: MatchType,
    pub confidence: f64,
    /// Statement date minus ledger date, in days. Paired results only.
    pub date_delta_days: Option<i64>,
    /// Statement amount minus ledger amount. Paired results only.
    pub amount_delta: Option<Money>,
}

impl MatchResult {
    pub fn ledger_transaction_id(&self) -> Option<&str> {
        self.ledger_transaction.as_ref().map(|t| t.id.as_str())
    }

    pub fn is_matched(&self) -> bool {
        self.match_type != MatchType::Unmatched
    }

    /// The amount this result contributes: the statement side when present,
    /// else the ledger side.
    pub fn amount(&self) -> Money {
        match (&self.statement_transaction, &self.ledger_transaction) {
            (Some(s), _) => s.amount,
            (None, Some(l)) => l.amount(),
            (None, None) => Money::zero(),
        }
    }

    fn paired(
        ledger: &LedgerTransaction,
        statement: &StatementTransaction,
        match_type: MatchType,
        confidence: f64,
    ) -> Self {
        MatchResult {
            ledger_transaction: Some(ledger.clone()),
            statement_transaction: Some(statement.clone()),
            match_type,
            confidence,
            date_delta_days: Some((statement.date - ledger.date).num_days()),
            amount_delta: Some(statement.amount - ledger.amount()),
        }
    }

    fn ledger_only(ledger: &LedgerTransaction) -> Self {
        MatchResult {
            ledger_transaction: Some(ledger.clone()),
            statement_transaction: None,
            match_type: MatchType::Unmatched,
            confidence: 0.0,
            date_delta_days: None,
            amount_delta: None,
        }
    }

    fn statement_only(statement: &StatementTransaction) -> Self {
        MatchResult {
            ledger_transaction: None,
            statement_transaction: Some(statement.clone()),
            match_type: MatchType::Unmatched,
            confidence: 0.0,
            date_delta_days: None,
            amount_delta: None,
        }
    }
}

/// Relative weight of each signal in the fuzzy score. Normalized by their sum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchWeights {
    pub amount: f64,
    pub date: f64,
    pub description: f64,
}

impl Default for MatchWeights {
    fn default() -> Self {
        Self {
            amount: 0.35,
            date: 0.35,
            description: 0.3,
        }
    }
}

impl MatchWeights {
    fn combine(&self, amount: f64, date: f64, description: f64) -> f64 {
        let total = self.amount + self.date + self.description;
        if total <= 0.0 {
            return 0.0;
        }
        ((self.amount * amount + self.date * date + self.description * description) / total)
            .clamp(0.0, 1.0)
    }
}

pub struct MatchEngine {
    pub amount_tolerance: Decimal,
    pub date_window_days: i64,
    /// A fuzzy candidate must score strictly above this to be paired.
    pub min_confidence: f64,
    pub weights: MatchWeights,
    pub scorer: SimilarityScorer,
}

impl Default for MatchEngine {
    fn default() -> Self {
        Self {
            amount_tolerance: Decimal::new(1, 2),
            date_window_days: 3,
            min_confidence: 0.5,
            weights: MatchWeights::default(),
            scorer: SimilarityScorer::default(),
        }
    }
}

/// A scored pass-2 candidate; ordering puts the preferred candidate last.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    statement: usize,
    score: f64,
    days: i64,
    description: f64,
}

impl Candidate {
    fn preference(&self, other: &Candidate) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.days.cmp(&self.days))
            .then_with(|| self.description.total_cmp(&other.description))
            .then_with(|| other.statement.cmp(&self.statement))
    }
}

impl MatchEngine {
    /// One result per ledger transaction and per statement line: exact pairs,
    /// then fuzzy pairs, then unmatched ledger items, then unmatched statement
    /// lines, each group in input order.
    pub fn find_matches(
        &self,
        ledger: &[LedgerTransaction],
        statement: &[StatementTransaction],
    ) -> Vec<MatchResult> {
        let mut remaining_ledger: BTreeSet<usize> = (0..ledger.len()).collect();
        let mut remaining_statement: BTreeSet<usize> = (0..statement.len()).collect();
        let mut results = Vec::with_capacity(ledger.len() + statement.len());

        // ── Pass 1: exact ──
        for (li, l) in ledger.iter().enumerate() {
            let hit = remaining_statement
                .iter()
                .copied()
                .find(|&si| {
                    statement[si].date == l.date && self.within_tolerance(l, &statement[si])
                });
            if let Some(si) = hit {
                remaining_ledger.remove(&li);
                remaining_statement.remove(&si);
                results.push(MatchResult::paired(l, &statement[si], MatchType::Exact, 1.0));
            }
        }
        tracing::debug!(
            exact = results.len(),
            ledger_left = remaining_ledger.len(),
            statement_left = remaining_statement.len(),
            "exact pass done"
        );

        // ── Pass 2: fuzzy ──
        let statement_keywords: Vec<KeywordSet> = statement
            .iter()
            .map(|s| self.scorer.keywords(&s.description))
            .collect();
        let pass_one = results.len();
        let ledger_order: Vec<usize> = remaining_ledger.iter().copied().collect();
        for li in ledger_order {
            let l = &ledger[li];
            let keywords = self.scorer.keywords(&l.description());
            let best = remaining_statement
                .iter()
                .filter_map(|&si| {
                    self.candidate(l, &keywords, si, &statement[si], &statement_keywords[si])
                })
                .max_by(Candidate::preference);
            match best {
                Some(c) if c.score > self.min_confidence => {
                    remaining_ledger.remove(&li);
                    remaining_statement.remove(&c.statement);
                    results.push(MatchResult::paired(
                        l,
                        &statement[c.statement],
                        MatchType::Fuzzy,
                        c.score,
                    ));
                }
                Some(c) => tracing::debug!(
                    ledger_id = %l.id,
                    score = c.score,
                    "best fuzzy candidate not above confidence floor"
                ),
                None => {}
            }
        }
        tracing::debug!(fuzzy = results.len() - pass_one, "fuzzy pass done");

        // ── Remainder ──
        results.extend(remaining_ledger.iter().map(|&li| MatchResult::ledger_only(&ledger[li])));
        results.extend(
            remaining_statement
                .iter()
                .map(|&si| MatchResult::statement_only(&statement[si])),
        );
        results
    }

    fn within_tolerance(&self, ledger: &LedgerTransaction, statement: &StatementTransaction) -> bool {
        (statement.amount - ledger.amount()).amount().abs() <= self.amount_tolerance
    }

    fn candidate(
        &self,
        ledger: &LedgerTransaction,
        ledger_keywords: &KeywordSet,
        index: usize,
        statement: &StatementTransaction,
        statement_keywords: &KeywordSet,
    ) -> Option<Candidate> {
        let days = (statement.date - ledger.date).num_days().abs();
        if days > self.date_window_days || !self.within_tolerance(ledger, statement) {
            return None;
        }
        let amount = self.amount_closeness((statement.amount - ledger.amount()).amount().abs());
        let date = 1.0 - days as f64 / self.date_window_days.saturating_add(1) as f64;
        let description = self.scorer.score_keywords(ledger_keywords, statement_keywords);
        Some(Candidate {
            statement: index,
            score: self.weights.combine(amount, date, description),
            days,
            description,
        })
    }

    /// 1.0 for an identical amount, falling to 0.5 at the tolerance edge.
    fn amount_closeness(&self, delta: Decimal) -> f64 {
        if delta.is_zero() || self.amount_tolerance.is_zero() {
            return 1.0;
        }
        let ratio = (delta / self.amount_tolerance).to_f64().unwrap_or(1.0);
        1.0 - 0.5 * ratio.clamp(0.0, 1.0)
    }
}
