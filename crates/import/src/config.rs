use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::keywords::{Lexicon, LexiconOverrides};
use crate::match_engine::{MatchEngine, MatchWeights};
use crate::similarity::{SimilarityScorer, DEFAULT_IMPORTANT_BOOST};

/// Data rows sampled per column when classifying a layout.
pub const DEFAULT_SAMPLE_ROWS: usize = 25;

/// Widest fuzzy date window accepted, in days.
pub const MAX_DATE_WINDOW_DAYS: i64 = 366;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub amount_tolerance: Decimal,
    pub date_window_days: i64,
    pub min_confidence: f64,
    pub weights: MatchWeights,
    pub important_boost: f64,
    pub sample_rows: usize,
    pub lexicon: LexiconOverrides,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            amount_tolerance: Decimal::new(1, 2),
            date_window_days: 3,
            min_confidence: 0.5,
            weights: MatchWeights::default(),
            important_boost: DEFAULT_IMPORTANT_BOOST,
            sample_rows: DEFAULT_SAMPLE_ROWS,
            lexicon: LexiconOverrides::default(),
        }
    }
}

impl ReconcileConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let config: ReconcileConfig = toml::from_str(toml_content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.amount_tolerance.is_sign_negative() {
            return Err(invalid("amount_tolerance must not be negative"));
        }
        if !(0..=MAX_DATE_WINDOW_DAYS).contains(&self.date_window_days) {
            return Err(invalid("date_window_days must be between 0 and 366"));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(invalid("min_confidence must be between 0 and 1"));
        }
        let w = &self.weights;
        if w.amount < 0.0 || w.date < 0.0 || w.description < 0.0 {
            return Err(invalid("weights must not be negative"));
        }
        if w.amount + w.date + w.description <= 0.0 {
            return Err(invalid("at least one weight must be positive"));
        }
        if self.important_boost < 0.0 {
            return Err(invalid("important_boost must not be negative"));
        }
        if self.sample_rows == 0 {
            return Err(invalid("sample_rows must be at least 1"));
        }
        Ok(())
    }

    /// Built-in lexicon extended with the `[lexicon]` table.
    pub fn lexicon(&self) -> Lexicon {
        let mut lexicon = Lexicon::default();
        lexicon.extend(self.lexicon.clone());
        lexicon
    }

    pub fn match_engine(&self) -> MatchEngine {
        MatchEngine {
            amount_tolerance: self.amount_tolerance,
            date_window_days: self.date_window_days,
            min_confidence: self.min_confidence,
            weights: self.weights,
            scorer: SimilarityScorer::new(self.lexicon(), self.important_boost),
        }
    }
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn empty_document_is_default() {
        assert_eq!(ReconcileConfig::from_toml("").unwrap(), ReconcileConfig::default());
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let config = ReconcileConfig::from_toml(
            r#"
            amount_tolerance = "0.05"
            date_window_days = 5

            [weights]
            description = 0.5

            [lexicon.aliases]
            tjx = "tjmaxx"
            "#,
        )
        .unwrap();
        assert_eq!(config.amount_tolerance, dec!(0.05));
        assert_eq!(config.date_window_days, 5);
        assert_eq!(config.min_confidence, 0.5);
        assert_eq!(config.weights.amount, 0.35);
        assert_eq!(config.weights.description, 0.5);
        assert_eq!(config.sample_rows, DEFAULT_SAMPLE_ROWS);
        assert!(config.lexicon().keywords("TJX 0042").contains("tjmaxx"));
    }

    #[test]
    fn match_engine_carries_settings() {
        let config = ReconcileConfig {
            date_window_days: 7,
            ..ReconcileConfig::default()
        };
        let engine = config.match_engine();
        assert_eq!(engine.date_window_days, 7);
        assert_eq!(engine.amount_tolerance, dec!(0.01));
    }

    #[test]
    fn rejects_out_of_range_values() {
        for doc in [
            "min_confidence = 1.5",
            "date_window_days = -1",
            "date_window_days = 367",
            "date_window_days = 1000000000",
            "amount_tolerance = \"-0.01\"",
            "sample_rows = 0",
            "important_boost = -1.0",
            "[weights]\namount = 0.0\ndate = 0.0\ndescription = 0.0",
        ] {
            let err = ReconcileConfig::from_toml(doc).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid(_)), "{doc}: {err}");
        }
    }

    #[test]
    fn accepts_a_full_year_window() {
        let config = ReconcileConfig::from_toml("date_window_days = 366").unwrap();
        assert_eq!(config.date_window_days, MAX_DATE_WINDOW_DAYS);
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = ReconcileConfig::from_toml("date_window_days = \"soon\"").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }
}
