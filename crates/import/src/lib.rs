pub mod config;
pub mod csv;
pub mod detect;
pub mod error;
pub mod keywords;
pub mod match_engine;
pub mod reconcile;
pub mod report;
pub mod similarity;

pub use config::ReconcileConfig;
pub use self::csv::{normalize, parse_amount, parse_date, NormalizedStatement, RowWarning};
pub use detect::{detect, ColumnAnalysis, ColumnHints, ColumnRole, Detection};
pub use error::{ConfigError, FormatError, FormatFailure, ReconcileError};
pub use keywords::{extract_keywords, KeywordSet, Lexicon};
pub use match_engine::{MatchEngine, MatchResult, MatchType, MatchWeights};
pub use reconcile::{reconcile, ReconcileRequest};
pub use report::{ItemFlag, ReconciliationReport, UnmatchedItem};
pub use similarity::{description_similarity, SimilarityScorer};
