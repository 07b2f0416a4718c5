use crate::keywords::{KeywordSet, Lexicon};

/// Added to the overlap score when the shared keywords include a distinctive
/// merchant.
pub const DEFAULT_IMPORTANT_BOOST: f64 = 0.5;

/// Scores description similarity in `[0, 1]` from keyword overlap.
#[derive(Debug, Clone)]
pub struct SimilarityScorer {
    lexicon: Lexicon,
    important_boost: f64,
}

impl Default for SimilarityScorer {
    fn default() -> Self {
        Self::new(Lexicon::builtin().clone(), DEFAULT_IMPORTANT_BOOST)
    }
}

impl SimilarityScorer {
    pub fn new(lexicon: Lexicon, important_boost: f64) -> Self {
        Self {
            lexicon,
            important_boost,
        }
    }

    pub fn keywords(&self, description: &str) -> KeywordSet {
        self.lexicon.keywords(description)
    }

    pub fn score(&self, a: &str, b: &str) -> f64 {
        self.score_keywords(&self.keywords(a), &self.keywords(b))
    }

    /// Jaccard overlap, plus the boost when a shared keyword is an important
    /// merchant. Zero when either side has no keywords.
    pub fn score_keywords(&self, a: &KeywordSet, b: &KeywordSet) -> f64 {
        if a.is_empty() || b.is_empty() {
            return 0.0;
        }
        let shared: Vec<&String> = a.intersection(b).collect();
        if shared.is_empty() {
            return 0.0;
        }
        let union = a.union(b).count();
        let base = shared.len() as f64 / union as f64;
        let boost = if shared.iter().any(|k| self.lexicon.is_important(k)) {
            self.important_boost
        } else {
            0.0
        };
        (base + boost).clamp(0.0, 1.0)
    }
}

/// Similarity of two descriptions under the built-in lexicon.
pub fn description_similarity(a: &str, b: &str) -> f64 {
    SimilarityScorer::default().score(a, b)
}
