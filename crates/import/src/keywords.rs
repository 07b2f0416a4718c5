use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub type KeywordSet = BTreeSet<String>;

/// Purely numeric tokens this long are reference or check numbers.
const MIN_REFERENCE_DIGITS: usize = 4;

pub const DEFAULT_STOPWORDS: &[&str] = &[
    "web", "id", "ach", "ppd", "ccd", "trn", "pos", "des", "indn", "orig", "co", "debit",
    "credit", "card", "checkcard", "purchase", "payment", "pmt", "pymt", "online", "www",
    "com", "net", "org", "inc", "llc", "ltd", "corp", "the", "and", "of", "ref", "txn", "trx",
    "recurring", "bill", "billing", "ext", "sq", "tst", "visa", "mc", "dbt", "usa", "us",
];

/// Compressed bank merchant codes and their canonical brand keyword.
pub const DEFAULT_ALIASES: &[(&str, &str)] = &[
    ("amzn", "amazon"),
    ("amz", "amazon"),
    ("mktp", "marketplace"),
    ("mktplace", "marketplace"),
    ("apl", "apple"),
    ("itunes", "apple"),
    ("wmt", "walmart"),
    ("wm", "walmart"),
    ("tgt", "target"),
    ("sbux", "starbucks"),
    ("mcdonald", "mcdonalds"),
    ("mcd", "mcdonalds"),
    ("mcdonal", "mcdonalds"),
    ("pypl", "paypal"),
    ("nflx", "netflix"),
    ("goog", "google"),
    ("msft", "microsoft"),
    ("wag", "walgreens"),
    ("wgreens", "walgreens"),
    ("dd", "doordash"),
    ("xfinity", "comcast"),
];

/// Merchants distinctive enough that sharing one outweighs generic overlap.
pub const DEFAULT_IMPORTANT: &[&str] = &[
    "amazon", "apple", "walmart", "target", "costco", "starbucks", "mcdonalds", "netflix",
    "spotify", "hulu", "uber", "lyft", "paypal", "venmo", "google", "microsoft", "comcast",
    "verizon", "tmobile", "chevron", "shell", "exxon", "kroger", "safeway", "walgreens", "cvs",
    "doordash", "chipotle", "ikea", "airbnb", "github", "zelle",
];

/// User additions merged over the built-in tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LexiconOverrides {
    #[serde(default)]
    pub stopwords: Vec<String>,
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
    #[serde(default)]
    pub important: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lexicon {
    stopwords: HashSet<String>,
    aliases: HashMap<String, String>,
    important: HashSet<String>,
}

impl Default for Lexicon {
    fn default() -> Self {
        Self {
            stopwords: DEFAULT_STOPWORDS.iter().map(|s| s.to_string()).collect(),
            aliases: DEFAULT_ALIASES
                .iter()
                .map(|(code, brand)| (code.to_string(), brand.to_string()))
                .collect(),
            important: DEFAULT_IMPORTANT.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Lexicon {
    /// The built-in lexicon, shared.
    pub fn builtin() -> &'static Lexicon {
        static LEXICON: OnceLock<Lexicon> = OnceLock::new();
        LEXICON.get_or_init(Lexicon::default)
    }

    /// Built-in tables extended with the entries of a TOML document.
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let overrides: LexiconOverrides = toml::from_str(toml_content)?;
        let mut lexicon = Self::default();
        lexicon.extend(overrides);
        Ok(lexicon)
    }

    pub fn extend(&mut self, overrides: LexiconOverrides) {
        let norm = |s: &str| s.trim().to_lowercase();
        self.stopwords
            .extend(overrides.stopwords.iter().map(|s| norm(s)));
        self.aliases.extend(
            overrides
                .aliases
                .iter()
                .map(|(code, brand)| (norm(code), norm(brand))),
        );
        self.important
            .extend(overrides.important.iter().map(|s| norm(s)));
    }

    pub fn is_important(&self, keyword: &str) -> bool {
        self.important.contains(keyword)
    }

    /// Reduces a description to its meaningful, canonical tokens.
    pub fn keywords(&self, description: &str) -> KeywordSet {
        description
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .filter(|t| !is_reference_number(t))
            .map(|t| self.aliases.get(&t).cloned().unwrap_or(t))
            .filter(|t| t.chars().count() > 1)
            .filter(|t| !self.stopwords.contains(t))
            .collect()
    }
}

fn is_reference_number(token: &str) -> bool {
    token.len() >= MIN_REFERENCE_DIGITS && token.chars().all(|c| c.is_ascii_digit())
}

/// Keywords of `description` under the built-in lexicon.
pub fn extract_keywords(description: &str) -> KeywordSet {
    Lexicon::builtin().keywords(description)
}
