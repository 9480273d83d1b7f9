pub mod matcher;
pub mod rules;
pub mod similarity;

pub use matcher::{MatchMethod, MatchResult, Matcher};
pub use rules::{KeywordRule, KeywordRuleEngine, MatchType as RuleMatchType, RuleError};
pub use similarity::{jaro, jaro_winkler, levenshtein, normalized_levenshtein};
