use serde::{Deserialize, Serialize};
use std::path::Path;
use tally_match::{KeywordRuleEngine, Matcher, RuleError};
use thiserror::Error;

use crate::cache::CacheConfig;
use crate::confidence::ConfidenceConfig;
use crate::dates::DateConfig;
use crate::feedback::DEFAULT_FEEDBACK_CAPACITY;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Keyword rules: {0}")]
    Rules(#[from] RuleError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    pub capacity: usize,
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self { capacity: DEFAULT_FEEDBACK_CAPACITY }
    }
}

/// Labels used when a categorical field matches nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DefaultLabels {
    pub category: String,
    pub account: String,
}

impl Default for DefaultLabels {
    fn default() -> Self {
        Self {
            category: "未分类".to_string(),
            account: "未知".to_string(),
        }
    }
}

/// Everything tunable about reconciliation. Every section and key is optional.
///
/// ```toml
/// review_threshold = 0.7
///
/// [matcher]
/// jaro_winkler_threshold = 0.6
///
/// [cache]
/// ttl_secs = 3600
/// max_entries = 1000
///
/// [dates]
/// sentinel_years = [1970, 2001]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub matcher: Matcher,
    pub confidence: ConfidenceConfig,
    pub cache: CacheConfig,
    pub feedback: FeedbackConfig,
    pub dates: DateConfig,
    pub defaults: DefaultLabels,
    /// Fields scoring below this are flagged for review.
    pub review_threshold: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            matcher: Matcher::default(),
            confidence: ConfidenceConfig::default(),
            cache: CacheConfig::default(),
            feedback: FeedbackConfig::default(),
            dates: DateConfig::default(),
            defaults: DefaultLabels::default(),
            review_threshold: 0.7,
        }
    }
}

impl EngineConfig {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let c = &self.confidence;
        if !(0.0..=1.0).contains(&c.floor) || !(0.0..=1.0).contains(&c.ceiling) || c.floor > c.ceiling {
            return Err(ConfigError::Invalid(format!(
                "confidence bounds must satisfy 0 <= floor <= ceiling <= 1 (got {} and {})",
                c.floor, c.ceiling
            )));
        }
        if let Some((kind, base)) = c.base.iter().find(|(_, b)| !(0.0..=1.0).contains(*b)) {
            return Err(ConfigError::Invalid(format!("base confidence for {kind} out of range: {base}")));
        }
        if !(0.0..=1.0).contains(&self.matcher.jaro_winkler_threshold) {
            return Err(ConfigError::Invalid(format!(
                "jaro_winkler_threshold out of range: {}",
                self.matcher.jaro_winkler_threshold
            )));
        }
        if self.matcher.levenshtein_divisor == 0 {
            return Err(ConfigError::Invalid("levenshtein_divisor must be positive".into()));
        }
        if self.cache.max_entries == 0 || self.feedback.capacity == 0 {
            return Err(ConfigError::Invalid("cache and feedback sizes must be positive".into()));
        }
        if self.cache.sweep_interval_secs == 0 {
            return Err(ConfigError::Invalid("sweep_interval_secs must be positive".into()));
        }
        Ok(())
    }
}

/// Loads a `[[rules]]` keyword rule file.
pub fn load_rules(path: &Path) -> Result<KeywordRuleEngine, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(KeywordRuleEngine::from_toml(&content)?)
}
