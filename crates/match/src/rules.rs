use serde::{Deserialize, Serialize};
use tally_core::{Direction, FieldKind};
use thiserror::Error;

use crate::similarity::jaro_winkler;

/// Maps a keyword found in raw text to a canonical value, e.g. "拿铁" → "餐饮美食".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeywordRule {
    pub keyword: String,
    pub canonical: String,
    #[serde(default = "default_field")]
    pub field: FieldKind,
    /// Restricts the rule to one direction; `None` applies to both.
    #[serde(default)]
    pub direction: Option<Direction>,
    #[serde(default)]
    pub match_type: MatchType,
    #[serde(default)]
    pub priority: i32,
}

fn default_field() -> FieldKind {
    FieldKind::Category
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    #[default]
    Contains,
    Exact,
    Regex,
    Fuzzy {
        threshold: f32,
    },
}

impl std::str::FromStr for MatchType {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "contains" => Ok(MatchType::Contains),
            "exact" => Ok(MatchType::Exact),
            "regex" => Ok(MatchType::Regex),
            s if s.starts_with("fuzzy:") => {
                let threshold = s[6..]
                    .parse::<f32>()
                    .map_err(|_| RuleError::InvalidMatchType(s.to_string()))?;
                Ok(MatchType::Fuzzy { threshold })
            }
            other => Err(RuleError::InvalidMatchType(other.to_string())),
        }
    }
}

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Failed to parse rules TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid regex '{pattern}': {source}")]
    InvalidRegex {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("Unknown match type: '{0}'")]
    InvalidMatchType(String),
}

#[derive(Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<KeywordRule>,
}

/// Internal pairing of a rule with its precompiled regex (if applicable).
struct CompiledRule {
    rule: KeywordRule,
    keyword_lower: String,
    compiled_regex: Option<regex::Regex>,
}

/// Ordered keyword rules consulted before similarity matching.
///
/// Rules are tried highest priority first; among equal priorities the
/// declaration order is kept.
#[derive(Default)]
pub struct KeywordRuleEngine {
    rules: Vec<CompiledRule>,
}

impl KeywordRuleEngine {
    pub fn new(rules: Vec<KeywordRule>) -> Result<Self, RuleError> {
        let mut compiled = rules
            .into_iter()
            .map(|rule| {
                let compiled_regex = match &rule.match_type {
                    MatchType::Regex => Some(regex::Regex::new(&rule.keyword).map_err(|source| {
                        RuleError::InvalidRegex { pattern: rule.keyword.clone(), source }
                    })?),
                    _ => None,
                };
                Ok(CompiledRule {
                    keyword_lower: rule.keyword.to_lowercase(),
                    rule,
                    compiled_regex,
                })
            })
            .collect::<Result<Vec<_>, RuleError>>()?;
        // Stable sort: highest priority first.
        compiled.sort_by(|a, b| b.rule.priority.cmp(&a.rule.priority));
        Ok(Self { rules: compiled })
    }

    /// Parses a file of `[[rules]]` tables.
    pub fn from_toml(toml_content: &str) -> Result<Self, RuleError> {
        let file: RuleFile = toml::from_str(toml_content)?;
        Self::new(file.rules)
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn find_rule(&self, raw: &str, field: FieldKind, direction: Direction) -> Option<&KeywordRule> {
        if raw.is_empty() {
            return None;
        }
        let text = raw.to_lowercase();
        self.rules
            .iter()
            .filter(|cr| cr.rule.field == field)
            .filter(|cr| cr.rule.direction.map_or(true, |d| d == direction))
            .find(|cr| Self::rule_matches(cr, raw, &text))
            .map(|cr| &cr.rule)
    }

    /// Canonical value suggested for `raw`, if any rule fires.
    pub fn suggest(&self, raw: &str, field: FieldKind, direction: Direction) -> Option<&str> {
        let rule = self.find_rule(raw, field, direction)?;
        tracing::debug!(raw, keyword = %rule.keyword, canonical = %rule.canonical, "keyword rule hit");
        Some(rule.canonical.as_str())
    }

    fn rule_matches(cr: &CompiledRule, raw: &str, text: &str) -> bool {
        match &cr.rule.match_type {
            MatchType::Contains => text.contains(&cr.keyword_lower),
            MatchType::Exact => text == cr.keyword_lower,
            MatchType::Regex => cr.compiled_regex.as_ref().is_some_and(|re| re.is_match(raw)),
            MatchType::Fuzzy { threshold } => jaro_winkler(text, &cr.keyword_lower) >= *threshold,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn rule(keyword: &str, canonical: &str, match_type: MatchType, priority: i32) -> KeywordRule {
        KeywordRule {
            keyword: keyword.to_string(),
            canonical: canonical.to_string(),
            field: FieldKind::Category,
            direction: None,
            match_type,
            priority,
        }
    }

    fn engine(rules: Vec<KeywordRule>) -> KeywordRuleEngine {
        KeywordRuleEngine::new(rules).unwrap()
    }

    #[test]
    fn contains_match_case_insensitive() {
        let e = engine(vec![rule("starbucks", "餐饮美食", MatchType::Contains, 1)]);
        assert_eq!(
            e.suggest("STARBUCKS 星巴克", FieldKind::Category, Direction::Expense),
            Some("餐饮美食")
        );
        assert_eq!(e.suggest("滴滴出行", FieldKind::Category, Direction::Expense), None);
    }

    #[test]
    fn exact_match() {
        let e = engine(vec![rule("拿铁", "餐饮美食", MatchType::Exact, 1)]);
        assert!(e.find_rule("拿铁", FieldKind::Category, Direction::Expense).is_some());
        assert!(e.find_rule("冰拿铁", FieldKind::Category, Direction::Expense).is_none());
    }

    #[test]
    fn regex_match() {
        let e = engine(vec![rule(r"^(滴滴|DiDi)|打车", "交通出行", MatchType::Regex, 1)]);
        assert!(e.find_rule("滴滴快车", FieldKind::Category, Direction::Expense).is_some());
        assert!(e.find_rule("机场打车", FieldKind::Category, Direction::Expense).is_some());
        assert!(e.find_rule("地铁", FieldKind::Category, Direction::Expense).is_none());
    }

    #[test]
    fn invalid_regex_is_rejected() {
        let err = KeywordRuleEngine::new(vec![rule("(", "x", MatchType::Regex, 1)]).err().unwrap();
        assert!(matches!(err, RuleError::InvalidRegex { .. }));
    }

    #[test]
    fn fuzzy_match_similar_strings() {
        let e = engine(vec![rule("starbucks", "餐饮美食", MatchType::Fuzzy { threshold: 0.9 }, 1)]);
        assert!(e.find_rule("starbuck", FieldKind::Category, Direction::Expense).is_some());
        assert!(e.find_rule("walmart", FieldKind::Category, Direction::Expense).is_none());
    }

    #[test]
    fn priority_ordering_highest_wins() {
        let e = engine(vec![
            rule("咖啡", "餐饮美食", MatchType::Contains, 1),
            rule("咖啡", "咖啡饮品", MatchType::Contains, 10),
        ]);
        assert_eq!(
            e.suggest("瑞幸咖啡", FieldKind::Category, Direction::Expense),
            Some("咖啡饮品")
        );
    }

    #[test]
    fn rules_are_scoped_by_field_and_direction() {
        let mut salary = rule("工资", "工资收入", MatchType::Contains, 1);
        salary.direction = Some(Direction::Income);
        let mut card = rule("招行", "招商银行", MatchType::Contains, 1);
        card.field = FieldKind::Account;
        let e = engine(vec![salary, card]);

        assert!(e.find_rule("三月工资", FieldKind::Category, Direction::Income).is_some());
        assert!(e.find_rule("三月工资", FieldKind::Category, Direction::Expense).is_none());
        assert!(e.find_rule("招行信用卡", FieldKind::Account, Direction::Expense).is_some());
        assert!(e.find_rule("招行信用卡", FieldKind::Category, Direction::Expense).is_none());
    }

    #[test]
    fn from_toml_parses_rule_tables() {
        let e = KeywordRuleEngine::from_toml(
            r#"
            [[rules]]
            keyword = "拿铁"
            canonical = "餐饮美食"

            [[rules]]
            keyword = "工资"
            canonical = "工资收入"
            direction = "income"
            match_type = "exact"
            priority = 5

            [[rules]]
            keyword = "招行"
            canonical = "招商银行"
            field = "account"
            match_type = { fuzzy = { threshold = 0.8 } }
            "#,
        )
        .unwrap();
        assert_eq!(e.len(), 3);
        assert_eq!(e.suggest("冰拿铁", FieldKind::Category, Direction::Expense), Some("餐饮美食"));
        assert_eq!(e.suggest("工资", FieldKind::Category, Direction::Income), Some("工资收入"));
    }

    #[test]
    fn from_toml_reports_parse_errors() {
        assert!(matches!(KeywordRuleEngine::from_toml("rules = 3"), Err(RuleError::Toml(_))));
    }

    #[test]
    fn match_type_from_str() {
        assert_eq!(MatchType::from_str("Contains").unwrap(), MatchType::Contains);
        assert_eq!(MatchType::from_str("fuzzy:0.75").unwrap(), MatchType::Fuzzy { threshold: 0.75 });
        assert!(MatchType::from_str("fuzzy:abc").is_err());
        assert!(MatchType::from_str("soundex").is_err());
    }

    #[test]
    fn empty_raw_never_fires() {
        let e = engine(vec![rule("", "餐饮美食", MatchType::Contains, 1)]);
        assert_eq!(e.suggest("", FieldKind::Category, Direction::Expense), None);
    }
}
