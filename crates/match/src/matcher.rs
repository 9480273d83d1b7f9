use serde::{Deserialize, Serialize};

use crate::similarity::{jaro_winkler, levenshtein};

/// Which stage of the matcher produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    Exact,
    Keyword,
    JaroWinkler,
    Levenshtein,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    /// The canonical candidate, or `None` when nothing cleared a threshold.
    pub matched_value: Option<String>,
    pub matched_exactly: bool,
    /// Similarity of the accepted candidate in [0.0, 1.0].
    pub score: f32,
    pub method: MatchMethod,
}

impl MatchResult {
    pub fn no_match() -> Self {
        Self {
            matched_value: None,
            matched_exactly: false,
            score: 0.0,
            method: MatchMethod::None,
        }
    }

    fn hit(value: &str, score: f32, method: MatchMethod) -> Self {
        Self {
            matched_value: Some(value.to_string()),
            matched_exactly: method == MatchMethod::Exact,
            score,
            method,
        }
    }

    pub fn is_match(&self) -> bool {
        self.matched_value.is_some()
    }

    /// The matched value, or `default` when there was no match.
    pub fn value_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.matched_value.as_deref().unwrap_or(default)
    }
}

/// Maps a raw extracted string onto the closest entry of a candidate list.
///
/// Stages, first hit wins: verbatim membership, Jaro-Winkler at or above
/// `jaro_winkler_threshold`, then the Levenshtein-nearest candidate when its
/// distance is within `len(raw) / levenshtein_divisor + levenshtein_slack`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Matcher {
    pub jaro_winkler_threshold: f32,
    pub levenshtein_divisor: usize,
    pub levenshtein_slack: usize,
}

impl Default for Matcher {
    fn default() -> Self {
        Self {
            jaro_winkler_threshold: 0.6,
            levenshtein_divisor: 2,
            levenshtein_slack: 2,
        }
    }
}

impl Matcher {
    pub fn new(jaro_winkler_threshold: f32, levenshtein_divisor: usize, levenshtein_slack: usize) -> Self {
        Self {
            jaro_winkler_threshold,
            levenshtein_divisor: levenshtein_divisor.max(1),
            levenshtein_slack,
        }
    }

    pub fn find_match<S: AsRef<str>>(&self, raw: &str, candidates: &[S]) -> MatchResult {
        self.find_match_with_hint(raw, candidates, None)
    }

    /// Like [`Matcher::find_match`], with a keyword-rule suggestion that takes
    /// precedence over similarity ranking when it names a listed candidate.
    pub fn find_match_with_hint<S: AsRef<str>>(
        &self,
        raw: &str,
        candidates: &[S],
        hint: Option<&str>,
    ) -> MatchResult {
        if raw.is_empty() || candidates.is_empty() {
            return MatchResult::no_match();
        }

        if let Some(exact) = candidates.iter().find(|c| c.as_ref() == raw) {
            return MatchResult::hit(exact.as_ref(), 1.0, MatchMethod::Exact);
        }

        if let Some(hinted) = hint.and_then(|h| candidates.iter().find(|c| c.as_ref() == h)) {
            return MatchResult::hit(hinted.as_ref(), 1.0, MatchMethod::Keyword);
        }

        if let Some((candidate, score)) = self.best_jaro_winkler(raw, candidates) {
            if score >= self.jaro_winkler_threshold {
                tracing::debug!(raw, candidate, score, "jaro-winkler match");
                return MatchResult::hit(candidate, score, MatchMethod::JaroWinkler);
            }
        }

        match self.nearest_levenshtein(raw, candidates) {
            Some((candidate, distance)) if distance <= self.tolerance(raw) => {
                let longest = raw.chars().count().max(candidate.chars().count());
                let score = 1.0 - distance as f32 / longest as f32;
                tracing::debug!(raw, candidate, distance, "levenshtein fallback match");
                MatchResult::hit(candidate, score, MatchMethod::Levenshtein)
            }
            _ => MatchResult::no_match(),
        }
    }

    /// Maximum accepted edit distance for `raw`; grows with its length.
    pub fn tolerance(&self, raw: &str) -> usize {
        raw.chars().count() / self.levenshtein_divisor.max(1) + self.levenshtein_slack
    }

    // Ties keep the earliest candidate so list order acts as a preference.
    fn best_jaro_winkler<'a, S: AsRef<str>>(&self, raw: &str, candidates: &'a [S]) -> Option<(&'a str, f32)> {
        candidates
            .iter()
            .map(|c| (c.as_ref(), jaro_winkler(raw, c.as_ref())))
            .fold(None, |best, (c, s)| match best {
                Some((_, bs)) if bs >= s => best,
                _ => Some((c, s)),
            })
    }

    fn nearest_levenshtein<'a, S: AsRef<str>>(&self, raw: &str, candidates: &'a [S]) -> Option<(&'a str, usize)> {
        candidates
            .iter()
            .map(|c| (c.as_ref(), levenshtein(raw, c.as_ref())))
            .fold(None, |best, (c, d)| match best {
                Some((_, bd)) if bd <= d => best,
                _ => Some((c, d)),
            })
    }
}
