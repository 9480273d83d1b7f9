use chrono::{Local, NaiveDateTime};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tally_core::{Direction, FeedbackRecord, FieldKind, RawExtraction, ReconciledRecord};
use tally_match::{KeywordRuleEngine, MatchResult, Matcher};
use tokio::task::JoinHandle;

use crate::cache::{self, CacheStatistics, ConfidenceCache};
use crate::config::{DefaultLabels, EngineConfig};
use crate::confidence::ConfidenceModel;
use crate::dates::{DateNormalizer, DateSource};
use crate::feedback::FeedbackStore;
use crate::registry::CandidateProvider;

/// Turns a raw extraction into a reconciled record with per-field confidence.
///
/// The cache and feedback store are injected so several reconcilers (or a
/// reconciler and a warm-up task) can share them.
pub struct Reconciler {
    matcher: Matcher,
    rules: Option<KeywordRuleEngine>,
    model: ConfidenceModel,
    cache: Arc<ConfidenceCache>,
    feedback: Arc<FeedbackStore>,
    dates: DateNormalizer,
    defaults: DefaultLabels,
    review_threshold: f32,
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl Reconciler {
    /// Reconciler with a fresh cache and an in-memory feedback store.
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_services(
            config,
            Arc::new(ConfidenceCache::new(&config.cache)),
            Arc::new(FeedbackStore::new(config.feedback.capacity)),
        )
    }

    pub fn with_services(
        config: &EngineConfig,
        cache: Arc<ConfidenceCache>,
        feedback: Arc<FeedbackStore>,
    ) -> Self {
        Self {
            matcher: config.matcher.clone(),
            rules: None,
            model: ConfidenceModel::new(config.confidence.clone()),
            cache,
            feedback,
            dates: DateNormalizer::new(config.dates.clone()),
            defaults: config.defaults.clone(),
            review_threshold: config.review_threshold,
        }
    }

    /// Consults `rules` before similarity matching for categorical fields.
    pub fn with_rules(mut self, rules: KeywordRuleEngine) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn cache(&self) -> &Arc<ConfidenceCache> {
        &self.cache
    }

    pub fn feedback(&self) -> &Arc<FeedbackStore> {
        &self.feedback
    }

    pub fn reconcile(&self, extraction: &RawExtraction, provider: &impl CandidateProvider) -> ReconciledRecord {
        self.reconcile_at(extraction, provider, Local::now().naive_local())
    }

    /// Same as [`Reconciler::reconcile`] with an explicit "now" for date
    /// fallback and sentinel correction.
    pub fn reconcile_at(
        &self,
        extraction: &RawExtraction,
        provider: &impl CandidateProvider,
        now: NaiveDateTime,
    ) -> ReconciledRecord {
        let direction = extraction.direction;
        let mut confidence = BTreeMap::new();

        let mut resolved = BTreeMap::new();
        for kind in FieldKind::ALL.into_iter().filter(|k| k.is_categorical()) {
            let value = self.resolve(kind, extraction, provider);
            confidence.insert(kind, self.score(kind, &value, direction));
            resolved.insert(kind, value);
        }

        let date = self.dates.normalize(extraction.value(FieldKind::Date), now);
        let date_key = match date.source {
            DateSource::Fallback => String::new(),
            DateSource::Parsed | DateSource::Corrected => date.value.format("%Y-%m-%d").to_string(),
        };
        confidence.insert(FieldKind::Date, self.score(FieldKind::Date, &date_key, direction));

        let amount = extraction.value(FieldKind::Amount).to_string();
        let description = extraction.value(FieldKind::Description).to_string();
        let notes = extraction.value(FieldKind::Notes).to_string();
        confidence.insert(FieldKind::Amount, self.score(FieldKind::Amount, &amount, direction));
        confidence.insert(FieldKind::Description, self.score(FieldKind::Description, &description, direction));
        confidence.insert(FieldKind::Notes, self.score(FieldKind::Notes, &notes, direction));

        ReconciledRecord {
            amount,
            category: resolved.remove(&FieldKind::Category).unwrap_or_default(),
            account: resolved.remove(&FieldKind::Account).unwrap_or_default(),
            date: date.value,
            description,
            notes,
            direction,
            confidence,
        }
    }

    /// Records a user correction. Cached confidences for `kind` are dropped
    /// so the new history applies to the next reconciliation.
    pub fn record_feedback(
        &self,
        kind: FieldKind,
        original_value: impl Into<String>,
        corrected_value: Option<String>,
        was_correct: bool,
        original_confidence: f32,
    ) -> FeedbackRecord {
        let record = self
            .feedback
            .record(kind, original_value, corrected_value, was_correct, original_confidence);
        let dropped = self.cache.invalidate(kind);
        tracing::debug!(field = %kind, was_correct, dropped, "feedback recorded");
        record
    }

    /// Preloads confidences for common values in both directions on the
    /// blocking pool. The returned handle resolves to the number of entries
    /// inserted; callers may ignore it.
    pub fn spawn_warm_up(&self, common: HashMap<FieldKind, Vec<String>>) -> JoinHandle<usize> {
        let cache = Arc::clone(&self.cache);
        let feedback = Arc::clone(&self.feedback);
        let model = self.model.clone();

        tokio::task::spawn_blocking(move || {
            let mut inserted = 0;
            for direction in [Direction::Expense, Direction::Income] {
                inserted += cache.warm_up(&common, &[direction.as_str()], |kind, value| {
                    model.score(kind, value, feedback.accuracy(kind))
                });
            }
            tracing::info!(inserted, "Confidence cache warmed up");
            inserted
        })
    }

    /// Starts the periodic cache sweep; see [`cache::spawn_sweeper`].
    pub fn start_sweeper(&self) -> JoinHandle<()> {
        cache::spawn_sweeper(&self.cache)
    }

    pub fn statistics(&self) -> CacheStatistics {
        self.cache.statistics()
    }

    pub fn accuracy_rate(&self, kind: FieldKind) -> f32 {
        self.feedback.accuracy_rate(kind)
    }

    pub fn needs_review(&self, record: &ReconciledRecord) -> bool {
        record.needs_review(self.review_threshold)
    }

    pub fn fields_needing_review(&self, record: &ReconciledRecord) -> Vec<FieldKind> {
        record.fields_needing_review(self.review_threshold)
    }

    /// Matches one categorical field, with its keyword hint if any.
    pub fn match_field(
        &self,
        kind: FieldKind,
        raw: &str,
        direction: Direction,
        provider: &impl CandidateProvider,
    ) -> MatchResult {
        let candidates = provider.candidates(kind, direction);
        let hint = self
            .rules
            .as_ref()
            .and_then(|rules| rules.suggest(raw, kind, direction));
        self.matcher.find_match_with_hint(raw, &candidates, hint)
    }

    /// Label used when a categorical field matches nothing.
    pub fn default_label(&self, kind: FieldKind) -> &str {
        match kind {
            FieldKind::Category => &self.defaults.category,
            FieldKind::Account => &self.defaults.account,
            _ => "",
        }
    }

    fn resolve(&self, kind: FieldKind, extraction: &RawExtraction, provider: &impl CandidateProvider) -> String {
        let raw = extraction.value(kind);
        let default = self.default_label(kind);
        let result = self.match_field(kind, raw, extraction.direction, provider);
        if !result.is_match() && !raw.is_empty() {
            tracing::debug!(field = %kind, raw, default, "no candidate matched, using default");
        }
        result.value_or(default).to_string()
    }

    fn score(&self, kind: FieldKind, value: &str, direction: Direction) -> f32 {
        self.cache.get_or_insert_with(kind, value, &[direction.as_str()], || {
            self.model.score(kind, value, self.feedback.accuracy(kind))
        })
    }
}
