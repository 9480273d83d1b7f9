use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tally_core::{accuracy_of, FeedbackRecord, FieldKind};

/// Confidence for a field with no feedback history.
pub fn default_base(kind: FieldKind) -> f32 {
    match kind {
        FieldKind::Amount => 0.9,
        FieldKind::Category => 0.6,
        FieldKind::Account => 0.6,
        FieldKind::Description => 0.5,
        FieldKind::Date => 0.9,
        FieldKind::Notes => 0.3,
    }
}

/// Values the extraction side emits when it could not read a field.
pub fn default_placeholders(kind: FieldKind) -> &'static [&'static str] {
    match kind {
        FieldKind::Category => &["未分类", "其他"],
        FieldKind::Account => &["未知", "默认账户"],
        FieldKind::Description => &["未识别"],
        FieldKind::Notes => &["无"],
        FieldKind::Amount | FieldKind::Date => &[],
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfidenceConfig {
    /// Per-kind overrides of [`default_base`].
    pub base: BTreeMap<FieldKind, f32>,
    /// Per-kind overrides of [`default_placeholders`].
    pub placeholders: BTreeMap<FieldKind, Vec<String>>,
    pub floor: f32,
    pub ceiling: f32,
}

impl Default for ConfidenceConfig {
    fn default() -> Self {
        Self {
            base: BTreeMap::new(),
            placeholders: BTreeMap::new(),
            floor: 0.1,
            ceiling: 0.95,
        }
    }
}

/// Scores how far a reconciled value can be trusted.
///
/// `base * (0.5 + accuracy * 0.5)`: history moves a field between half and
/// all of its base confidence, never above it. Empty or placeholder values
/// are halved, and the result is clamped to `[floor, ceiling]`.
#[derive(Debug, Clone, Default)]
pub struct ConfidenceModel {
    config: ConfidenceConfig,
}

impl ConfidenceModel {
    pub fn new(config: ConfidenceConfig) -> Self {
        Self { config }
    }

    pub fn base(&self, kind: FieldKind) -> f32 {
        self.config
            .base
            .get(&kind)
            .copied()
            .unwrap_or_else(|| default_base(kind))
    }

    pub fn is_placeholder(&self, kind: FieldKind, value: &str) -> bool {
        match self.config.placeholders.get(&kind) {
            Some(custom) => custom.iter().any(|p| p == value),
            None => default_placeholders(kind).iter().any(|p| *p == value),
        }
    }

    /// Confidence from the full feedback history.
    pub fn confidence(&self, kind: FieldKind, value: &str, history: &[FeedbackRecord]) -> f32 {
        self.score(kind, value, accuracy_of(history, kind))
    }

    /// Confidence from a precomputed accuracy rate (`None` = no history).
    pub fn score(&self, kind: FieldKind, value: &str, accuracy: Option<f32>) -> f32 {
        let base = self.base(kind);
        let mut confidence = match accuracy {
            None => base,
            Some(rate) => base * (0.5 + rate.clamp(0.0, 1.0) * 0.5),
        };

        let value = value.trim();
        if value.is_empty() || self.is_placeholder(kind, value) {
            confidence *= 0.5;
        }

        confidence.clamp(self.config.floor, self.config.ceiling)
    }
}
