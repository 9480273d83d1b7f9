use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::field::FieldKind;

/// A user confirming or correcting one reconciled field. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackRecord {
    pub field_kind: FieldKind,
    pub original_value: String,
    pub corrected_value: Option<String>,
    pub was_correct: bool,
    /// Confidence the engine reported when the value was shown.
    pub original_confidence: f32,
    pub timestamp: DateTime<Utc>,
}

impl FeedbackRecord {
    pub fn new(
        field_kind: FieldKind,
        original_value: impl Into<String>,
        corrected_value: Option<String>,
        was_correct: bool,
        original_confidence: f32,
    ) -> Self {
        Self {
            field_kind,
            original_value: original_value.into(),
            corrected_value,
            was_correct,
            original_confidence: original_confidence.clamp(0.0, 1.0),
            timestamp: Utc::now(),
        }
    }
}

/// Correct/total counts for one field kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FieldAccuracy {
    pub field_kind: FieldKind,
    pub total: usize,
    pub correct: usize,
}

impl FieldAccuracy {
    pub fn rate(&self) -> f32 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f32 / self.total as f32
        }
    }
}

/// Accuracy over the records of one kind, `None` when there are none.
pub fn accuracy_of<'a, I>(records: I, kind: FieldKind) -> Option<f32>
where
    I: IntoIterator<Item = &'a FeedbackRecord>,
{
    let (total, correct) = records
        .into_iter()
        .filter(|r| r.field_kind == kind)
        .fold((0usize, 0usize), |(t, c), r| (t + 1, c + usize::from(r.was_correct)));
    (total > 0).then(|| correct as f32 / total as f32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_clamps_confidence() {
        let r = FeedbackRecord::new(FieldKind::Category, "餐饮", None, true, 1.4);
        assert_eq!(r.original_confidence, 1.0);
    }

    #[test]
    fn accuracy_ignores_other_kinds() {
        let records = vec![
            FeedbackRecord::new(FieldKind::Category, "a", None, true, 0.6),
            FeedbackRecord::new(FieldKind::Category, "b", Some("c".into()), false, 0.6),
            FeedbackRecord::new(FieldKind::Account, "d", None, false, 0.6),
        ];
        assert_eq!(accuracy_of(&records, FieldKind::Category), Some(0.5));
        assert_eq!(accuracy_of(&records, FieldKind::Account), Some(0.0));
        assert_eq!(accuracy_of(&records, FieldKind::Amount), None);
    }

    #[test]
    fn field_accuracy_rate_handles_zero_total() {
        let a = FieldAccuracy { field_kind: FieldKind::Date, total: 0, correct: 0 };
        assert_eq!(a.rate(), 0.0);
        let b = FieldAccuracy { field_kind: FieldKind::Date, total: 4, correct: 3 };
        assert_eq!(b.rate(), 0.75);
    }

    #[test]
    fn record_serializes_with_snake_case_kind() {
        let r = FeedbackRecord::new(FieldKind::Account, "微信", Some("微信支付".into()), false, 0.6);
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"field_kind\":\"account\""));
        let back: FeedbackRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }
}
