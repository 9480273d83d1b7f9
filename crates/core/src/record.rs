use chrono::NaiveDateTime;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::field::{Direction, FieldKind};

/// Raw field values as produced by OCR, speech transcription or an AI call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RawExtraction {
    pub amount: Option<String>,
    pub category: Option<String>,
    pub account: Option<String>,
    pub description: Option<String>,
    pub date: Option<String>,
    pub notes: Option<String>,
    pub direction: Direction,
}

impl RawExtraction {
    /// Trimmed raw value for a field; absent values read as "".
    pub fn value(&self, kind: FieldKind) -> &str {
        let v = match kind {
            FieldKind::Amount => &self.amount,
            FieldKind::Category => &self.category,
            FieldKind::Account => &self.account,
            FieldKind::Description => &self.description,
            FieldKind::Date => &self.date,
            FieldKind::Notes => &self.notes,
        };
        v.as_deref().map(str::trim).unwrap_or("")
    }
}

/// A finished record: canonical values plus a confidence per field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReconciledRecord {
    /// Passed through unmodified; see [`ReconciledRecord::amount_value`].
    pub amount: String,
    pub category: String,
    pub account: String,
    pub date: NaiveDateTime,
    pub description: String,
    pub notes: String,
    pub direction: Direction,
    pub confidence: BTreeMap<FieldKind, f32>,
}

impl ReconciledRecord {
    pub fn confidence_of(&self, kind: FieldKind) -> f32 {
        self.confidence.get(&kind).copied().unwrap_or(0.0)
    }

    /// Fields whose confidence falls below `threshold`, in field order.
    pub fn fields_needing_review(&self, threshold: f32) -> Vec<FieldKind> {
        self.confidence
            .iter()
            .filter(|(_, c)| **c < threshold)
            .map(|(k, _)| *k)
            .collect()
    }

    pub fn needs_review(&self, threshold: f32) -> bool {
        self.confidence.values().any(|c| *c < threshold)
    }

    /// Parses the amount, tolerating currency marks and thousands separators.
    pub fn amount_value(&self) -> Option<Decimal> {
        parse_amount(&self.amount)
    }
}

pub fn parse_amount(s: &str) -> Option<Decimal> {
    let clean: String = s
        .trim()
        .trim_start_matches(['¥', '￥', '$'])
        .trim_end_matches('元')
        .chars()
        .filter(|c| *c != ',' && !c.is_whitespace())
        .collect();
    if clean.is_empty() {
        return None;
    }
    Decimal::from_str(&clean).ok().map(|d| d.round_dp(2))
}
