use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tally_core::{Direction, FieldKind};

use crate::config::ConfigError;

/// Supplies the canonical candidates for a field in a given direction.
pub trait CandidateProvider {
    fn candidates(&self, kind: FieldKind, direction: Direction) -> Vec<String>;
}

impl<F> CandidateProvider for F
where
    F: Fn(FieldKind, Direction) -> Vec<String>,
{
    fn candidates(&self, kind: FieldKind, direction: Direction) -> Vec<String> {
        self(kind, direction)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionalList {
    pub expense: Vec<String>,
    pub income: Vec<String>,
}

impl DirectionalList {
    pub fn get(&self, direction: Direction) -> &[String] {
        match direction {
            Direction::Expense => &self.expense,
            Direction::Income => &self.income,
        }
    }
}

/// Static category/account lists, typically loaded from a TOML file:
///
/// ```toml
/// [category]
/// expense = ["餐饮美食", "交通出行"]
/// income = ["工资收入"]
///
/// [account]
/// expense = ["支付宝", "微信"]
/// income = ["招商银行"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CandidateRegistry {
    pub category: DirectionalList,
    pub account: DirectionalList,
}

impl CandidateRegistry {
    pub fn from_toml(toml_content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(toml_content)?)
    }

    pub fn load(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Every listed value for `kind`, first occurrence order, no repeats.
    pub fn all_values(&self, kind: FieldKind) -> Vec<String> {
        let list = match kind {
            FieldKind::Category => &self.category,
            FieldKind::Account => &self.account,
            _ => return Vec::new(),
        };
        let mut seen = HashSet::new();
        list.expense
            .iter()
            .chain(&list.income)
            .filter(|v| seen.insert(v.as_str()))
            .cloned()
            .collect()
    }

    /// Input for [`crate::Reconciler::spawn_warm_up`]: every categorical value.
    pub fn common_values(&self) -> HashMap<FieldKind, Vec<String>> {
        FieldKind::ALL
            .into_iter()
            .filter(|k| k.is_categorical())
            .map(|k| (k, self.all_values(k)))
            .collect()
    }
}

impl CandidateProvider for CandidateRegistry {
    fn candidates(&self, kind: FieldKind, direction: Direction) -> Vec<String> {
        match kind {
            FieldKind::Category => self.category.get(direction).to_vec(),
            FieldKind::Account => self.account.get(direction).to_vec(),
            _ => Vec::new(),
        }
    }
}
