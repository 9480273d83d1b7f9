use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// The semantic role of an extracted value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Amount,
    Category,
    Account,
    Description,
    Date,
    Notes,
}

impl FieldKind {
    pub const ALL: [FieldKind; 6] = [
        FieldKind::Amount,
        FieldKind::Category,
        FieldKind::Account,
        FieldKind::Description,
        FieldKind::Date,
        FieldKind::Notes,
    ];

    /// Fields reconciled against a canonical candidate list.
    pub fn is_categorical(self) -> bool {
        matches!(self, FieldKind::Category | FieldKind::Account)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FieldKind::Amount => "amount",
            FieldKind::Category => "category",
            FieldKind::Account => "account",
            FieldKind::Description => "description",
            FieldKind::Date => "date",
            FieldKind::Notes => "notes",
        }
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldKind {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "amount" => Ok(FieldKind::Amount),
            "category" => Ok(FieldKind::Category),
            "account" => Ok(FieldKind::Account),
            "description" => Ok(FieldKind::Description),
            "date" => Ok(FieldKind::Date),
            "notes" => Ok(FieldKind::Notes),
            other => Err(ParseError::FieldKind(other.to_string())),
        }
    }
}

/// Transaction direction; selects which candidate list applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Expense,
    Income,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Expense => "expense",
            Direction::Income => "income",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Direction {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "expense" | "支出" => Ok(Direction::Expense),
            "income" | "收入" => Ok(Direction::Income),
            other => Err(ParseError::Direction(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("Unknown field kind: '{0}'")]
    FieldKind(String),
    #[error("Unknown direction: '{0}'")]
    Direction(String),
}
