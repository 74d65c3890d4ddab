//! Condition Extractor
//!
//! Pulls a numeric predicate out of the natural-language question: either a
//! range ("between 40000 and 60000") or a single comparison ("more than
//! 50000"). The predicate later replaces whatever condition the generation
//! engine produced for the salary-like column.
//!
//! Range mode takes the first two literals of the whole question, not the two
//! inside the matched phrase. "Top 5 employees between 10 and 20" therefore
//! yields `5..10`. This is the established contract and is covered by tests.
//!
//! Values keep the literal's digits exactly as written (minus currency and
//! grouping marks) so that the emitted SQL carries the number the user typed.

use lazy_static::lazy_static;
use regex::Regex;
use std::fmt;

lazy_static! {
    static ref NUMBER: Regex = Regex::new(r"[$₹€£]?\d[\d,.]*").unwrap();
    static ref RANGE: Regex = Regex::new(
        r"(?i)\b(?:between|from)\s+[$₹€£]?\d[\d,.]*(?:\s+(?:and|to)\s+|\s*-\s*)[$₹€£]?\d[\d,.]*"
    )
    .unwrap();
    static ref LESS: Regex = Regex::new(r"(?i)\b(?:less\s+than|fewer\s+than|under|below)\b").unwrap();
    static ref GREATER: Regex =
        Regex::new(r"(?i)\b(?:greater\s+than|more\s+than|above|over|exceed(?:s|ing)?)\b").unwrap();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Less,
    Greater,
    Equal,
}

impl Comparison {
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparison::Less => "<",
            Comparison::Greater => ">",
            Comparison::Equal => "=",
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NumericPredicate {
    None,
    Compare { op: Comparison, value: String },
    /// `low <= high` is not enforced; literals are used in encounter order.
    Range { low: String, high: String },
}

impl NumericPredicate {
    pub fn is_none(&self) -> bool {
        matches!(self, NumericPredicate::None)
    }

    /// Render as a condition on `column`, e.g. `Salary BETWEEN 1 AND 2`.
    pub fn render(&self, column: &str) -> Option<String> {
        match self {
            NumericPredicate::None => None,
            NumericPredicate::Compare { op, value } => Some(format!("{} {} {}", column, op, value)),
            NumericPredicate::Range { low, high } => {
                Some(format!("{} BETWEEN {} AND {}", column, low, high))
            }
        }
    }
}

/// All numeric literals in left-to-right order with currency symbols and
/// thousands separators removed. A trailing sentence period is not part of
/// the number.
///
/// Every numeric token yields exactly one literal. A token with several dots
/// (`1.2.3`) keeps its leading decimal (`1.2`).
pub fn extract_numbers(text: &str) -> Vec<String> {
    NUMBER
        .find_iter(text)
        .map(|m| decimal_prefix(m.as_str()))
        .collect()
}

fn decimal_prefix(token: &str) -> String {
    let cleaned: String = token
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let mut parts = cleaned.split('.');
    let whole = parts.next().unwrap_or_default();
    match parts.next().filter(|fraction| !fraction.is_empty()) {
        Some(fraction) => format!("{}.{}", whole, fraction),
        None => whole.to_string(),
    }
}

pub fn extract_condition(question: &str) -> NumericPredicate {
    let mut numbers = extract_numbers(question).into_iter();
    let Some(first) = numbers.next() else {
        return NumericPredicate::None;
    };

    if RANGE.is_match(question) {
        if let Some(second) = numbers.next() {
            return NumericPredicate::Range {
                low: first,
                high: second,
            };
        }
    }

    let op = if LESS.is_match(question) {
        Comparison::Less
    } else if GREATER.is_match(question) {
        Comparison::Greater
    } else {
        Comparison::Equal
    };

    NumericPredicate::Compare { op, value: first }
}
