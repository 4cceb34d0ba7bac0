//! Free-text bulk paste parsing
//!
//! Pure functions: text in, parsed lines and per-line failures out. Applying
//! the lines is the caller's job, so the parser is testable on its own.
//!
//! Format: one `Item Name: Quantity` per line, split at the first colon.
//! Thousands separators are accepted (`1,500`). Blank lines are ignored.

use crate::error::{LogisticsError, Result};
use serde::Serialize;

/// What a quantity of zero means for the batch being parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuantityRule {
    /// Ledger paste: zero means "owns none"
    AllowZero,
    /// Requirement paste: targets must be positive
    Positive,
}

/// One successfully parsed line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedLine {
    pub line_number: usize,
    pub item: String,
    pub quantity: i64,
}

/// One rejected line, reported back verbatim
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineFailure {
    pub line_number: usize,
    pub line: String,
    pub reason: String,
}

/// Parser output
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedBatch {
    pub lines: Vec<ParsedLine>,
    pub failures: Vec<LineFailure>,
}

/// A line that reached storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedLine {
    pub line_number: usize,
    pub item: String,
    pub quantity: i64,
}

/// Result of applying a parsed batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    pub applied: Vec<AppliedLine>,
    pub failures: Vec<LineFailure>,
}

impl BatchOutcome {
    /// Start an outcome carrying the parser's rejects
    pub fn from_parse_failures(failures: Vec<LineFailure>) -> Self {
        Self {
            applied: Vec::new(),
            failures,
        }
    }

    /// `Ok` when every line applied, `PartialBatchFailure` otherwise
    pub fn into_result(mut self) -> Result<BatchOutcome> {
        if self.failures.is_empty() {
            return Ok(self);
        }
        self.failures.sort_by_key(|f| f.line_number);
        Err(LogisticsError::PartialBatchFailure(self))
    }
}

/// Parse a pasted block into `(item, quantity)` lines and failures
pub fn parse_bulk(text: &str, rule: QuantityRule) -> ParsedBatch {
    let mut batch = ParsedBatch::default();

    for (index, raw) in text.lines().enumerate() {
        let line_number = index + 1;
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }

        match parse_line(line, rule) {
            Ok((item, quantity)) => batch.lines.push(ParsedLine {
                line_number,
                item,
                quantity,
            }),
            Err(reason) => batch.failures.push(LineFailure {
                line_number,
                line: line.to_string(),
                reason,
            }),
        }
    }

    batch
}

fn parse_line(line: &str, rule: QuantityRule) -> std::result::Result<(String, i64), String> {
    let (name, quantity) = line
        .split_once(':')
        .ok_or_else(|| "expected `Item Name: Quantity`".to_string())?;

    let name = name.trim();
    if name.is_empty() {
        return Err("missing item name".to_string());
    }

    let digits: String = quantity.trim().chars().filter(|c| *c != ',').collect();
    if digits.is_empty() {
        return Err("missing quantity".to_string());
    }

    let quantity: i64 = digits
        .parse()
        .map_err(|_| format!("'{}' is not a whole number", quantity.trim()))?;

    if quantity < 0 {
        return Err("quantity cannot be negative".to_string());
    }
    if quantity == 0 && rule == QuantityRule::Positive {
        return Err("amount must be positive".to_string());
    }

    Ok((name.to_string(), quantity))
}

/// Render `(item, quantity)` pairs in the paste format, one per line
pub fn format_export<'a>(rows: impl IntoIterator<Item = (&'a str, i64)>) -> String {
    rows.into_iter()
        .map(|(item, quantity)| format!("{}: {}\n", item, quantity))
        .collect()
}
