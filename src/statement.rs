//! Statement export parser
//!
//! Bank exports separate columns with a run of two tabs. A single tab is
//! data, and an unused amount column holds exactly one tab (the sentinel).
//! Columns: timestamp, credit, debit, category, party, description, balance.

use crate::models::{Direction, DraftTransaction};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

const TAB: char = '\t';
const SENTINEL: &str = "\t";
const FIELD_COUNT: usize = 7;
const TIMESTAMP_FORMAT: &str = "%d/%m/%y %H:%M:%S";

pub const DEFAULT_CURRENCY_SYMBOL: &str = "₦";

#[derive(Error, Debug, Clone, PartialEq, Serialize)]
pub enum ParseError {
    #[error("invalid timestamp '{0}'")]
    InvalidTimestamp(String),

    #[error("invalid amount '{0}'")]
    InvalidAmount(String),

    #[error("invalid balance '{0}'")]
    InvalidBalance(String),

    #[error("negative amount '{0}'")]
    NegativeAmount(String),

    #[error("ambiguous amount: credit and debit columns are both {0}")]
    AmbiguousAmount(&'static str),

    #[error("expected 7 fields, found {0}")]
    MissingFields(usize),
}

/// A line that could not be parsed, kept for logging and reporting
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LineFailure {
    pub line_number: usize,
    pub line: String,
    pub error: ParseError,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StatementTotals {
    pub total_in: f64,
    pub total_out: f64,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedStatement {
    /// Successfully parsed lines, in file order
    pub drafts: Vec<DraftTransaction>,
    pub failures: Vec<LineFailure>,
}

impl ParsedStatement {
    pub fn totals(&self) -> StatementTotals {
        self.drafts
            .iter()
            .fold(StatementTotals::default(), |mut acc, t| {
                match t.direction {
                    Direction::Credit => acc.total_in += t.amount,
                    Direction::Debit => acc.total_out += t.amount,
                }
                acc
            })
    }
}

pub struct StatementParser {
    currency_symbol: String,
}

impl StatementParser {
    pub fn new(currency_symbol: impl Into<String>) -> Self {
        Self {
            currency_symbol: currency_symbol.into(),
        }
    }

    /// Parse a whole export. Bad lines are logged and collected, never fatal.
    pub fn parse_file(&self, text: &str) -> ParsedStatement {
        let mut parsed = ParsedStatement::default();

        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }

            match self.parse_line(line) {
                Ok(draft) => parsed.drafts.push(draft),
                Err(error) => {
                    warn!(line_number = index + 1, %error, "Failed to parse statement line");
                    parsed.failures.push(LineFailure {
                        line_number: index + 1,
                        line: line.to_string(),
                        error,
                    });
                }
            }
        }

        debug!(
            parsed = parsed.drafts.len(),
            failed = parsed.failures.len(),
            "Statement parsed"
        );

        parsed
    }

    pub fn parse_line(&self, raw: &str) -> Result<DraftTransaction, ParseError> {
        let fields = split_fields(raw);
        if fields.len() < FIELD_COUNT {
            return Err(ParseError::MissingFields(fields.len()));
        }

        let credit_slot = fields[1];
        let debit_slot = fields[2];

        let (direction, amount_slot) = match (credit_slot == SENTINEL, debit_slot == SENTINEL) {
            (false, true) => (Direction::Credit, credit_slot),
            (true, false) => (Direction::Debit, debit_slot),
            (true, true) => return Err(ParseError::AmbiguousAmount("empty")),
            (false, false) => return Err(ParseError::AmbiguousAmount("populated")),
        };

        let timestamp = trim_tabs(fields[0]);
        let date_time = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
            .map(|naive| DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc))
            .map_err(|_| ParseError::InvalidTimestamp(timestamp.to_string()))?;

        let amount_text = trim_tabs(amount_slot);
        let amount = self
            .parse_money(amount_text)
            .ok_or_else(|| ParseError::InvalidAmount(amount_text.to_string()))?;
        if amount < 0.0 {
            return Err(ParseError::NegativeAmount(amount_text.to_string()));
        }

        let balance_text = trim_tabs(fields[6]);
        let balance = self
            .parse_money(balance_text)
            .ok_or_else(|| ParseError::InvalidBalance(balance_text.to_string()))?;

        Ok(DraftTransaction {
            date_time,
            amount,
            direction,
            balance,
            party: trim_tabs(fields[4]).to_string(),
            description: trim_tabs(fields[5]).to_string(),
            statement_category: trim_tabs(fields[3]).to_string(),
        })
    }

    /// Strip the currency prefix and thousands separators, then parse.
    fn parse_money(&self, text: &str) -> Option<f64> {
        let unprefixed = text.strip_prefix(self.currency_symbol.as_str()).unwrap_or(text);
        let digits: String = unprefixed.trim().chars().filter(|c| *c != ',').collect();
        if digits.is_empty() {
            return None;
        }
        digits.parse::<f64>().ok().filter(|v| v.is_finite())
    }
}

impl Default for StatementParser {
    fn default() -> Self {
        Self::new(DEFAULT_CURRENCY_SYMBOL)
    }
}

/// Cut on every second tab. The counter survives non-tab characters and the
/// cutting tab itself is dropped, so an unused column comes out as `"\t"`.
fn split_fields(line: &str) -> Vec<&str> {
    let mut fields = Vec::with_capacity(FIELD_COUNT);
    let mut tab_run = 0;
    let mut start = 0;

    for (index, ch) in line.char_indices() {
        if ch != TAB {
            continue;
        }
        tab_run += 1;
        if tab_run == 2 {
            tab_run = 0;
            if index > start {
                fields.push(&line[start..index]);
            }
            start = index + ch.len_utf8();
        }
    }

    if line.len() > start {
        fields.push(&line[start..]);
    }

    fields
}

fn trim_tabs(field: &str) -> &str {
    field.trim_matches(TAB)
}
