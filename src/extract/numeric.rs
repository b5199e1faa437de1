//! Numeric value parsing with unit markers and magnitude suffixes.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use thiserror::Error;

use crate::models::ValueKind;

/// A number with optional currency prefix and magnitude suffix.
static NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?P<cur>A\$|AUD\s*|\$)?\s*(?P<num>\d{1,3}(?:,\d{3})+(?:\.\d+)?|\d+(?:\.\d+)?)(?:\s*(?P<suffix>billion|bn|million|mil|thousand|[kmb])\b)?",
    )
    .unwrap()
});

/// A table cell that is nothing but an amount, optionally in parentheses.
static CELL_AMOUNT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\(?\s*(?:A\$|AUD\s*|\$)?\s*(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?(?:\s*(?:billion|bn|million|mil|thousand|[kmb]))?\s*\)?$",
    )
    .unwrap()
});

static PERCENT_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)%|\bper\s*cent\b|\bpercent\b").unwrap());

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("no numeric value")]
    NoNumber,
    #[error("ambiguous value: {0}")]
    Ambiguous(&'static str),
    #[error("invalid value: {0}")]
    Invalid(String),
}

/// Multiplier for a magnitude suffix.
fn multiplier(suffix: &str) -> f64 {
    match suffix.to_ascii_lowercase().as_str() {
        "k" | "thousand" => 1_000.0,
        "m" | "mil" | "million" => 1_000_000.0,
        "b" | "bn" | "billion" => 1_000_000_000.0,
        _ => 1.0,
    }
}

/// One number found in text.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Token {
    value: f64,
    currency: bool,
    suffixed: bool,
}

fn token(caps: &Captures<'_>) -> Result<Token, ParseError> {
    let digits = caps["num"].replace(',', "");
    let base: f64 = digits
        .parse()
        .map_err(|_| ParseError::Invalid(caps["num"].to_string()))?;
    let suffix = caps.name("suffix").map(|m| m.as_str());
    Ok(Token {
        value: base * suffix.map(multiplier).unwrap_or(1.0),
        currency: caps.name("cur").is_some(),
        suffixed: suffix.is_some(),
    })
}

/// Parse the first number in `raw` according to `kind`.
///
/// Units are never guessed: a percentage needs a percent marker and a
/// currency amount needs `$`/`AUD` or a magnitude suffix.
pub fn parse_value(raw: &str, kind: ValueKind) -> Result<f64, ParseError> {
    if kind == ValueKind::Text {
        return Err(ParseError::Invalid("text value is not numeric".to_string()));
    }

    let caps = NUMBER.captures(raw).ok_or(ParseError::NoNumber)?;
    let tok = token(&caps)?;

    match kind {
        ValueKind::Percentage => {
            if !PERCENT_MARKER.is_match(raw) {
                return Err(ParseError::Ambiguous("percentage without a percent marker"));
            }
            if tok.value > 100.0 {
                return Err(ParseError::Invalid(format!("{} exceeds 100%", tok.value)));
            }
        }
        ValueKind::Currency => {
            if !tok.currency && !tok.suffixed {
                return Err(ParseError::Ambiguous("amount without currency or magnitude"));
            }
        }
        ValueKind::Count => {
            if tok.value.fract() != 0.0 {
                return Err(ParseError::Ambiguous("count is not a whole number"));
            }
        }
        ValueKind::Decimal
        | ValueKind::Rate
        | ValueKind::Factor
        | ValueKind::Days
        | ValueKind::Text => {}
    }

    Ok(tok.value)
}

/// Trimmed free text. Empty text is treated as no value.
pub fn parse_text(raw: &str) -> Result<String, ParseError> {
    let text = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if text.is_empty() {
        Err(ParseError::NoNumber)
    } else {
        Ok(text)
    }
}

/// Every unambiguous currency amount in free text.
pub fn currency_amounts(text: &str) -> Vec<f64> {
    NUMBER
        .captures_iter(text)
        .filter_map(|caps| token(&caps).ok())
        .filter(|t| t.currency || t.suffixed)
        .map(|t| t.value)
        .collect()
}

/// Parse a table cell holding only an amount. `scale` comes from a
/// column header such as `$'000` or `$m` and applies to bare numbers.
pub fn cell_amount(cell: &str, scale: Option<f64>) -> Option<f64> {
    let cell = cell.trim();
    if !CELL_AMOUNT.is_match(cell) {
        return None;
    }
    let caps = NUMBER.captures(cell)?;
    let tok = token(&caps).ok()?;
    if tok.suffixed {
        Some(tok.value)
    } else if let Some(scale) = scale {
        Some(tok.value * scale)
    } else if tok.currency {
        Some(tok.value)
    } else {
        None
    }
}

/// Scale implied by a column header, e.g. `$'000` or `($m)`.
pub fn header_scale(header: &str) -> Option<f64> {
    let h = header.to_ascii_lowercase().replace(['\u{2019}', '\u{2018}'], "'");
    if h.contains("'000") || h.contains("000s") || h.contains("thousand") {
        Some(1_000.0)
    } else if h.contains("$m") || h.contains("million") || h.contains("(m)") {
        Some(1_000_000.0)
    } else if h.contains("$b") || h.contains("billion") {
        Some(1_000_000_000.0)
    } else if h.contains('$') {
        Some(1.0)
    } else {
        None
    }
}
