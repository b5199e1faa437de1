//! Extracted facts and extraction results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::target::{FactType, Unit};

/// A fact's value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactValue {
    Number(f64),
    Text(String),
}

impl FactValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FactValue::Number(n) => Some(*n),
            FactValue::Text(_) => None,
        }
    }
}

impl std::fmt::Display for FactValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FactValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            FactValue::Number(n) => write!(f, "{}", n),
            FactValue::Text(s) => f.write_str(s),
        }
    }
}

/// Outcome of looking for one value in a document.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction<T> {
    Found(T),
    /// The pattern did not match. Not an error.
    NotPresent,
    /// The pattern matched but the value could not be parsed; carries the raw text.
    Malformed(String),
}

impl<T> Extraction<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, Extraction::Found(_))
    }

    pub fn found(self) -> Option<T> {
        match self {
            Extraction::Found(v) => Some(v),
            _ => None,
        }
    }
}

/// A normalized value pulled out of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedFact {
    pub fact_type: FactType,
    pub value: FactValue,
    pub unit: Unit,
    /// Qualifier distinguishing several facts of one type (e.g. a program name).
    pub subject: Option<String>,
    /// Coarse grouping such as "detention" or "community".
    pub category: Option<String>,
    pub target_id: String,
    pub extracted_at: DateTime<Utc>,
    /// The text the value was parsed from.
    pub raw: String,
}

impl ExtractedFact {
    pub fn new(target_id: &str, fact_type: FactType, value: FactValue, unit: Unit) -> Self {
        Self {
            fact_type,
            value,
            unit,
            subject: None,
            category: None,
            target_id: target_id.to_string(),
            extracted_at: Utc::now(),
            raw: String::new(),
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_raw(mut self, raw: impl Into<String>) -> Self {
        self.raw = raw.into();
        self
    }
}

/// A pattern that matched text which could not be parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionWarning {
    pub fact_type: FactType,
    pub raw: String,
    pub reason: String,
}

/// Everything extraction produced for one document.
#[derive(Debug, Clone, Default)]
pub struct ExtractionOutcome {
    pub facts: Vec<ExtractedFact>,
    pub warnings: Vec<ExtractionWarning>,
    /// Fact types the schema asked for that were not in the document.
    pub missing: Vec<FactType>,
}

impl ExtractionOutcome {
    pub fn fact(&self, fact_type: FactType) -> Option<&ExtractedFact> {
        self.facts.iter().find(|f| f.fact_type == fact_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_display() {
        assert_eq!(FactValue::Number(1570.0).to_string(), "1570");
        assert_eq!(FactValue::Number(21.4).to_string(), "21.4");
        assert_eq!(FactValue::Text("2023-24".into()).to_string(), "2023-24");
    }

    #[test]
    fn test_extraction_helpers() {
        assert!(Extraction::Found(1).is_found());
        assert_eq!(Extraction::<i32>::NotPresent.found(), None);
        assert_eq!(Extraction::<i32>::Malformed("x".into()).found(), None);
    }
}
