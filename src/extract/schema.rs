//! Extraction schemas: scalar rules and tabular rules.

use regex::Regex;
use scraper::Selector;
use thiserror::Error;

use super::classify::YOUTH_JUSTICE_KEYWORDS;
use crate::models::{FactType, Unit, ValueKind};

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid pattern for {fact}: {source}")]
    InvalidPattern {
        fact: FactType,
        #[source]
        source: regex::Error,
    },
    #[error("invalid selector '{selector}': {message}")]
    InvalidSelector { selector: String, message: String },
    #[error("rule for {0} needs a pattern, selector or json_path")]
    EmptyRule(FactType),
    #[error("table rule for {0} needs at least one keyword")]
    NoKeywords(FactType),
}

pub(crate) fn parse_selector(css: &str) -> Result<Selector, SchemaError> {
    Selector::parse(css).map_err(|e| SchemaError::InvalidSelector {
        selector: css.to_string(),
        message: format!("{:?}", e),
    })
}

/// One way of finding a single value.
#[derive(Debug, Clone)]
pub struct ScalarRule {
    pub fact: FactType,
    pub kind: ValueKind,
    /// Capture group 1 (or the whole match) is the value text.
    pub pattern: Option<Regex>,
    /// Narrows HTML to the matching elements before `pattern` runs.
    pub selector: Option<Selector>,
    /// Dot-separated path into a JSON document, e.g. `data.0.rate`.
    pub json_path: Option<String>,
    pub unit: Unit,
    pub subject: Option<String>,
}

impl ScalarRule {
    /// A rule with the fact's default kind and unit and no matchers yet.
    pub fn new(fact: FactType) -> Self {
        Self {
            fact,
            kind: fact.default_kind(),
            pattern: None,
            selector: None,
            json_path: None,
            unit: fact.default_unit(),
            subject: None,
        }
    }

    /// Shorthand for a regex rule using the fact's defaults.
    pub fn pattern(fact: FactType, pattern: &str) -> Result<Self, SchemaError> {
        Self::new(fact).with_pattern(pattern)
    }

    pub fn with_pattern(mut self, pattern: &str) -> Result<Self, SchemaError> {
        let re = Regex::new(pattern).map_err(|source| SchemaError::InvalidPattern {
            fact: self.fact,
            source,
        })?;
        self.pattern = Some(re);
        Ok(self)
    }

    pub fn with_selector(mut self, css: &str) -> Result<Self, SchemaError> {
        self.selector = Some(parse_selector(css)?);
        Ok(self)
    }

    pub fn with_json_path(mut self, path: &str) -> Self {
        self.json_path = Some(path.to_string());
        self
    }

    pub fn with_kind(mut self, kind: ValueKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = unit;
        self
    }

    pub fn with_subject(mut self, subject: &str) -> Self {
        self.subject = Some(subject.to_string());
        self
    }

    pub fn validate(&self) -> Result<(), SchemaError> {
        if self.pattern.is_none() && self.selector.is_none() && self.json_path.is_none() {
            return Err(SchemaError::EmptyRule(self.fact));
        }
        Ok(())
    }
}

/// Keyword-filtered budget lines from tables (HTML) or sentences (text, PDF).
#[derive(Debug, Clone)]
pub struct TableRule {
    pub fact: FactType,
    pub keywords: Vec<String>,
    pub selector: Selector,
}

impl TableRule {
    pub fn new(fact: FactType, keywords: Vec<String>) -> Result<Self, SchemaError> {
        if keywords.iter().all(|k| k.trim().is_empty()) {
            return Err(SchemaError::NoKeywords(fact));
        }
        Ok(Self {
            fact,
            keywords,
            selector: parse_selector("table")?,
        })
    }

    pub fn with_selector(mut self, css: &str) -> Result<Self, SchemaError> {
        self.selector = parse_selector(css)?;
        Ok(self)
    }
}

/// Rules applied to a target's documents.
#[derive(Debug, Clone, Default)]
pub struct ExtractionSchema {
    pub rules: Vec<ScalarRule>,
    pub tables: Vec<TableRule>,
}

const PERCENT: &str = r"\d+(?:\.\d+)?\s*(?:%|per\s*cent)";

impl ExtractionSchema {
    pub fn new(rules: Vec<ScalarRule>, tables: Vec<TableRule>) -> Self {
        Self { rules, tables }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.tables.is_empty()
    }

    /// Fact types this schema looks for, in rule order.
    pub fn fact_types(&self) -> Vec<FactType> {
        let mut out = Vec::new();
        let all = self
            .rules
            .iter()
            .map(|r| r.fact)
            .chain(self.tables.iter().map(|t| t.fact));
        for fact in all {
            if !out.contains(&fact) {
                out.push(fact);
            }
        }
        out
    }

    /// Phrase shapes used across Queensland youth justice publications.
    pub fn builtin() -> Self {
        let sources: Vec<(FactType, String)> = vec![
            (
                FactType::SupervisionRate,
                r"(?i)supervision\s+rate[^0-9]{0,40}?(\d[\d,]*(?:\.\d+)?)\s*per\s+10,?000".into(),
            ),
            (
                FactType::SupervisionRate,
                r"(?i)(\d[\d,]*(?:\.\d+)?)\s*per\s+10,?000[^.]{0,40}?\bsupervis".into(),
            ),
            (
                FactType::OverrepresentationFactor,
                r"(?i)(\d+(?:\.\d+)?)\s*(?:times|x)\s+(?:more\s+likely|over-?represented)".into(),
            ),
            (
                FactType::IndigenousPercentage,
                format!(
                    r"(?i)({PERCENT})\s+(?:of\s+(?:young\s+people|youth|children)[^.%]{{0,60}}?\s+)?(?:were\s+|are\s+|identified\s+as\s+)?(?:Aboriginal|Indigenous|First\s+Nations)"
                ),
            ),
            (
                FactType::DetentionPopulation,
                r"(?i)average\s+(?:daily\s+)?number\s+of\s+young\s+people\s+in\s+detention[^0-9.]{0,20}?(\d[\d,]*)".into(),
            ),
            (
                FactType::DetentionPopulation,
                r"(?i)(\d[\d,]*)\s+(?:young\s+people|children)\s+(?:were\s+|are\s+)?(?:in|held\s+in)\s+(?:youth\s+)?detention".into(),
            ),
            (
                FactType::RemandPercentage,
                format!(r"(?i)({PERCENT})[^.%]{{0,60}}?\bon\s+remand"),
            ),
            (
                FactType::RemandPercentage,
                format!(r"(?i)remand[^.%0-9]{{0,40}}?({PERCENT})"),
            ),
            (
                FactType::DetentionDailyCost,
                r"(?i)detention[^.$]{0,60}?(\$\s?[\d,]+(?:\.\d+)?)\s*(?:per|a|each)\s+(?:young\s+person\s+(?:per\s+)?)?day".into(),
            ),
            (
                FactType::CommunityDailyCost,
                r"(?i)community[^.$]{0,60}?(\$\s?[\d,]+(?:\.\d+)?)\s*(?:per|a|each)\s+(?:young\s+person\s+(?:per\s+)?)?day".into(),
            ),
            (
                FactType::AverageStayDays,
                r"(?i)average\s+(?:length\s+of\s+)?stay[^0-9.]{0,30}?(\d+(?:\.\d+)?)\s*days".into(),
            ),
            (
                FactType::ReoffendingRate,
                format!(r"(?i)({PERCENT})[^.%]{{0,60}}?\bre-?offend"),
            ),
            (
                FactType::ReoffendingRate,
                format!(r"(?i)re-?offending\s+rate[^.%0-9]{{0,30}}?({PERCENT})"),
            ),
            (
                FactType::ReportingPeriod,
                r"(?i)\b(?:financial\s+year|reporting\s+period|in)\s+(20\d{2}[-\x{2013}]\d{2})\b".into(),
            ),
        ];

        let mut rules = Vec::with_capacity(sources.len());
        for (fact, pattern) in sources {
            match ScalarRule::pattern(fact, &pattern) {
                Ok(rule) => rules.push(rule),
                Err(e) => tracing::error!("Built-in rule rejected: {}", e),
            }
        }

        let keywords = YOUTH_JUSTICE_KEYWORDS.iter().map(|k| k.to_string()).collect();
        let tables = TableRule::new(FactType::BudgetAllocation, keywords)
            .map(|t| vec![t])
            .unwrap_or_default();

        Self { rules, tables }
    }
}
