//! Turning raw documents into facts.
//!
//! Extraction is best-effort and never fails. Each fact type resolves to one
//! of three outcomes: the first rule that yields a value wins; a rule that
//! matched text it could not parse is reported as a data-quality warning;
//! a fact no rule matched is simply absent.

pub mod classify;
pub mod html;
pub mod numeric;
mod schema;

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;
use serde_json::Value;
use tracing::{debug, warn};

pub use schema::{ExtractionSchema, ScalarRule, SchemaError, TableRule};

use crate::models::{
    ContentKind, ExtractedFact, Extraction, ExtractionOutcome, ExtractionWarning, FactType,
    FactValue, RawDocument, ValueKind,
};
use numeric::ParseError;

static SENTENCE_END: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.!?;]+(?:\s+|$)").unwrap());

/// Applies an extraction schema to documents.
pub struct Extractor<'a> {
    schema: &'a ExtractionSchema,
}

impl<'a> Extractor<'a> {
    pub fn new(schema: &'a ExtractionSchema) -> Self {
        Self { schema }
    }

    /// Run every rule in the schema against `doc`.
    pub fn extract(&self, doc: &RawDocument) -> ExtractionOutcome {
        let markup = doc
            .markup
            .as_deref()
            .filter(|_| doc.content == ContentKind::Html)
            .map(Html::parse_document);

        let mut outcome = ExtractionOutcome::default();
        let mut resolved: HashSet<(FactType, Option<String>)> = HashSet::new();
        let mut malformed: Vec<((FactType, Option<String>), String, String)> = Vec::new();

        for rule in &self.schema.rules {
            let key = (rule.fact, rule.subject.clone());
            if resolved.contains(&key) {
                continue;
            }
            match self.apply_rule(rule, doc, markup.as_ref()) {
                Extraction::Found(fact) => {
                    debug!(
                        "{}: {} = {} {}",
                        doc.target_id,
                        fact.fact_type,
                        fact.value,
                        fact.unit.as_str()
                    );
                    outcome.facts.push(fact);
                    resolved.insert(key);
                }
                Extraction::Malformed(raw) => {
                    if !malformed.iter().any(|(k, _, _)| *k == key) {
                        let reason = malformed_reason(&raw, rule.kind);
                        malformed.push((key, raw, reason));
                    }
                }
                Extraction::NotPresent => {}
            }
        }

        for table in &self.schema.tables {
            let facts = match markup.as_ref() {
                Some(document) => table_facts(table, document, doc),
                None => sentence_facts(table, doc),
            };
            if !facts.is_empty() {
                resolved.insert((table.fact, None));
            }
            outcome.facts.extend(facts);
        }

        for ((fact_type, subject), raw, reason) in malformed {
            if resolved.contains(&(fact_type, subject)) {
                continue;
            }
            warn!(
                "{}: could not parse {} from '{}': {}",
                doc.target_id, fact_type, raw, reason
            );
            outcome.warnings.push(ExtractionWarning {
                fact_type,
                raw,
                reason,
            });
        }

        let found: HashSet<FactType> = outcome.facts.iter().map(|f| f.fact_type).collect();
        let warned: HashSet<FactType> = outcome.warnings.iter().map(|w| w.fact_type).collect();
        outcome.missing = self
            .schema
            .fact_types()
            .into_iter()
            .filter(|f| !found.contains(f) && !warned.contains(f))
            .collect();

        outcome
    }

    /// Evaluate one scalar rule.
    pub fn apply_rule(
        &self,
        rule: &ScalarRule,
        doc: &RawDocument,
        markup: Option<&Html>,
    ) -> Extraction<ExtractedFact> {
        let candidates: Vec<String> = if let Some(path) = &rule.json_path {
            let Some(value) = doc.json.as_ref().and_then(|j| json_lookup(j, path)) else {
                return Extraction::NotPresent;
            };
            match value {
                Value::Number(n) if rule.kind != ValueKind::Text && rule.pattern.is_none() => {
                    return match n.as_f64() {
                        Some(v) => Extraction::Found(self.fact(rule, doc, FactValue::Number(v), &n.to_string())),
                        None => Extraction::Malformed(n.to_string()),
                    };
                }
                Value::String(s) => vec![s.clone()],
                Value::Null => return Extraction::NotPresent,
                other => vec![other.to_string()],
            }
        } else if let Some(selector) = &rule.selector {
            match markup {
                Some(document) => html::select_text(document, selector),
                None => return Extraction::NotPresent,
            }
        } else {
            vec![doc.text.clone()]
        };

        let mut first_malformed: Option<String> = None;
        for candidate in &candidates {
            let raw = match &rule.pattern {
                Some(re) => match re.captures(candidate) {
                    Some(caps) => caps
                        .get(1)
                        .or_else(|| caps.get(0))
                        .map(|m| m.as_str().to_string())
                        .unwrap_or_default(),
                    None => continue,
                },
                None => candidate.clone(),
            };

            match parse(&raw, rule.kind) {
                Ok(value) => return Extraction::Found(self.fact(rule, doc, value, &raw)),
                Err(ParseError::NoNumber) => continue,
                Err(_) => {
                    if first_malformed.is_none() {
                        first_malformed = Some(raw);
                    }
                }
            }
        }

        match first_malformed {
            Some(raw) => Extraction::Malformed(raw),
            None => Extraction::NotPresent,
        }
    }

    fn fact(&self, rule: &ScalarRule, doc: &RawDocument, value: FactValue, raw: &str) -> ExtractedFact {
        let mut fact = ExtractedFact::new(&doc.target_id, rule.fact, value, rule.unit).with_raw(raw);
        if let Some(subject) = &rule.subject {
            fact = fact.with_subject(subject.clone());
        }
        fact
    }
}

/// Convenience wrapper for a one-off extraction.
pub fn extract(schema: &ExtractionSchema, doc: &RawDocument) -> ExtractionOutcome {
    Extractor::new(schema).extract(doc)
}

fn parse(raw: &str, kind: ValueKind) -> Result<FactValue, ParseError> {
    match kind {
        ValueKind::Text => numeric::parse_text(raw).map(FactValue::Text),
        _ => numeric::parse_value(raw, kind).map(FactValue::Number),
    }
}

fn malformed_reason(raw: &str, kind: ValueKind) -> String {
    match parse(raw, kind) {
        Err(e) => e.to_string(),
        Ok(_) => "unexpected value".to_string(),
    }
}

/// Follow a dot-separated path; numeric segments index arrays.
fn json_lookup<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    path.split('.')
        .filter(|s| !s.is_empty())
        .try_fold(value, |current, segment| match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        })
}

/// Budget lines from HTML tables.
fn table_facts(rule: &TableRule, document: &Html, doc: &RawDocument) -> Vec<ExtractedFact> {
    let mut facts = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for table in html::extract_tables(document, &rule.selector) {
        let scales: Vec<Option<f64>> = table
            .headers
            .iter()
            .map(|h| numeric::header_scale(h))
            .collect();

        for cells in &table.rows {
            let row_text = cells.join(" ");
            if !classify::mentions_any(&row_text, &rule.keywords) {
                continue;
            }

            let amount = cells
                .iter()
                .enumerate()
                .filter_map(|(i, cell)| numeric::cell_amount(cell, scales.get(i).copied().flatten()))
                .chain(numeric::currency_amounts(&row_text))
                .fold(None, |max: Option<f64>, v| Some(max.map_or(v, |m| m.max(v))));
            let Some(amount) = amount else {
                continue;
            };

            let subject = classify::row_program_name(cells)
                .unwrap_or_else(|| classify::program_name(&row_text));
            if !seen.insert(crate::models::slugify(&subject)) {
                continue;
            }
            facts.push(budget_fact(rule, doc, amount, subject, &row_text));
        }
    }

    facts
}

/// Budget lines from running text, one sentence at a time.
fn sentence_facts(rule: &TableRule, doc: &RawDocument) -> Vec<ExtractedFact> {
    let mut facts = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for sentence in SENTENCE_END.split(&doc.text) {
        let sentence = sentence.trim();
        if sentence.is_empty() || !classify::mentions_any(sentence, &rule.keywords) {
            continue;
        }
        let Some(amount) = numeric::currency_amounts(sentence)
            .into_iter()
            .reduce(f64::max)
        else {
            continue;
        };

        let subject = classify::program_name(sentence);
        if !seen.insert(crate::models::slugify(&subject)) {
            continue;
        }
        facts.push(budget_fact(rule, doc, amount, subject, sentence));
    }

    facts
}

fn budget_fact(
    rule: &TableRule,
    doc: &RawDocument,
    amount: f64,
    subject: String,
    context: &str,
) -> ExtractedFact {
    ExtractedFact::new(
        &doc.target_id,
        rule.fact,
        FactValue::Number(amount),
        rule.fact.default_unit(),
    )
    .with_category(classify::categorize(context))
    .with_subject(subject)
    .with_raw(context.chars().take(500).collect::<String>())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Unit;

    const SAMPLE: &str = "Queensland supervision rate: 175 per 10,000. \
                          Indigenous youth are 20 times more likely to be supervised.";

    fn text_doc(text: &str) -> RawDocument {
        RawDocument::from_body("qld-stats", "https://example.gov.au/stats", ContentKind::Text, text)
    }

    #[test]
    fn test_sample_yields_two_facts() {
        let schema = ExtractionSchema::builtin();
        let outcome = extract(&schema, &text_doc(SAMPLE));

        assert_eq!(outcome.facts.len(), 2);
        assert!(outcome.warnings.is_empty());

        let rate = outcome.fact(FactType::SupervisionRate).unwrap();
        assert_eq!(rate.value, FactValue::Number(175.0));
        assert_eq!(rate.unit, Unit::Per10000);
        assert_eq!(rate.unit.as_str(), "per_10000");

        let factor = outcome.fact(FactType::OverrepresentationFactor).unwrap();
        assert_eq!(factor.value, FactValue::Number(20.0));
        assert_eq!(factor.unit.as_str(), "x");

        assert!(outcome.missing.contains(&FactType::BudgetAllocation));
        assert!(!outcome.missing.contains(&FactType::SupervisionRate));
    }

    #[test]
    fn test_malformed_is_a_warning_not_a_fact() {
        let rule = ScalarRule::pattern(FactType::RemandPercentage, r"(?i)remand(?:ed)?\s+rate\s+(\S+)")
            .unwrap();
        let schema = ExtractionSchema::new(vec![rule], vec![]);
        let outcome = extract(&schema, &text_doc("The remand rate 64.5 is up."));

        assert!(outcome.facts.is_empty());
        assert_eq!(outcome.warnings.len(), 1);
        assert_eq!(outcome.warnings[0].fact_type, FactType::RemandPercentage);
        assert_eq!(outcome.warnings[0].raw, "64.5");
        assert!(outcome.missing.is_empty());
    }

    #[test]
    fn test_later_rule_rescues_malformed() {
        let bad = ScalarRule::pattern(FactType::RemandPercentage, r"remand\s+(\S+)").unwrap();
        let good = ScalarRule::pattern(FactType::RemandPercentage, r"(\d+%)").unwrap();
        let schema = ExtractionSchema::new(vec![bad, good], vec![]);
        let outcome = extract(&schema, &text_doc("remand 64.5 or 70%"));

        assert_eq!(outcome.facts.len(), 1);
        assert_eq!(outcome.facts[0].value, FactValue::Number(70.0));
        assert!(outcome.warnings.is_empty());
    }

    #[test]
    fn test_no_number_is_not_present() {
        let rule = ScalarRule::pattern(FactType::DetentionPopulation, r"detained:\s+(.+)").unwrap();
        let schema = ExtractionSchema::new(vec![rule], vec![]);
        let outcome = extract(&schema, &text_doc("detained: approximately some"));

        assert!(outcome.facts.is_empty());
        assert!(outcome.warnings.is_empty());
        assert_eq!(outcome.missing, vec![FactType::DetentionPopulation]);
    }

    #[test]
    fn test_first_match_wins() {
        let schema = ExtractionSchema::builtin();
        let outcome = extract(
            &schema,
            &text_doc("The supervision rate: 175 per 10,000. Later the supervision rate: 180 per 10,000."),
        );
        assert_eq!(
            outcome.fact(FactType::SupervisionRate).unwrap().value,
            FactValue::Number(175.0)
        );
    }

    #[test]
    fn test_selector_rule() {
        let html = r#"<html><body><div class="stat">Rate <span>21.4x</span></div></body></html>"#;
        let doc = RawDocument::from_body("t", "https://x/", ContentKind::Html, html);
        let rule = ScalarRule::new(FactType::OverrepresentationFactor)
            .with_selector("div.stat span")
            .unwrap();
        let outcome = extract(&ExtractionSchema::new(vec![rule], vec![]), &doc);
        assert_eq!(outcome.facts[0].value, FactValue::Number(21.4));
    }

    #[test]
    fn test_json_rule() {
        let body = r#"{"data": [{"rate": 175, "period": "2023-24"}]}"#;
        let doc = RawDocument::from_body("t", "https://x/api", ContentKind::Json, body);
        let rules = vec![
            ScalarRule::new(FactType::SupervisionRate).with_json_path("data.0.rate"),
            ScalarRule::new(FactType::ReportingPeriod).with_json_path("data.0.period"),
            ScalarRule::new(FactType::AverageStayDays).with_json_path("data.0.stay"),
        ];
        let outcome = extract(&ExtractionSchema::new(rules, vec![]), &doc);

        assert_eq!(
            outcome.fact(FactType::SupervisionRate).unwrap().value,
            FactValue::Number(175.0)
        );
        assert_eq!(
            outcome.fact(FactType::ReportingPeriod).unwrap().value,
            FactValue::Text("2023-24".into())
        );
        assert_eq!(outcome.missing, vec![FactType::AverageStayDays]);
    }

    #[test]
    fn test_budget_table() {
        let html = r#"<html><body><table>
            <tr><th>Service area</th><th>2023-24 $'000</th><th>2024-25 $'000</th></tr>
            <tr><td>Youth detention centres</td><td>198,000</td><td>245,100</td></tr>
            <tr><td>Youth justice community programs</td><td>80,200</td><td>92,750</td></tr>
            <tr><td>Road maintenance</td><td>1,000</td><td>2,000</td></tr>
            <tr><td>Youth detention centres</td><td>5</td><td>6</td></tr>
        </table></body></html>"#;
        let doc = RawDocument::from_body("budget", "https://x/", ContentKind::Html, html);
        let outcome = extract(&ExtractionSchema::builtin(), &doc);

        let budget: Vec<_> = outcome
            .facts
            .iter()
            .filter(|f| f.fact_type == FactType::BudgetAllocation)
            .collect();
        assert_eq!(budget.len(), 2);
        assert_eq!(budget[0].subject.as_deref(), Some("Youth detention centres"));
        assert_eq!(budget[0].value, FactValue::Number(245_100_000.0));
        assert_eq!(budget[0].category.as_deref(), Some("detention"));
        assert_eq!(budget[1].value, FactValue::Number(92_750_000.0));
        assert_eq!(budget[1].category.as_deref(), Some("community"));
    }

    #[test]
    fn test_budget_sentences() {
        let text = "The government will invest $12.5 million for Intensive Bail Support program \
                    in youth justice. Roads receive $400 million. \
                    Cleveland youth detention upgrades total $85m!";
        let outcome = extract(&ExtractionSchema::builtin(), &text_doc(text));
        let budget: Vec<_> = outcome
            .facts
            .iter()
            .filter(|f| f.fact_type == FactType::BudgetAllocation)
            .collect();

        assert_eq!(budget.len(), 2);
        assert_eq!(budget[0].value, FactValue::Number(12_500_000.0));
        assert_eq!(budget[0].subject.as_deref(), Some("Intensive Bail Support"));
        assert_eq!(budget[0].category.as_deref(), Some("community"));
        assert_eq!(budget[1].value, FactValue::Number(85_000_000.0));
        assert_eq!(budget[1].category.as_deref(), Some("detention"));
    }

    #[test]
    fn test_garbage_input_yields_empty_outcome() {
        let doc = RawDocument::from_body("t", "https://x/", ContentKind::Html, "<<<>>>\u{0}</p");
        let outcome = extract(&ExtractionSchema::builtin(), &doc);
        assert!(outcome.facts.is_empty());
        assert!(outcome.warnings.is_empty());
    }
}
