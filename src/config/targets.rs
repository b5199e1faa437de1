//! Declarative target definitions.
//!
//! ```toml
//! [[target]]
//! id = "childrens-court-annual"
//! url = "https://www.courts.qld.gov.au/annual-report.pdf"
//! destination = "court_statistics"
//! content = "pdf"
//! period = "2023-24"
//!
//! [[target.rule]]
//! fact = "remand_percentage"
//! pattern = '(\d+(?:\.\d+)?)\s*(?:%|per cent)\s+(?:of young people )?(?:were )?on remand'
//! ```
//!
//! Every field except `id`, `url` and `destination` has a default. A target
//! without rules uses the built-in youth-justice schema.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;
use url::Url;

use super::ConfigError;
use crate::extract::{ExtractionSchema, ScalarRule, SchemaError, TableRule};
use crate::models::{
    CircuitPolicy, ContentKind, FactType, RateLimitPolicy, RenderOptions, RetryPolicy, Target,
    Unit, ValueKind,
};

#[derive(Debug, Deserialize)]
struct TargetsFile {
    #[serde(default, rename = "target")]
    targets: Vec<TargetEntry>,
}

fn default_true() -> bool {
    true
}

fn default_cadence_hours() -> u64 {
    24
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_render_wait_ms() -> u64 {
    2000
}

/// Ten years. Anything longer is a typo.
const MAX_CADENCE_HOURS: u64 = 24 * 365 * 10;
const MAX_COOLDOWN_SECS: u64 = 30 * 24 * 3600;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TargetEntry {
    id: String,
    url: String,
    #[serde(default)]
    description: String,
    destination: String,
    #[serde(default)]
    content: ContentKind,
    #[serde(default)]
    priority: i32,
    period: Option<String>,
    #[serde(default = "default_cadence_hours")]
    cadence_hours: u64,
    #[serde(default = "default_timeout_secs")]
    timeout_secs: u64,
    #[serde(default)]
    render: bool,
    #[serde(default = "default_render_wait_ms")]
    render_wait_ms: u64,
    #[serde(default = "default_true")]
    enabled: bool,
    #[serde(default)]
    rate_limit: RateLimitEntry,
    #[serde(default)]
    retry: RetryEntry,
    #[serde(default)]
    circuit: CircuitEntry,
    #[serde(default, rename = "rule")]
    rules: Vec<RuleEntry>,
    #[serde(default, rename = "table")]
    tables: Vec<TableEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RateLimitEntry {
    min_interval_ms: u64,
}

impl Default for RateLimitEntry {
    fn default() -> Self {
        Self {
            min_interval_ms: 3000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct RetryEntry {
    max_attempts: u32,
    base_delay_ms: u64,
}

impl Default for RetryEntry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct CircuitEntry {
    failure_threshold: u32,
    cooldown_secs: u64,
}

impl Default for CircuitEntry {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_secs: 900,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleEntry {
    fact: FactType,
    kind: Option<ValueKind>,
    pattern: Option<String>,
    selector: Option<String>,
    json_path: Option<String>,
    unit: Option<Unit>,
    subject: Option<String>,
}

impl RuleEntry {
    fn into_rule(self) -> Result<ScalarRule, SchemaError> {
        let mut rule = ScalarRule::new(self.fact);
        if let Some(kind) = self.kind {
            rule = rule.with_kind(kind);
        }
        if let Some(pattern) = &self.pattern {
            rule = rule.with_pattern(pattern)?;
        }
        if let Some(selector) = &self.selector {
            rule = rule.with_selector(selector)?;
        }
        if let Some(path) = &self.json_path {
            rule = rule.with_json_path(path);
        }
        if let Some(unit) = self.unit {
            rule = rule.with_unit(unit);
        }
        if let Some(subject) = &self.subject {
            rule = rule.with_subject(subject);
        }
        rule.validate()?;
        Ok(rule)
    }
}

fn default_table_fact() -> FactType {
    FactType::BudgetAllocation
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct TableEntry {
    #[serde(default = "default_table_fact")]
    fact: FactType,
    keywords: Vec<String>,
    selector: Option<String>,
}

impl TableEntry {
    fn into_rule(self) -> Result<TableRule, SchemaError> {
        let rule = TableRule::new(self.fact, self.keywords)?;
        match &self.selector {
            Some(css) => rule.with_selector(css),
            None => Ok(rule),
        }
    }
}

impl TargetEntry {
    fn into_target(self) -> Result<Target, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidTarget {
            target: self.id.clone(),
            reason,
        };

        if self.id.trim().is_empty() {
            return Err(invalid("id is empty".to_string()));
        }
        if self.destination.trim().is_empty() {
            return Err(invalid("destination is empty".to_string()));
        }
        match Url::parse(&self.url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(invalid(format!("unsupported URL scheme '{}'", url.scheme())));
            }
            Err(e) => return Err(invalid(format!("invalid URL '{}': {}", self.url, e))),
        }
        if self.timeout_secs == 0 {
            return Err(invalid("timeout_secs must be positive".to_string()));
        }
        if self.cadence_hours > MAX_CADENCE_HOURS {
            return Err(invalid(format!(
                "cadence_hours must be at most {}",
                MAX_CADENCE_HOURS
            )));
        }
        if self.circuit.cooldown_secs > MAX_COOLDOWN_SECS {
            return Err(invalid(format!(
                "circuit.cooldown_secs must be at most {}",
                MAX_COOLDOWN_SECS
            )));
        }

        let schema_err = |source: SchemaError| ConfigError::Schema {
            target: self.id.clone(),
            source,
        };
        let rules = self
            .rules
            .into_iter()
            .map(RuleEntry::into_rule)
            .collect::<Result<Vec<_>, _>>()
            .map_err(schema_err)?;
        let tables = self
            .tables
            .into_iter()
            .map(TableEntry::into_rule)
            .collect::<Result<Vec<_>, _>>()
            .map_err(schema_err)?;
        let schema = if rules.is_empty() && tables.is_empty() {
            ExtractionSchema::builtin()
        } else {
            ExtractionSchema::new(rules, tables)
        };

        Ok(Target {
            id: self.id,
            url: self.url,
            description: self.description,
            destination: self.destination,
            content: self.content,
            priority: self.priority,
            period: self.period.filter(|p| !p.trim().is_empty()),
            cadence: Duration::from_secs(self.cadence_hours.saturating_mul(3600)),
            timeout: Duration::from_secs(self.timeout_secs),
            render: self.render.then(|| RenderOptions {
                wait: Duration::from_millis(self.render_wait_ms),
            }),
            enabled: self.enabled,
            rate_limit: RateLimitPolicy {
                min_interval: Duration::from_millis(self.rate_limit.min_interval_ms),
            },
            retry: RetryPolicy {
                max_attempts: self.retry.max_attempts,
                base_delay: Duration::from_millis(self.retry.base_delay_ms),
            },
            circuit: CircuitPolicy {
                failure_threshold: self.circuit.failure_threshold,
                cooldown: Duration::from_secs(self.circuit.cooldown_secs),
            },
            schema,
        })
    }
}

/// Parse and validate a targets file.
pub fn parse_targets(content: &str) -> Result<Vec<Target>, ConfigError> {
    let file: TargetsFile = toml::from_str(content)?;
    let mut seen = HashSet::new();
    let mut targets = Vec::with_capacity(file.targets.len());
    for entry in file.targets {
        if !seen.insert(entry.id.clone()) {
            return Err(ConfigError::DuplicateTarget(entry.id));
        }
        targets.push(entry.into_target()?);
    }
    for (destination, period, fact, ids) in shared_outputs(&targets) {
        warn!(
            "targets {} all write {} for period {} into {}; priority decides which value is kept",
            ids.join(", "),
            fact,
            period.unwrap_or("(none)"),
            destination
        );
    }
    Ok(targets)
}

/// Fact types that more than one enabled target writes under the same
/// destination and period, and so compete for the same natural keys.
fn shared_outputs(targets: &[Target]) -> Vec<(&str, Option<&str>, FactType, Vec<&str>)> {
    let mut writers: HashMap<(&str, Option<&str>, FactType), Vec<&str>> = HashMap::new();
    for target in targets.iter().filter(|t| t.enabled) {
        let facts: HashSet<FactType> = target
            .schema
            .rules
            .iter()
            .map(|r| r.fact)
            .chain(target.schema.tables.iter().map(|t| t.fact))
            .collect();
        for fact in facts {
            writers
                .entry((target.destination.as_str(), target.period.as_deref(), fact))
                .or_default()
                .push(target.id.as_str());
        }
    }
    let mut shared: Vec<_> = writers
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|((destination, period, fact), ids)| (destination, period, fact, ids))
        .collect();
    shared.sort_by(|a, b| (a.0, a.1, a.2.as_str()).cmp(&(b.0, b.1, b.2.as_str())));
    shared
}

pub fn load_targets(path: &Path) -> Result<Vec<Target>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_targets(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGETS: &str = r#"
[[target]]
id = "pocket-stats"
url = "https://www.aihw.gov.au/reports/youth-justice"
destination = "youth_statistics"
period = "2023-24"
priority = 2

[[target]]
id = "sds-budget"
url = "https://budget.qld.gov.au/files/sds.pdf"
destination = "budget_allocations"
content = "pdf"
cadence_hours = 168
enabled = false

[target.retry]
max_attempts = 5

[[target.table]]
keywords = ["youth justice", "detention"]

[[target.rule]]
fact = "detention_daily_cost"
pattern = '\$([\d,]+)\s+per (?:young person per )?day'
kind = "currency"

[[target]]
id = "dashboard"
url = "https://www.dcyjma.qld.gov.au/dashboard"
destination = "youth_statistics"
render = true
render_wait_ms = 4000

[target.rate_limit]
min_interval_ms = 10000
"#;

    #[test]
    fn test_parse_targets() {
        let targets = parse_targets(TARGETS).unwrap();
        assert_eq!(targets.len(), 3);

        let pocket = &targets[0];
        assert_eq!(pocket.priority, 2);
        assert_eq!(pocket.period.as_deref(), Some("2023-24"));
        assert_eq!(pocket.cadence, Duration::from_secs(24 * 3600));
        assert_eq!(pocket.timeout, Duration::from_secs(30));
        assert_eq!(pocket.retry.max_attempts, 3);
        assert_eq!(pocket.circuit.failure_threshold, 5);
        assert!(pocket.enabled);
        assert!(pocket.render.is_none());
        assert!(!pocket.schema.rules.is_empty());

        let sds = &targets[1];
        assert_eq!(sds.content, ContentKind::Pdf);
        assert!(!sds.enabled);
        assert_eq!(sds.retry.max_attempts, 5);
        assert_eq!(sds.retry.base_delay, Duration::from_millis(1000));
        assert_eq!(sds.schema.tables.len(), 1);
        assert_eq!(sds.schema.tables[0].fact, FactType::BudgetAllocation);
        assert_eq!(sds.schema.rules.len(), 1);

        let dashboard = &targets[2];
        assert_eq!(
            dashboard.render.map(|r| r.wait),
            Some(Duration::from_millis(4000))
        );
        assert_eq!(
            dashboard.rate_limit.min_interval,
            Duration::from_millis(10000)
        );
    }

    #[test]
    fn test_shared_outputs() {
        let content = r#"
[[target]]
id = "high"
url = "https://example.gov.au/a"
destination = "youth_statistics"
period = "2024-25"
priority = 5

[[target]]
id = "low"
url = "https://example.gov.au/b"
destination = "youth_statistics"
period = "2024-25"

[[target]]
id = "other-year"
url = "https://example.gov.au/c"
destination = "youth_statistics"
period = "2023-24"
"#;
        let targets = parse_targets(content).unwrap();
        let shared = shared_outputs(&targets);
        assert!(!shared.is_empty());
        for (destination, period, _, ids) in &shared {
            assert_eq!(*destination, "youth_statistics");
            assert_eq!(*period, Some("2024-25"));
            assert_eq!(ids, &vec!["high", "low"]);
        }
    }

    #[test]
    fn test_duplicate_ids() {
        let content = r#"
[[target]]
id = "a"
url = "https://example.gov.au/"
destination = "x"

[[target]]
id = "a"
url = "https://example.gov.au/other"
destination = "x"
"#;
        assert!(matches!(
            parse_targets(content),
            Err(ConfigError::DuplicateTarget(id)) if id == "a"
        ));
    }

    #[test]
    fn test_invalid_regex() {
        let content = r#"
[[target]]
id = "a"
url = "https://example.gov.au/"
destination = "x"

[[target.rule]]
fact = "supervision_rate"
pattern = '(\d+'
"#;
        assert!(matches!(
            parse_targets(content),
            Err(ConfigError::Schema { .. })
        ));
    }

    #[test]
    fn test_invalid_selector() {
        let content = r#"
[[target]]
id = "a"
url = "https://example.gov.au/"
destination = "x"

[[target.rule]]
fact = "supervision_rate"
selector = "div[["
"#;
        assert!(matches!(
            parse_targets(content),
            Err(ConfigError::Schema { .. })
        ));
    }

    #[test]
    fn test_rule_without_matchers() {
        let content = r#"
[[target]]
id = "a"
url = "https://example.gov.au/"
destination = "x"

[[target.rule]]
fact = "supervision_rate"
"#;
        assert!(matches!(
            parse_targets(content),
            Err(ConfigError::Schema { .. })
        ));
    }

    #[test]
    fn test_rejects_relative_and_non_http_urls() {
        for url in ["/stats", "ftp://example.gov.au/stats"] {
            let content = format!(
                "[[target]]\nid = \"a\"\nurl = \"{}\"\ndestination = \"x\"\n",
                url
            );
            assert!(matches!(
                parse_targets(&content),
                Err(ConfigError::InvalidTarget { .. })
            ));
        }
    }

    #[test]
    fn test_rejects_oversized_intervals() {
        for extra in [
            "cadence_hours = 9223372036854775807\n",
            "[target.circuit]\ncooldown_secs = 9223372036854775807\n",
        ] {
            let content = format!(
                "[[target]]\nid = \"a\"\nurl = \"https://example.gov.au/\"\ndestination = \"x\"\n{}",
                extra
            );
            assert!(matches!(
                parse_targets(&content),
                Err(ConfigError::InvalidTarget { .. })
            ));
        }
    }

    #[test]
    fn test_unknown_fact_type() {
        let content = r#"
[[target]]
id = "a"
url = "https://example.gov.au/"
destination = "x"

[[target.rule]]
fact = "crime_index"
pattern = '(\d+)'
"#;
        assert!(matches!(parse_targets(content), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_missing_file() {
        assert!(matches!(
            load_targets(Path::new("/nonexistent/targets.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
