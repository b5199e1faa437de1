//! Persisted records keyed by natural key.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::fact::{ExtractedFact, FactValue};
use super::target::{FactType, Target, Unit};

/// Where a record's value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// Derived from a live extraction.
    Live,
    /// Hand-curated fixture data.
    Seed,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Seed => "seed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "live" => Some(Self::Live),
            "seed" => Some(Self::Seed),
            _ => None,
        }
    }
}

/// What an upsert did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    /// Same values already stored; only `extracted_at` was refreshed.
    Unchanged,
    /// Existing record kept: seed data never replaces a live record, and a
    /// live record is never replaced by a lower-priority target's value.
    Skipped,
}

/// One row per natural key in a destination table.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    pub destination: String,
    pub natural_key: String,
    pub fact_type: FactType,
    pub subject: Option<String>,
    pub category: Option<String>,
    pub period: Option<String>,
    pub value: FactValue,
    pub unit: Unit,
    pub target_id: String,
    pub priority: i32,
    pub source_url: String,
    pub document_name: Option<String>,
    pub provenance: Provenance,
    /// Last time an extraction produced this value.
    pub extracted_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Last time the stored values changed.
    pub updated_at: DateTime<Utc>,
}

impl StoredRecord {
    /// Build the live record for a fact extracted from `target`.
    pub fn from_fact(target: &Target, fact: &ExtractedFact, document_name: Option<&str>) -> Self {
        let now = Utc::now();
        Self {
            destination: target.destination.clone(),
            natural_key: natural_key(
                target.period.as_deref(),
                fact.fact_type,
                fact.subject.as_deref(),
            ),
            fact_type: fact.fact_type,
            subject: fact.subject.clone(),
            category: fact.category.clone(),
            period: target.period.clone(),
            value: fact.value.clone(),
            unit: fact.unit,
            target_id: target.id.clone(),
            priority: target.priority,
            source_url: target.url.clone(),
            document_name: document_name.map(|s| s.to_string()),
            provenance: Provenance::Live,
            extracted_at: fact.extracted_at,
            created_at: now,
            updated_at: now,
        }
    }

    /// Compare everything except timestamps.
    pub fn same_values(&self, other: &StoredRecord) -> bool {
        self.destination == other.destination
            && self.natural_key == other.natural_key
            && self.fact_type == other.fact_type
            && self.subject == other.subject
            && self.category == other.category
            && self.period == other.period
            && self.value == other.value
            && self.unit == other.unit
            && self.target_id == other.target_id
            && self.priority == other.priority
            && self.source_url == other.source_url
            && self.document_name == other.document_name
            && self.provenance == other.provenance
    }
}

/// Decide what writing `incoming` over `existing` should do.
///
/// Shared by every store so the conflict policy is identical everywhere:
/// last write wins with full-record replacement, except that seed data
/// never displaces live data and a live value from a lower-priority target
/// never displaces one from a higher-priority target.
pub fn plan_upsert(existing: Option<&StoredRecord>, incoming: &StoredRecord) -> UpsertOutcome {
    let Some(current) = existing else {
        return UpsertOutcome::Inserted;
    };
    if current.provenance == Provenance::Live && incoming.provenance == Provenance::Seed {
        return UpsertOutcome::Skipped;
    }
    if current.provenance == Provenance::Live
        && incoming.provenance == Provenance::Live
        && current.target_id != incoming.target_id
    {
        if incoming.priority < current.priority {
            warn!(
                "{}/{}: keeping {} from {} (priority {}) over {} from {} (priority {})",
                incoming.destination,
                incoming.natural_key,
                current.value,
                current.target_id,
                current.priority,
                incoming.value,
                incoming.target_id,
                incoming.priority
            );
            return UpsertOutcome::Skipped;
        }
        if current.value != incoming.value {
            warn!(
                "{}/{}: {} from {} replaces {} from {}",
                incoming.destination,
                incoming.natural_key,
                incoming.value,
                incoming.target_id,
                current.value,
                current.target_id
            );
        }
    }
    if current.same_values(incoming) {
        UpsertOutcome::Unchanged
    } else {
        UpsertOutcome::Updated
    }
}

/// Compose the natural key: `[period:]fact_type[:subject-slug]`.
pub fn natural_key(period: Option<&str>, fact_type: FactType, subject: Option<&str>) -> String {
    let mut parts = Vec::with_capacity(3);
    if let Some(period) = period.filter(|p| !p.trim().is_empty()) {
        parts.push(period.trim().to_string());
    }
    parts.push(fact_type.as_str().to_string());
    if let Some(subject) = subject.map(slugify).filter(|s| !s.is_empty()) {
        parts.push(subject);
    }
    parts.join(":")
}

/// Lowercase, alphanumeric runs joined by single dashes.
pub fn slugify(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut pending_dash = false;
    for c in s.chars() {
        if c.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.extend(c.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Filter for listing records.
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    pub destination: Option<String>,
    pub fact_type: Option<FactType>,
    pub period: Option<String>,
    pub subject: Option<String>,
}

impl RecordQuery {
    pub fn fact(fact_type: FactType) -> Self {
        Self {
            fact_type: Some(fact_type),
            ..Default::default()
        }
    }

    pub fn matches(&self, record: &StoredRecord) -> bool {
        self.destination
            .as_ref()
            .is_none_or(|d| d == &record.destination)
            && self.fact_type.is_none_or(|f| f == record.fact_type)
            && self
                .period
                .as_ref()
                .is_none_or(|p| record.period.as_ref() == Some(p))
            && self
                .subject
                .as_ref()
                .is_none_or(|s| record.subject.as_ref() == Some(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(value: f64, provenance: Provenance) -> StoredRecord {
        let target = Target::new("qld-stats", "https://example.gov.au/", "youth_statistics");
        let fact = ExtractedFact::new(
            "qld-stats",
            FactType::SupervisionRate,
            FactValue::Number(value),
            Unit::Per10000,
        );
        let mut record = StoredRecord::from_fact(&target, &fact, None);
        record.provenance = provenance;
        record
    }

    #[test]
    fn test_natural_key() {
        assert_eq!(
            natural_key(Some("2024-25"), FactType::BudgetAllocation, Some("Youth Detention Operations")),
            "2024-25:budget_allocation:youth-detention-operations"
        );
        assert_eq!(
            natural_key(None, FactType::SupervisionRate, None),
            "supervision_rate"
        );
        assert_eq!(
            natural_key(Some("  "), FactType::SupervisionRate, Some("--")),
            "supervision_rate"
        );
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Cleveland Youth Detention Centre"), "cleveland-youth-detention-centre");
        assert_eq!(slugify("  Bail support (QLD) "), "bail-support-qld");
        assert_eq!(slugify(""), "");
    }

    #[test]
    fn test_plan_upsert() {
        let live = record(175.0, Provenance::Live);
        let seed = record(180.0, Provenance::Seed);

        assert_eq!(plan_upsert(None, &live), UpsertOutcome::Inserted);
        assert_eq!(plan_upsert(Some(&live), &live.clone()), UpsertOutcome::Unchanged);
        assert_eq!(plan_upsert(Some(&live), &record(176.0, Provenance::Live)), UpsertOutcome::Updated);
        assert_eq!(plan_upsert(Some(&live), &seed), UpsertOutcome::Skipped);
        assert_eq!(plan_upsert(Some(&seed), &live), UpsertOutcome::Updated);
    }

    #[test]
    fn test_lower_priority_target_keeps_existing() {
        let mut high = record(20.0, Provenance::Live);
        high.target_id = "high".into();
        high.priority = 5;
        let mut low = record(18.0, Provenance::Live);
        low.target_id = "low".into();
        low.priority = 0;

        assert_eq!(plan_upsert(Some(&high), &low), UpsertOutcome::Skipped);
        assert_eq!(plan_upsert(Some(&low), &high), UpsertOutcome::Updated);

        // equal priority falls back to last write wins
        low.priority = 5;
        assert_eq!(plan_upsert(Some(&high), &low), UpsertOutcome::Updated);
    }

    #[test]
    fn test_same_values_ignores_timestamps() {
        let a = record(175.0, Provenance::Live);
        let mut b = a.clone();
        b.extracted_at = a.extracted_at + chrono::Duration::hours(1);
        b.updated_at = a.updated_at + chrono::Duration::hours(1);
        assert!(a.same_values(&b));
    }

    #[test]
    fn test_query_matches() {
        let r = record(175.0, Provenance::Live);
        assert!(RecordQuery::default().matches(&r));
        assert!(RecordQuery::fact(FactType::SupervisionRate).matches(&r));
        assert!(!RecordQuery::fact(FactType::BudgetAllocation).matches(&r));
        let by_period = RecordQuery {
            period: Some("2024-25".into()),
            ..Default::default()
        };
        assert!(!by_period.matches(&r));
    }
}
