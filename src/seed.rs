//! Hand-curated seed records.
//!
//! Seed files hold figures transcribed from published reports. They are
//! stored with `Provenance::Seed` so they can never be mistaken for live
//! extractions, and a live record is never overwritten by one.
//!
//! ```toml
//! [[record]]
//! destination = "budget_allocations"
//! fact = "budget_allocation"
//! value = 245100000
//! period = "2024-25"
//! subject = "Youth detention centres"
//! category = "detention"
//! source_url = "https://budget.qld.gov.au/"
//! document = "Service Delivery Statements 2024-25"
//! ```

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;

use crate::models::{natural_key, FactType, FactValue, Provenance, StoredRecord, Unit};

/// Target id recorded on seed rows.
pub const SEED_TARGET_ID: &str = "seed";

#[derive(Debug, Error)]
pub enum SeedError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid seed file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("record {index}: {reason}")]
    Invalid { index: usize, reason: String },
}

#[derive(Debug, Deserialize)]
struct SeedFile {
    #[serde(default, rename = "record")]
    records: Vec<SeedEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SeedEntry {
    destination: String,
    fact: FactType,
    value: FactValue,
    unit: Option<Unit>,
    period: Option<String>,
    subject: Option<String>,
    category: Option<String>,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    source_url: String,
    document: Option<String>,
}

impl SeedEntry {
    fn into_record(self, index: usize) -> Result<StoredRecord, SeedError> {
        let invalid = |reason: &str| SeedError::Invalid {
            index,
            reason: reason.to_string(),
        };
        if self.destination.trim().is_empty() {
            return Err(invalid("destination is empty"));
        }
        if self.fact != FactType::ReportingPeriod && self.value.as_f64().is_none() {
            return Err(invalid(&format!("{} needs a numeric value", self.fact)));
        }

        let now = Utc::now();
        Ok(StoredRecord {
            natural_key: natural_key(self.period.as_deref(), self.fact, self.subject.as_deref()),
            destination: self.destination,
            fact_type: self.fact,
            subject: self.subject,
            category: self.category,
            period: self.period,
            value: self.value,
            unit: self.unit.unwrap_or_else(|| self.fact.default_unit()),
            target_id: SEED_TARGET_ID.to_string(),
            priority: self.priority,
            source_url: self.source_url,
            document_name: self.document,
            provenance: Provenance::Seed,
            extracted_at: now,
            created_at: now,
            updated_at: now,
        })
    }
}

/// Parse seed records from TOML text.
pub fn parse_seed(content: &str) -> Result<Vec<StoredRecord>, SeedError> {
    let file: SeedFile = toml::from_str(content)?;
    file.records
        .into_iter()
        .enumerate()
        .map(|(i, entry)| entry.into_record(i + 1))
        .collect()
}

pub fn load_seed_file(path: &Path) -> Result<Vec<StoredRecord>, SeedError> {
    let content = std::fs::read_to_string(path).map_err(|source| SeedError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_seed(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEED: &str = r#"
[[record]]
destination = "budget_allocations"
fact = "budget_allocation"
value = 245100000
period = "2024-25"
subject = "Youth detention centres"
category = "detention"
document = "Service Delivery Statements 2024-25"

[[record]]
destination = "youth_statistics"
fact = "overrepresentation_factor"
value = 21.4
unit = "x"
"#;

    #[test]
    fn test_parse_seed() {
        let records = parse_seed(SEED).unwrap();
        assert_eq!(records.len(), 2);

        let budget = &records[0];
        assert_eq!(budget.natural_key, "2024-25:budget_allocation:youth-detention-centres");
        assert_eq!(budget.value, FactValue::Number(245_100_000.0));
        assert_eq!(budget.unit, Unit::Aud);
        assert_eq!(budget.provenance, Provenance::Seed);
        assert_eq!(budget.target_id, SEED_TARGET_ID);

        assert_eq!(records[1].natural_key, "overrepresentation_factor");
        assert_eq!(records[1].unit, Unit::Times);
    }

    #[test]
    fn test_rejects_unknown_fact() {
        let err = parse_seed(
            r#"
[[record]]
destination = "x"
fact = "crime_rate"
value = 1
"#,
        )
        .unwrap_err();
        assert!(matches!(err, SeedError::Parse(_)));
    }

    #[test]
    fn test_rejects_text_for_numeric_fact() {
        let err = parse_seed(
            r#"
[[record]]
destination = "x"
fact = "supervision_rate"
value = "high"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, SeedError::Invalid { index: 1, .. }));
    }

    #[test]
    fn test_missing_file() {
        let err = load_seed_file(Path::new("/nonexistent/seed.toml")).unwrap_err();
        assert!(matches!(err, SeedError::Io { .. }));
    }
}
