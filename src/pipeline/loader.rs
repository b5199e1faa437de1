//! Writes extracted facts to the store.

use thiserror::Error;
use tracing::{debug, error};

use crate::models::{ExtractedFact, StoredRecord, Target, UpsertOutcome};
use crate::store::{BoxedStore, StoreError};

/// Counts of what a load did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
    pub skipped: u64,
}

impl LoadReport {
    fn record(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
            UpsertOutcome::Unchanged => self.unchanged += 1,
            UpsertOutcome::Skipped => self.skipped += 1,
        }
    }

    pub fn written(&self) -> u64 {
        self.inserted + self.updated
    }
}

#[derive(Debug, Error)]
#[error("failed to store {natural_key} in {destination}: {source}")]
pub struct LoadError {
    pub destination: String,
    pub natural_key: String,
    /// What was written before the failure.
    pub partial: LoadReport,
    #[source]
    pub source: StoreError,
}

#[derive(Clone)]
pub struct Loader {
    store: BoxedStore,
}

impl Loader {
    pub fn new(store: BoxedStore) -> Self {
        Self { store }
    }

    /// Shape a target's facts into complete records, one per natural key.
    pub fn records_for(
        target: &Target,
        facts: &[ExtractedFact],
        document_name: Option<&str>,
    ) -> Vec<StoredRecord> {
        let mut records: Vec<StoredRecord> = Vec::with_capacity(facts.len());
        for fact in facts {
            let record = StoredRecord::from_fact(target, fact, document_name);
            if records.iter().any(|r| r.natural_key == record.natural_key) {
                debug!(
                    "{}: dropping duplicate fact for {}",
                    target.id, record.natural_key
                );
                continue;
            }
            records.push(record);
        }
        records
    }

    /// Upsert every record. Stops at the first storage error.
    pub async fn load(&self, records: &[StoredRecord]) -> Result<LoadReport, LoadError> {
        let mut report = LoadReport::default();
        for record in records {
            match self.store.upsert_record(record).await {
                Ok(outcome) => {
                    debug!(
                        "{}/{}: {:?}",
                        record.destination, record.natural_key, outcome
                    );
                    report.record(outcome);
                }
                Err(source) => {
                    error!(
                        "Failed to store {} in {}: {}",
                        record.natural_key, record.destination, source
                    );
                    return Err(LoadError {
                        destination: record.destination.clone(),
                        natural_key: record.natural_key.clone(),
                        partial: report,
                        source,
                    });
                }
            }
        }
        Ok(report)
    }
}
