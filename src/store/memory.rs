//! In-process store. Not persisted across restarts.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{Store, StoreResult};
use crate::models::{plan_upsert, HealthStatus, RecordQuery, StoredRecord, UpsertOutcome};

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    records: Arc<RwLock<BTreeMap<(String, String), StoredRecord>>>,
    health: Arc<RwLock<BTreeMap<String, HealthStatus>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_record(&self, record: &StoredRecord) -> StoreResult<UpsertOutcome> {
        let key = (record.destination.clone(), record.natural_key.clone());
        let mut records = self.records.write().await;
        let existing = records.get(&key);
        let outcome = plan_upsert(existing, record);
        let now = Utc::now();

        match outcome {
            UpsertOutcome::Skipped => {}
            UpsertOutcome::Unchanged => {
                if let Some(current) = records.get_mut(&key) {
                    current.extracted_at = record.extracted_at;
                }
            }
            UpsertOutcome::Inserted | UpsertOutcome::Updated => {
                let mut incoming = record.clone();
                incoming.created_at = existing.map(|r| r.created_at).unwrap_or(now);
                incoming.updated_at = now;
                records.insert(key, incoming);
            }
        }
        Ok(outcome)
    }

    async fn get_record(
        &self,
        destination: &str,
        natural_key: &str,
    ) -> StoreResult<Option<StoredRecord>> {
        let records = self.records.read().await;
        Ok(records
            .get(&(destination.to_string(), natural_key.to_string()))
            .cloned())
    }

    async fn list_records(&self, query: &RecordQuery) -> StoreResult<Vec<StoredRecord>> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect())
    }

    async fn count_records(&self, destination: Option<&str>) -> StoreResult<u64> {
        let records = self.records.read().await;
        Ok(records
            .keys()
            .filter(|(d, _)| destination.is_none_or(|want| want == d.as_str()))
            .count() as u64)
    }

    async fn get_health(&self, target_id: &str) -> StoreResult<Option<HealthStatus>> {
        Ok(self.health.read().await.get(target_id).cloned())
    }

    async fn put_health(&self, status: &HealthStatus) -> StoreResult<()> {
        self.health
            .write()
            .await
            .insert(status.target_id.clone(), status.clone());
        Ok(())
    }

    async fn list_health(&self) -> StoreResult<Vec<HealthStatus>> {
        Ok(self.health.read().await.values().cloned().collect())
    }
}
