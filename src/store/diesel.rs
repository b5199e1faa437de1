use async_trait::async_trait;

use super::{Store, StoreResult};
use crate::models::{HealthStatus, RecordQuery, StoredRecord, UpsertOutcome};
use crate::repository::{DbContext, DieselHealthRepository, DieselRecordRepository};

/// SQLite-backed store.
#[derive(Debug, Clone)]
pub struct DieselStore {
    records: DieselRecordRepository,
    health: DieselHealthRepository,
}

impl DieselStore {
    pub fn new(ctx: &DbContext) -> Self {
        Self {
            records: ctx.records(),
            health: ctx.health(),
        }
    }
}

#[async_trait]
impl Store for DieselStore {
    async fn upsert_record(&self, record: &StoredRecord) -> StoreResult<UpsertOutcome> {
        Ok(self.records.upsert(record).await?)
    }

    async fn get_record(
        &self,
        destination: &str,
        natural_key: &str,
    ) -> StoreResult<Option<StoredRecord>> {
        Ok(self.records.get(destination, natural_key).await?)
    }

    async fn list_records(&self, query: &RecordQuery) -> StoreResult<Vec<StoredRecord>> {
        Ok(self.records.list(query).await?)
    }

    async fn count_records(&self, destination: Option<&str>) -> StoreResult<u64> {
        Ok(self.records.count(destination).await?)
    }

    async fn get_health(&self, target_id: &str) -> StoreResult<Option<HealthStatus>> {
        Ok(self.health.get(target_id).await?)
    }

    async fn put_health(&self, status: &HealthStatus) -> StoreResult<()> {
        Ok(self.health.upsert(status).await?)
    }

    async fn list_health(&self) -> StoreResult<Vec<HealthStatus>> {
        Ok(self.health.get_all().await?)
    }
}
