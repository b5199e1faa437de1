//! Persistence seam for records and health.
//!
//! The pipeline only talks to [`Store`]. [`DieselStore`] writes to SQLite;
//! [`MemoryStore`] keeps everything in process for tests and dry runs.

mod diesel;
mod memory;

pub use self::diesel::DieselStore;
pub use memory::MemoryStore;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{HealthStatus, RecordQuery, StoredRecord, UpsertOutcome};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] ::diesel::result::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    /// Insert or replace by `(destination, natural_key)`.
    async fn upsert_record(&self, record: &StoredRecord) -> StoreResult<UpsertOutcome>;

    async fn get_record(
        &self,
        destination: &str,
        natural_key: &str,
    ) -> StoreResult<Option<StoredRecord>>;

    async fn list_records(&self, query: &RecordQuery) -> StoreResult<Vec<StoredRecord>>;

    async fn count_records(&self, destination: Option<&str>) -> StoreResult<u64>;

    async fn get_health(&self, target_id: &str) -> StoreResult<Option<HealthStatus>>;

    /// Overwrite a target's health row.
    async fn put_health(&self, status: &HealthStatus) -> StoreResult<()>;

    async fn list_health(&self) -> StoreResult<Vec<HealthStatus>>;
}

pub type BoxedStore = Arc<dyn Store>;
