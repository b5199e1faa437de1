//! Diesel-based stored record repository.

use chrono::Utc;
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::models::StoredRecordRow;
use super::pool::{DbError, DbPool};
use crate::models::{plan_upsert, RecordQuery, StoredRecord, UpsertOutcome};
use crate::schema::stored_records;
use crate::with_conn;

#[derive(Debug, Clone)]
pub struct DieselRecordRepository {
    pool: DbPool,
}

impl DieselRecordRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(
        &self,
        destination: &str,
        natural_key: &str,
    ) -> Result<Option<StoredRecord>, DbError> {
        with_conn!(self.pool, conn => {
            stored_records::table
                .find((destination, natural_key))
                .select(StoredRecordRow::as_select())
                .first::<StoredRecordRow>(&mut conn)
                .await
                .optional()
                .and_then(|opt| opt.map(StoredRecord::try_from).transpose())
        })
    }

    /// Insert or replace the record at its natural key.
    ///
    /// Read, decide and write happen in one transaction so concurrent
    /// writers to the same key serialize on the SQLite write lock.
    pub async fn upsert(&self, record: &StoredRecord) -> Result<UpsertOutcome, DbError> {
        let incoming = record.clone();

        with_conn!(self.pool, conn => {
            conn.transaction(|conn| {
                let mut incoming = incoming.clone();
                Box::pin(async move {
                    let existing: Option<StoredRecordRow> = stored_records::table
                        .find((&incoming.destination, &incoming.natural_key))
                        .select(StoredRecordRow::as_select())
                        .first(conn)
                        .await
                        .optional()?;
                    let existing = existing.map(StoredRecord::try_from).transpose()?;

                    let outcome = plan_upsert(existing.as_ref(), &incoming);
                    let now = Utc::now();
                    match (outcome, existing) {
                        (UpsertOutcome::Skipped, _) => return Ok(outcome),
                        (UpsertOutcome::Unchanged, Some(current)) => {
                            diesel::update(
                                stored_records::table
                                    .find((&current.destination, &current.natural_key)),
                            )
                            .set(
                                stored_records::extracted_at
                                    .eq(incoming.extracted_at.to_rfc3339()),
                            )
                            .execute(conn)
                            .await?;
                            return Ok(outcome);
                        }
                        (_, Some(current)) => {
                            incoming.created_at = current.created_at;
                            incoming.updated_at = now;
                        }
                        (_, None) => {
                            incoming.created_at = now;
                            incoming.updated_at = now;
                        }
                    }

                    diesel::replace_into(stored_records::table)
                        .values(StoredRecordRow::from(&incoming))
                        .execute(conn)
                        .await?;
                    Ok(outcome)
                })
            })
            .await
        })
    }

    pub async fn list(&self, query: &RecordQuery) -> Result<Vec<StoredRecord>, DbError> {
        let query = query.clone();
        with_conn!(self.pool, conn => {
            let mut q = stored_records::table
                .select(StoredRecordRow::as_select())
                .order((
                    stored_records::destination.asc(),
                    stored_records::natural_key.asc(),
                ))
                .into_boxed();

            if let Some(destination) = &query.destination {
                q = q.filter(stored_records::destination.eq(destination.clone()));
            }
            if let Some(fact) = query.fact_type {
                q = q.filter(stored_records::fact_type.eq(fact.as_str()));
            }
            if let Some(period) = &query.period {
                q = q.filter(stored_records::period.eq(period.clone()));
            }
            if let Some(subject) = &query.subject {
                q = q.filter(stored_records::subject.eq(subject.clone()));
            }

            q.load::<StoredRecordRow>(&mut conn)
                .await
                .and_then(|rows| rows.into_iter().map(StoredRecord::try_from).collect())
        })
    }

    pub async fn count(&self, destination: Option<&str>) -> Result<u64, DbError> {
        with_conn!(self.pool, conn => {
            let count: i64 = match destination {
                Some(d) => {
                    stored_records::table
                        .filter(stored_records::destination.eq(d))
                        .count()
                        .get_result(&mut conn)
                        .await?
                }
                None => stored_records::table.count().get_result(&mut conn).await?,
            };
            Ok(count.max(0) as u64)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExtractedFact, FactType, FactValue, Provenance, Target, Unit};
    use crate::repository::DbContext;
    use tempfile::tempdir;

    async fn setup_test_db() -> (DbContext, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();
        (ctx, dir)
    }

    fn record(value: f64) -> StoredRecord {
        let mut target = Target::new("pocket-stats", "https://example.gov.au/", "youth_statistics");
        target.period = Some("2024-25".into());
        let fact = ExtractedFact::new(
            "pocket-stats",
            FactType::SupervisionRate,
            FactValue::Number(value),
            Unit::Per10000,
        );
        StoredRecord::from_fact(&target, &fact, Some("Pocket Stats"))
    }

    #[tokio::test]
    async fn test_insert_then_get() {
        let (ctx, _dir) = setup_test_db().await;
        let repo = ctx.records();

        let rec = record(175.0);
        assert_eq!(repo.upsert(&rec).await.unwrap(), UpsertOutcome::Inserted);

        let stored = repo
            .get("youth_statistics", "2024-25:supervision_rate")
            .await
            .unwrap()
            .unwrap();
        assert!(stored.same_values(&rec));
        assert_eq!(stored.document_name.as_deref(), Some("Pocket Stats"));
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let (ctx, _dir) = setup_test_db().await;
        let repo = ctx.records();

        repo.upsert(&record(175.0)).await.unwrap();
        assert_eq!(
            repo.upsert(&record(175.0)).await.unwrap(),
            UpsertOutcome::Unchanged
        );
        assert_eq!(repo.count(None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_last_write_wins() {
        let (ctx, _dir) = setup_test_db().await;
        let repo = ctx.records();

        repo.upsert(&record(175.0)).await.unwrap();
        let first = repo
            .get("youth_statistics", "2024-25:supervision_rate")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(
            repo.upsert(&record(180.0)).await.unwrap(),
            UpsertOutcome::Updated
        );
        let second = repo
            .get("youth_statistics", "2024-25:supervision_rate")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(second.value, FactValue::Number(180.0));
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(repo.count(Some("youth_statistics")).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_seed_never_replaces_live() {
        let (ctx, _dir) = setup_test_db().await;
        let repo = ctx.records();

        repo.upsert(&record(175.0)).await.unwrap();
        let mut seed = record(999.0);
        seed.provenance = Provenance::Seed;
        assert_eq!(repo.upsert(&seed).await.unwrap(), UpsertOutcome::Skipped);

        let stored = repo
            .get("youth_statistics", "2024-25:supervision_rate")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.value, FactValue::Number(175.0));
        assert_eq!(stored.provenance, Provenance::Live);
    }

    #[tokio::test]
    async fn test_list_filters() {
        let (ctx, _dir) = setup_test_db().await;
        let repo = ctx.records();

        repo.upsert(&record(175.0)).await.unwrap();
        let mut other = record(20.0);
        other.fact_type = FactType::OverrepresentationFactor;
        other.unit = Unit::Times;
        other.natural_key = "2024-25:overrepresentation_factor".into();
        repo.upsert(&other).await.unwrap();

        assert_eq!(repo.list(&RecordQuery::default()).await.unwrap().len(), 2);
        let rates = repo
            .list(&RecordQuery::fact(FactType::SupervisionRate))
            .await
            .unwrap();
        assert_eq!(rates.len(), 1);
        assert_eq!(rates[0].value, FactValue::Number(175.0));
    }
}
