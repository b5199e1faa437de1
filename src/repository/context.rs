//! Database context for managing connections and repository access.

use std::path::Path;

use diesel_async::SimpleAsyncConnection;

use super::health::DieselHealthRepository;
use super::pool::{DbError, DbPool, SqliteConn};
use super::records::DieselRecordRepository;
use crate::with_conn;

/// Holds the pool and hands out repositories.
///
/// # Example
/// ```ignore
/// let ctx = DbContext::from_url("sqlite:yjt.db")?;
/// ctx.init_schema().await?;
/// let records = ctx.records().list(&RecordQuery::default()).await?;
/// ```
#[derive(Debug, Clone)]
pub struct DbContext {
    pool: DbPool,
}

impl DbContext {
    /// Create a context from a database file path.
    pub fn new(db_path: &Path) -> Self {
        Self {
            pool: DbPool::sqlite_from_path(db_path),
        }
    }

    pub fn from_url(url: &str) -> Result<Self, DbError> {
        Ok(Self {
            pool: DbPool::from_url(url)?,
        })
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn records(&self) -> DieselRecordRepository {
        DieselRecordRepository::new(self.pool.clone())
    }

    pub fn health(&self) -> DieselHealthRepository {
        DieselHealthRepository::new(self.pool.clone())
    }

    /// Create the tables if they don't exist. Safe to run repeatedly.
    pub async fn init_schema(&self) -> Result<(), DbError> {
        with_conn!(self.pool, conn => {
            Self::init_sqlite_schema(&mut conn).await
        })
    }

    async fn init_sqlite_schema(conn: &mut SqliteConn) -> Result<(), DbError> {
        conn.batch_execute(
            r#"
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS stored_records (
                destination TEXT NOT NULL,
                natural_key TEXT NOT NULL,
                fact_type TEXT NOT NULL,
                subject TEXT,
                category TEXT,
                period TEXT,
                value_number REAL,
                value_text TEXT,
                unit TEXT NOT NULL,
                target_id TEXT NOT NULL,
                priority INTEGER NOT NULL DEFAULT 0,
                source_url TEXT NOT NULL,
                document_name TEXT,
                provenance TEXT NOT NULL DEFAULT 'live',
                extracted_at TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (destination, natural_key)
            );

            CREATE TABLE IF NOT EXISTS target_health (
                target_id TEXT PRIMARY KEY,
                state TEXT NOT NULL DEFAULT 'unknown',
                consecutive_failures INTEGER NOT NULL DEFAULT 0,
                last_run_at TEXT,
                last_success_at TEXT,
                last_error TEXT,
                last_error_at TEXT,
                run_started_at TEXT,
                disabled_reason TEXT,
                stats TEXT NOT NULL DEFAULT '{}',
                host TEXT,
                version TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_stored_records_fact ON stored_records(fact_type, subject);
            CREATE INDEX IF NOT EXISTS idx_stored_records_target ON stored_records(target_id);
            "#,
        )
        .await
    }

    /// Names of the tables in the database.
    pub async fn list_tables(&self) -> Result<Vec<String>, DbError> {
        with_conn!(self.pool, conn => {
            let rows: Vec<TableName> = diesel_async::RunQueryDsl::load(
                diesel::sql_query(
                    "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
                ),
                &mut conn,
            )
            .await?;
            Ok(rows.into_iter().map(|r| r.name).collect())
        })
    }
}

#[derive(diesel::QueryableByName)]
struct TableName {
    #[diesel(sql_type = diesel::sql_types::Text)]
    name: String,
}
