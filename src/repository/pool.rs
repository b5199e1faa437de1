//! SQLite connection pool.
//!
//! Connections are opened on demand. Each one gets a busy timeout so the
//! seed command and a cron-driven run can share the file.

use std::path::Path;

use diesel::sqlite::SqliteConnection;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::{AsyncConnection, SimpleAsyncConnection};

use super::util::{is_postgres_url, to_diesel_error};

/// Diesel error type alias.
pub type DbError = diesel::result::Error;

/// Async SQLite connection type.
pub type SqliteConn = SyncConnectionWrapper<SqliteConnection>;

#[derive(Debug, Clone)]
pub struct SqlitePool {
    database_url: String,
}

impl SqlitePool {
    pub fn new(database_url: &str) -> Self {
        let url = database_url.strip_prefix("sqlite:").unwrap_or(database_url);
        let url = url.strip_prefix("//").unwrap_or(url);
        Self {
            database_url: url.to_string(),
        }
    }

    pub fn from_path(path: &Path) -> Self {
        Self::new(&path.display().to_string())
    }

    pub async fn get(&self) -> Result<SqliteConn, DbError> {
        let mut conn = SqliteConn::establish(&self.database_url)
            .await
            .map_err(to_diesel_error)?;
        conn.batch_execute("PRAGMA busy_timeout = 5000;").await?;
        Ok(conn)
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }
}

/// Database pool. SQLite is the only backend compiled in; the hosted
/// database is reached through the `Store` trait instead.
#[derive(Debug, Clone)]
pub enum DbPool {
    Sqlite(SqlitePool),
}

impl DbPool {
    /// Create a pool from a database URL (`sqlite:` URL or plain path).
    pub fn from_url(url: &str) -> Result<Self, DbError> {
        if is_postgres_url(url) {
            return Err(to_diesel_error(
                "PostgreSQL URLs are not supported; use a SQLite path or sqlite: URL",
            ));
        }
        Ok(DbPool::Sqlite(SqlitePool::new(url)))
    }

    pub fn sqlite_from_path(path: &Path) -> Self {
        DbPool::Sqlite(SqlitePool::from_path(path))
    }

    pub fn is_sqlite(&self) -> bool {
        matches!(self, DbPool::Sqlite(_))
    }
}

/// Run a block with a connection from the pool.
///
/// # Example
/// ```ignore
/// with_conn!(self.pool, conn => {
///     stored_records::table.load::<StoredRecordRow>(&mut conn).await
/// })
/// ```
#[macro_export]
macro_rules! with_conn {
    ($pool:expr, $conn:ident => $body:expr) => {{
        match &$pool {
            $crate::repository::pool::DbPool::Sqlite(pool) => {
                let mut $conn = pool.get().await?;
                $body
            }
        }
    }};
}
