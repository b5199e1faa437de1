//! Diesel-based target health repository.

use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::HealthRow;
use super::pool::{DbError, DbPool};
use crate::models::HealthStatus;
use crate::schema::target_health;
use crate::with_conn;

#[derive(Debug, Clone)]
pub struct DieselHealthRepository {
    pool: DbPool,
}

impl DieselHealthRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, target_id: &str) -> Result<Option<HealthStatus>, DbError> {
        with_conn!(self.pool, conn => {
            target_health::table
                .find(target_id)
                .select(HealthRow::as_select())
                .first::<HealthRow>(&mut conn)
                .await
                .optional()
                .and_then(|opt| opt.map(HealthStatus::try_from).transpose())
        })
    }

    pub async fn get_all(&self) -> Result<Vec<HealthStatus>, DbError> {
        with_conn!(self.pool, conn => {
            target_health::table
                .select(HealthRow::as_select())
                .order(target_health::target_id.asc())
                .load::<HealthRow>(&mut conn)
                .await
                .and_then(|rows| rows.into_iter().map(HealthStatus::try_from).collect())
        })
    }

    /// Overwrite the target's row.
    pub async fn upsert(&self, status: &HealthStatus) -> Result<(), DbError> {
        let row = HealthRow::from(status);
        with_conn!(self.pool, conn => {
            diesel::replace_into(target_health::table)
                .values(&row)
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }
}
