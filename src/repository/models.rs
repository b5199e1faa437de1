//! Diesel row types and their conversions to domain models.

use diesel::prelude::*;

use super::util::{invalid_column, parse_datetime, parse_datetime_opt};
use crate::models::{
    FactType, FactValue, HealthState, HealthStatus, Provenance, StoredRecord, Unit,
};
use crate::schema;

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = schema::stored_records)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct StoredRecordRow {
    pub destination: String,
    pub natural_key: String,
    pub fact_type: String,
    pub subject: Option<String>,
    pub category: Option<String>,
    pub period: Option<String>,
    pub value_number: Option<f64>,
    pub value_text: Option<String>,
    pub unit: String,
    pub target_id: String,
    pub priority: i32,
    pub source_url: String,
    pub document_name: Option<String>,
    pub provenance: String,
    pub extracted_at: String,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&StoredRecord> for StoredRecordRow {
    fn from(record: &StoredRecord) -> Self {
        let (value_number, value_text) = match &record.value {
            FactValue::Number(n) => (Some(*n), None),
            FactValue::Text(s) => (None, Some(s.clone())),
        };
        Self {
            destination: record.destination.clone(),
            natural_key: record.natural_key.clone(),
            fact_type: record.fact_type.as_str().to_string(),
            subject: record.subject.clone(),
            category: record.category.clone(),
            period: record.period.clone(),
            value_number,
            value_text,
            unit: record.unit.as_str().to_string(),
            target_id: record.target_id.clone(),
            priority: record.priority,
            source_url: record.source_url.clone(),
            document_name: record.document_name.clone(),
            provenance: record.provenance.as_str().to_string(),
            extracted_at: record.extracted_at.to_rfc3339(),
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
        }
    }
}

impl TryFrom<StoredRecordRow> for StoredRecord {
    type Error = diesel::result::Error;

    fn try_from(row: StoredRecordRow) -> Result<Self, Self::Error> {
        let value = match (row.value_number, row.value_text) {
            (Some(n), _) => FactValue::Number(n),
            (None, Some(s)) => FactValue::Text(s),
            (None, None) => return Err(invalid_column("value", "NULL")),
        };

        Ok(StoredRecord {
            fact_type: FactType::from_str(&row.fact_type)
                .ok_or_else(|| invalid_column("fact_type", &row.fact_type))?,
            unit: Unit::from_str(&row.unit).ok_or_else(|| invalid_column("unit", &row.unit))?,
            provenance: Provenance::from_str(&row.provenance)
                .ok_or_else(|| invalid_column("provenance", &row.provenance))?,
            destination: row.destination,
            natural_key: row.natural_key,
            subject: row.subject,
            category: row.category,
            period: row.period,
            value,
            target_id: row.target_id,
            priority: row.priority,
            source_url: row.source_url,
            document_name: row.document_name,
            extracted_at: parse_datetime(&row.extracted_at),
            created_at: parse_datetime(&row.created_at),
            updated_at: parse_datetime(&row.updated_at),
        })
    }
}

#[derive(Queryable, Selectable, Insertable, Debug, Clone)]
#[diesel(table_name = schema::target_health)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct HealthRow {
    pub target_id: String,
    pub state: String,
    pub consecutive_failures: i32,
    pub last_run_at: Option<String>,
    pub last_success_at: Option<String>,
    pub last_error: Option<String>,
    pub last_error_at: Option<String>,
    pub run_started_at: Option<String>,
    pub disabled_reason: Option<String>,
    pub stats: String,
    pub host: Option<String>,
    pub version: Option<String>,
    pub updated_at: String,
}

impl From<&HealthStatus> for HealthRow {
    fn from(status: &HealthStatus) -> Self {
        Self {
            target_id: status.target_id.clone(),
            state: status.state.as_str().to_string(),
            consecutive_failures: i32::try_from(status.consecutive_failures).unwrap_or(i32::MAX),
            last_run_at: status.last_run_at.map(|dt| dt.to_rfc3339()),
            last_success_at: status.last_success_at.map(|dt| dt.to_rfc3339()),
            last_error: status.last_error.clone(),
            last_error_at: status.last_error_at.map(|dt| dt.to_rfc3339()),
            run_started_at: status.run_started_at.map(|dt| dt.to_rfc3339()),
            disabled_reason: status.disabled_reason.clone(),
            stats: serde_json::to_string(&status.stats).unwrap_or_else(|_| "{}".to_string()),
            host: status.host.clone(),
            version: status.version.clone(),
            updated_at: status.updated_at.to_rfc3339(),
        }
    }
}

impl TryFrom<HealthRow> for HealthStatus {
    type Error = diesel::result::Error;

    fn try_from(row: HealthRow) -> Result<Self, Self::Error> {
        let stats = serde_json::from_str(&row.stats)
            .map_err(|e| diesel::result::Error::DeserializationError(Box::new(e)))?;

        Ok(HealthStatus {
            state: HealthState::from_str(&row.state)
                .ok_or_else(|| invalid_column("health state", &row.state))?,
            target_id: row.target_id,
            consecutive_failures: u32::try_from(row.consecutive_failures).unwrap_or(0),
            last_run_at: parse_datetime_opt(row.last_run_at),
            last_success_at: parse_datetime_opt(row.last_success_at),
            last_error: row.last_error,
            last_error_at: parse_datetime_opt(row.last_error_at),
            run_started_at: parse_datetime_opt(row.run_started_at),
            disabled_reason: row.disabled_reason,
            stats,
            host: row.host,
            version: row.version,
            updated_at: parse_datetime(&row.updated_at),
        })
    }
}
