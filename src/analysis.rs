//! Detention vs community budget split for one reporting period.

use serde::Serialize;

use crate::extract::classify::categorize;
use crate::models::{FactType, RecordQuery, StoredRecord};
use crate::resolve::resolve_by_subject;
use crate::store::{Store, StoreResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BudgetBreakdown {
    pub period: String,
    pub detention_total: f64,
    pub community_total: f64,
    /// Detention plus community.
    pub total: f64,
    pub detention_percentage: f64,
    pub community_percentage: f64,
    pub allocation_count: usize,
}

fn category_of(record: &StoredRecord) -> &str {
    match record.category.as_deref() {
        Some(category) => category,
        None => categorize(record.subject.as_deref().unwrap_or_default()),
    }
}

/// Sum allocations by category. Percentages are 0 when there is no total.
pub fn breakdown(period: &str, allocations: &[StoredRecord]) -> BudgetBreakdown {
    let mut detention_total = 0.0;
    let mut community_total = 0.0;
    for record in allocations {
        let Some(amount) = record.value.as_f64() else {
            continue;
        };
        match category_of(record) {
            "detention" => detention_total += amount,
            "community" => community_total += amount,
            _ => {}
        }
    }

    let total = detention_total + community_total;
    let (detention_percentage, community_percentage) = if total > 0.0 {
        (
            detention_total / total * 100.0,
            community_total / total * 100.0,
        )
    } else {
        (0.0, 0.0)
    };

    BudgetBreakdown {
        period: period.to_string(),
        detention_total,
        community_total,
        total,
        detention_percentage,
        community_percentage,
        allocation_count: allocations.len(),
    }
}

/// Budget breakdown over the resolved allocations of a period.
///
/// When several sources report the same program, only the resolved value
/// is counted.
pub async fn budget_breakdown(store: &dyn Store, period: &str) -> StoreResult<BudgetBreakdown> {
    let query = RecordQuery {
        fact_type: Some(FactType::BudgetAllocation),
        period: Some(period.to_string()),
        ..Default::default()
    };
    let records = store.list_records(&query).await?;
    let winners: Vec<StoredRecord> = resolve_by_subject(records)
        .into_iter()
        .map(|r| r.winner)
        .collect();
    Ok(breakdown(period, &winners))
}
