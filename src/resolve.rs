//! Pick one authoritative value when several stored records describe the
//! same fact.
//!
//! Ordering: live before seed, then higher target priority, then the most
//! recent extraction.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::models::{FactType, Provenance, RecordQuery, StoredRecord};
use crate::store::{Store, StoreResult};

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub fact_type: FactType,
    pub subject: Option<String>,
    pub winner: StoredRecord,
    /// Every other candidate, best first.
    pub alternatives: Vec<StoredRecord>,
    /// True when some alternative carries a different value.
    pub conflict: bool,
}

fn provenance_rank(p: Provenance) -> u8 {
    match p {
        Provenance::Live => 1,
        Provenance::Seed => 0,
    }
}

/// `Less` means `a` is the better candidate.
pub fn compare(a: &StoredRecord, b: &StoredRecord) -> Ordering {
    provenance_rank(b.provenance)
        .cmp(&provenance_rank(a.provenance))
        .then_with(|| b.priority.cmp(&a.priority))
        .then_with(|| b.extracted_at.cmp(&a.extracted_at))
}

/// Rank candidates already narrowed to one fact and subject.
pub fn resolve(mut candidates: Vec<StoredRecord>) -> Option<Resolution> {
    if candidates.is_empty() {
        return None;
    }
    candidates.sort_by(compare);
    let winner = candidates.remove(0);
    let conflict = candidates.iter().any(|r| r.value != winner.value);
    Some(Resolution {
        fact_type: winner.fact_type,
        subject: winner.subject.clone(),
        winner,
        alternatives: candidates,
        conflict,
    })
}

/// Resolve every subject of a fact type separately.
pub fn resolve_by_subject(records: Vec<StoredRecord>) -> Vec<Resolution> {
    let mut groups: BTreeMap<(FactType, Option<String>), Vec<StoredRecord>> = BTreeMap::new();
    for record in records {
        groups
            .entry((record.fact_type, record.subject.clone()))
            .or_default()
            .push(record);
    }
    groups.into_values().filter_map(resolve).collect()
}

/// Load candidates from the store and resolve them.
///
/// `subject` of `None` selects records without a subject. `period` narrows
/// the candidates; without it every period competes.
pub async fn resolve_fact(
    store: &dyn Store,
    fact_type: FactType,
    subject: Option<&str>,
    period: Option<&str>,
) -> StoreResult<Option<Resolution>> {
    let query = RecordQuery {
        fact_type: Some(fact_type),
        period: period.map(|p| p.to_string()),
        subject: subject.map(|s| s.to_string()),
        ..Default::default()
    };
    let candidates: Vec<StoredRecord> = store
        .list_records(&query)
        .await?
        .into_iter()
        .filter(|r| r.subject.as_deref() == subject)
        .collect();
    Ok(resolve(candidates))
}
