//! Domain models for the collection pipeline.

mod document;
mod fact;
mod health;
mod record;
mod target;

pub use document::{DocumentMetadata, RawDocument};
pub use fact::{ExtractedFact, Extraction, ExtractionOutcome, ExtractionWarning, FactValue};
pub use health::{HealthState, HealthStatus, RunStats};
pub use record::{
    natural_key, plan_upsert, slugify, Provenance, RecordQuery, StoredRecord, UpsertOutcome,
};
pub use target::{
    CircuitPolicy, ContentKind, FactType, RateLimitPolicy, RenderOptions, RetryPolicy, Target,
    Unit, ValueKind,
};
