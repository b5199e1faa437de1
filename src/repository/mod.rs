//! Repository layer for SQLite persistence.
//!
//! All database access uses Diesel with `SyncConnectionWrapper` so queries
//! run on the async runtime.

pub mod context;
pub mod health;
pub mod models;
pub mod pool;
pub mod records;
pub mod util;

pub use context::DbContext;
pub use health::DieselHealthRepository;
pub use pool::{DbError, DbPool};
pub use records::DieselRecordRepository;
pub use util::{parse_datetime, parse_datetime_opt};
