//! Command implementations and the helpers they share.

pub mod extract;
pub mod init;
pub mod records;
pub mod run;
pub mod status;

use std::sync::Arc;

use anyhow::Context;

use yjtracker::config::{load_targets, Settings};
use yjtracker::models::Target;
use yjtracker::repository::DbContext;
use yjtracker::store::{BoxedStore, DieselStore};

/// Open the store and make sure its tables exist.
pub async fn open_store(settings: &Settings) -> anyhow::Result<BoxedStore> {
    let url = settings.require_database_url()?;
    let ctx = DbContext::from_url(url)?;
    ctx.init_schema()
        .await
        .with_context(|| format!("failed to initialise database {}", url))?;
    Ok(Arc::new(DieselStore::new(&ctx)))
}

pub fn targets(settings: &Settings) -> anyhow::Result<Vec<Target>> {
    Ok(load_targets(&settings.targets_path)?)
}

/// Fail unless `target_id` is configured.
pub fn find_target(settings: &Settings, target_id: &str) -> anyhow::Result<Target> {
    targets(settings)?
        .into_iter()
        .find(|t| t.id == target_id)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "unknown target '{}' (not in {})",
                target_id,
                settings.targets_path.display()
            )
        })
}

/// Truncate to at most `max` characters.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
        out.push('…');
        out
    }
}

pub fn format_time(dt: Option<chrono::DateTime<chrono::Utc>>) -> String {
    dt.map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "Never".to_string())
}
