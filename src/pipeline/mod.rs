//! The collection pipeline: fetch, extract, load, then record health.
//!
//! Each target runs in isolation. A failing target is recorded and the batch
//! moves on; nothing a single target does can abort the run.

mod loader;
mod locks;

pub use loader::{LoadError, LoadReport, Loader};
pub use locks::TargetLocks;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::alerts::{Alert, BoxedAlertSink, LogAlertSink};
use crate::extract::Extractor;
use crate::fetch::{BoxedFetcher, FetchError};
use crate::models::{
    ExtractedFact, ExtractionWarning, HealthStatus, RunStats, Target,
};
use crate::store::{BoxedStore, Store, StoreError};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Targets run concurrently, at most this many at once.
    pub workers: usize,
    /// Watchdog for a single target run.
    pub run_timeout: Duration,
    /// Run targets even when not due.
    pub force: bool,
    /// Fetch and extract only; no record or health writes.
    pub dry_run: bool,
    /// Consecutive failures that raise an alert. Zero disables alerts.
    pub alert_threshold: u32,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            workers: 1,
            run_timeout: Duration::from_secs(300),
            force: false,
            dry_run: false,
            alert_threshold: 3,
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("duplicate target id: {0}")]
    DuplicateTarget(String),
    #[error("unknown target: {0}")]
    UnknownTarget(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Why a single target run failed.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("run exceeded {0:?} timeout")]
    TimedOut(Duration),
    #[error("health lookup failed: {0}")]
    Health(StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// `enabled = false` in the targets file.
    NotConfigured,
    /// Operator disabled the target.
    Disabled,
    NotDue,
    /// Another run of this target is in flight.
    AlreadyRunning,
    /// Too many consecutive failures; waiting out the cooldown.
    CircuitOpen,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotConfigured => "disabled in config",
            Self::Disabled => "disabled",
            Self::NotDue => "not due",
            Self::AlreadyRunning => "already running",
            Self::CircuitOpen => "circuit open",
        }
    }
}

#[derive(Debug)]
pub enum TargetOutcome {
    Succeeded {
        stats: RunStats,
        facts: Vec<ExtractedFact>,
        warnings: Vec<ExtractionWarning>,
    },
    Failed(RunError),
    Skipped(SkipReason),
    Cancelled,
}

#[derive(Debug)]
pub struct TargetReport {
    pub target_id: String,
    pub outcome: TargetOutcome,
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub targets: Vec<TargetReport>,
}

impl RunReport {
    fn count(&self, f: impl Fn(&TargetOutcome) -> bool) -> usize {
        self.targets.iter().filter(|t| f(&t.outcome)).count()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|o| matches!(o, TargetOutcome::Succeeded { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, TargetOutcome::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, TargetOutcome::Skipped(_)))
    }

    pub fn cancelled(&self) -> usize {
        self.count(|o| matches!(o, TargetOutcome::Cancelled))
    }

    pub fn get(&self, target_id: &str) -> Option<&TargetOutcome> {
        self.targets
            .iter()
            .find(|t| t.target_id == target_id)
            .map(|t| &t.outcome)
    }
}

/// Result of a fetch-extract-load pass.
struct TargetRun {
    stats: RunStats,
    facts: Vec<ExtractedFact>,
    warnings: Vec<ExtractionWarning>,
}

pub struct Pipeline {
    targets: Vec<Target>,
    fetcher: BoxedFetcher,
    store: BoxedStore,
    loader: Loader,
    alerts: BoxedAlertSink,
    locks: TargetLocks,
    options: PipelineOptions,
}

impl Pipeline {
    pub fn new(
        targets: Vec<Target>,
        fetcher: BoxedFetcher,
        store: BoxedStore,
    ) -> Result<Self, PipelineError> {
        let mut seen = HashSet::new();
        for target in &targets {
            if !seen.insert(target.id.as_str()) {
                return Err(PipelineError::DuplicateTarget(target.id.clone()));
            }
        }

        Ok(Self {
            targets,
            fetcher,
            loader: Loader::new(store.clone()),
            store,
            alerts: Arc::new(LogAlertSink),
            locks: TargetLocks::new(),
            options: PipelineOptions::default(),
        })
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_alerts(mut self, alerts: BoxedAlertSink) -> Self {
        self.alerts = alerts;
        self
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Run every configured target.
    pub async fn run(&self, cancel: &CancellationToken) -> RunReport {
        let all: Vec<&Target> = self.targets.iter().collect();
        self.run_batch(all, cancel).await
    }

    /// Run only the named targets, in the order given.
    pub async fn run_targets(
        &self,
        ids: &[String],
        cancel: &CancellationToken,
    ) -> Result<RunReport, PipelineError> {
        let mut selected = Vec::with_capacity(ids.len());
        for id in ids {
            let target = self
                .targets
                .iter()
                .find(|t| &t.id == id)
                .ok_or_else(|| PipelineError::UnknownTarget(id.clone()))?;
            selected.push(target);
        }
        Ok(self.run_batch(selected, cancel).await)
    }

    async fn run_batch(&self, targets: Vec<&Target>, cancel: &CancellationToken) -> RunReport {
        if !self.options.dry_run {
            match self.reap_stale().await {
                Ok(0) => {}
                Ok(n) => warn!("Marked {} abandoned run(s) as failed", n),
                Err(e) => warn!("Could not check for abandoned runs: {}", e),
            }
        }

        let workers = self.options.workers.max(1);
        info!(
            "Running {} target(s) with {} worker(s)",
            targets.len(),
            workers
        );

        let mut results: Vec<(usize, TargetReport)> = stream::iter(targets.into_iter().enumerate())
            .map(|(index, target)| async move { (index, self.run_target(target, cancel).await) })
            .buffer_unordered(workers)
            .collect()
            .await;
        results.sort_by_key(|(index, _)| *index);

        let report = RunReport {
            targets: results.into_iter().map(|(_, r)| r).collect(),
        };
        info!(
            "Run complete: {} succeeded, {} failed, {} skipped, {} cancelled",
            report.succeeded(),
            report.failed(),
            report.skipped(),
            report.cancelled()
        );
        report
    }

    /// Force runs left in flight past the watchdog timeout to `error`.
    pub async fn reap_stale(&self) -> Result<usize, StoreError> {
        let now = Utc::now();
        let mut reaped = 0;
        for mut status in self.store.list_health().await? {
            if status.expire_overdue(self.options.run_timeout, now) {
                warn!("{}: run abandoned, marking as failed", status.target_id);
                self.store.put_health(&status).await?;
                reaped += 1;
            }
        }
        Ok(reaped)
    }

    async fn run_target(&self, target: &Target, cancel: &CancellationToken) -> TargetReport {
        let outcome = self.run_target_inner(target, cancel).await;
        match &outcome {
            TargetOutcome::Succeeded { stats, .. } => info!(
                "{}: {} facts, {} malformed, {} inserted, {} updated, {} unchanged",
                target.id,
                stats.facts_found,
                stats.malformed,
                stats.inserted,
                stats.updated,
                stats.unchanged
            ),
            TargetOutcome::Failed(e) => error!("{}: {}", target.id, e),
            TargetOutcome::Skipped(reason) => debug!("{}: skipped ({})", target.id, reason.as_str()),
            TargetOutcome::Cancelled => warn!("{}: cancelled", target.id),
        }
        TargetReport {
            target_id: target.id.clone(),
            outcome,
        }
    }

    async fn run_target_inner(&self, target: &Target, cancel: &CancellationToken) -> TargetOutcome {
        if !target.enabled {
            return TargetOutcome::Skipped(SkipReason::NotConfigured);
        }
        if cancel.is_cancelled() {
            return TargetOutcome::Cancelled;
        }
        let Some(_guard) = self.locks.try_acquire(&target.id) else {
            return TargetOutcome::Skipped(SkipReason::AlreadyRunning);
        };

        let now = Utc::now();
        let mut health = match self.store.get_health(&target.id).await {
            Ok(Some(h)) => h,
            Ok(None) => HealthStatus::new(&target.id),
            Err(e) => return TargetOutcome::Failed(RunError::Health(e)),
        };

        if !health.can_run() {
            return TargetOutcome::Skipped(SkipReason::Disabled);
        }
        if health.is_running() && !health.is_overdue(self.options.run_timeout, now) {
            return TargetOutcome::Skipped(SkipReason::AlreadyRunning);
        }
        if let Some(until) = health.circuit_open_until(&target.circuit) {
            if now < until {
                info!(
                    "{}: circuit open after {} consecutive failures, next trial at {}",
                    target.id,
                    health.consecutive_failures,
                    until.format("%Y-%m-%d %H:%M:%S UTC")
                );
                return TargetOutcome::Skipped(SkipReason::CircuitOpen);
            }
        }
        if !self.options.force && !target.is_due(health.last_run_at, now) {
            return TargetOutcome::Skipped(SkipReason::NotDue);
        }

        if self.options.dry_run {
            return match self.guarded_execute(target, cancel).await {
                None => TargetOutcome::Cancelled,
                Some(Ok(run)) => TargetOutcome::Succeeded {
                    stats: run.stats,
                    facts: run.facts,
                    warnings: run.warnings,
                },
                Some(Err(e)) => TargetOutcome::Failed(e),
            };
        }

        health.begin_run(now);
        self.save_health(&health).await;

        let result = self.guarded_execute(target, cancel).await;

        let finished = Utc::now();
        let outcome = match result {
            None => {
                health.abort_run(finished);
                TargetOutcome::Cancelled
            }
            Some(Ok(run)) => {
                health.record_success(run.stats.clone(), finished);
                TargetOutcome::Succeeded {
                    stats: run.stats,
                    facts: run.facts,
                    warnings: run.warnings,
                }
            }
            Some(Err(e)) => {
                health.record_failure(&e.to_string(), finished);
                TargetOutcome::Failed(e)
            }
        };
        self.save_health(&health).await;

        if health.needs_alert(self.options.alert_threshold) {
            let alert = Alert::new(target, &health, self.options.alert_threshold);
            if let Err(e) = self.alerts.send(&alert).await {
                warn!("{}: alert delivery failed: {}", target.id, e);
            }
        }

        outcome
    }

    /// `execute` under the watchdog. `None` when cancelled.
    async fn guarded_execute(
        &self,
        target: &Target,
        cancel: &CancellationToken,
    ) -> Option<Result<TargetRun, RunError>> {
        let timeout = self.options.run_timeout;
        tokio::select! {
            _ = cancel.cancelled() => None,
            r = tokio::time::timeout(timeout, self.execute(target)) => {
                Some(r.unwrap_or_else(|_| Err(RunError::TimedOut(timeout))))
            }
        }
    }

    async fn save_health(&self, health: &HealthStatus) {
        if let Err(e) = self.store.put_health(health).await {
            error!("{}: failed to write health: {}", health.target_id, e);
        }
    }

    async fn execute(&self, target: &Target) -> Result<TargetRun, RunError> {
        let doc = self.fetcher.fetch(target).await?;
        let extraction = Extractor::new(&target.schema).extract(&doc);

        if extraction.facts.is_empty() {
            warn!("{}: no facts found in {}", target.id, target.url);
        }
        if !extraction.missing.is_empty() {
            debug!(
                "{}: not present: {}",
                target.id,
                extraction
                    .missing
                    .iter()
                    .map(|f| f.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        let mut stats = RunStats {
            facts_found: extraction.facts.len() as u64,
            malformed: extraction.warnings.len() as u64,
            ..Default::default()
        };

        if !self.options.dry_run {
            let document_name = doc.document_name();
            let records = Loader::records_for(target, &extraction.facts, Some(&document_name));
            let load = self.loader.load(&records).await?;
            stats.inserted = load.inserted;
            stats.updated = load.updated;
            stats.unchanged = load.unchanged;
        }

        Ok(TargetRun {
            stats,
            facts: extraction.facts,
            warnings: extraction.warnings,
        })
    }
}

/// Operator action: stop a target from running until re-enabled.
pub async fn disable_target(
    store: &dyn Store,
    target_id: &str,
    reason: Option<&str>,
) -> Result<HealthStatus, StoreError> {
    let mut health = store
        .get_health(target_id)
        .await?
        .unwrap_or_else(|| HealthStatus::new(target_id));
    health.disable(reason, Utc::now());
    store.put_health(&health).await?;
    info!("{}: disabled", target_id);
    Ok(health)
}

/// Operator action: return a disabled target to `unknown`.
pub async fn enable_target(store: &dyn Store, target_id: &str) -> Result<HealthStatus, StoreError> {
    let mut health = store
        .get_health(target_id)
        .await?
        .unwrap_or_else(|| HealthStatus::new(target_id));
    health.enable(Utc::now());
    store.put_health(&health).await?;
    info!("{}: enabled", target_id);
    Ok(health)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::Fetcher;
    use crate::models::{ContentKind, HealthState, RawDocument};
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    const SAMPLE: &str = "Queensland supervision rate: 175 per 10,000. \
        Indigenous youth are 20 times more likely to be supervised.";

    struct StaticFetcher;

    #[async_trait]
    impl Fetcher for StaticFetcher {
        async fn fetch(&self, target: &Target) -> Result<RawDocument, FetchError> {
            Ok(RawDocument::from_body(
                &target.id,
                &target.url,
                ContentKind::Text,
                SAMPLE,
            ))
        }
    }

    fn pipeline(store: Arc<MemoryStore>) -> Pipeline {
        let targets = vec![Target::new("a", "https://example.gov.au/a", "youth_statistics")];
        Pipeline::new(targets, Arc::new(StaticFetcher), store).unwrap()
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let targets = vec![
            Target::new("a", "https://example.gov.au/a", "x"),
            Target::new("a", "https://example.gov.au/b", "x"),
        ];
        let result = Pipeline::new(targets, Arc::new(StaticFetcher), Arc::new(MemoryStore::new()));
        assert!(matches!(result, Err(PipelineError::DuplicateTarget(_))));
    }

    #[tokio::test]
    async fn test_run_records_success() {
        let store = Arc::new(MemoryStore::new());
        let report = pipeline(store.clone()).run(&CancellationToken::new()).await;
        assert_eq!(report.succeeded(), 1);

        let health = store.get_health("a").await.unwrap().unwrap();
        assert_eq!(health.state, HealthState::Healthy);
        assert_eq!(health.stats.facts_found, 2);
        assert_eq!(health.stats.inserted, 2);
        assert!(!health.is_running());
    }

    #[tokio::test]
    async fn test_not_due_is_skipped_unless_forced() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(store.clone());
        pipeline.run(&CancellationToken::new()).await;

        let second = pipeline.run(&CancellationToken::new()).await;
        assert!(matches!(
            second.get("a"),
            Some(TargetOutcome::Skipped(SkipReason::NotDue))
        ));

        let forced = pipeline
            .with_options(PipelineOptions {
                force: true,
                ..Default::default()
            })
            .run(&CancellationToken::new())
            .await;
        assert_eq!(forced.succeeded(), 1);
    }

    #[tokio::test]
    async fn test_dry_run_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        let report = pipeline(store.clone())
            .with_options(PipelineOptions {
                dry_run: true,
                ..Default::default()
            })
            .run(&CancellationToken::new())
            .await;

        match report.get("a") {
            Some(TargetOutcome::Succeeded { facts, .. }) => assert_eq!(facts.len(), 2),
            other => panic!("unexpected outcome: {:?}", other),
        }
        assert_eq!(store.count_records(None).await.unwrap(), 0);
        assert!(store.get_health("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_disable_then_enable() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(store.clone()).with_options(PipelineOptions {
            force: true,
            ..Default::default()
        });

        let health = disable_target(store.as_ref(), "a", Some("source moved"))
            .await
            .unwrap();
        assert_eq!(health.state, HealthState::Disabled);

        let report = pipeline.run(&CancellationToken::new()).await;
        assert!(matches!(
            report.get("a"),
            Some(TargetOutcome::Skipped(SkipReason::Disabled))
        ));

        let health = enable_target(store.as_ref(), "a").await.unwrap();
        assert_eq!(health.state, HealthState::Unknown);
        assert_eq!(pipeline.run(&CancellationToken::new()).await.succeeded(), 1);
    }

    #[tokio::test]
    async fn test_unknown_target_selection() {
        let store = Arc::new(MemoryStore::new());
        let err = pipeline(store)
            .run_targets(&["nope".to_string()], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownTarget(_)));
    }
}
