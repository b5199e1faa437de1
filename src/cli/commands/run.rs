//! Run command: one batch over the configured targets.

use std::sync::Arc;

use console::style;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use yjtracker::alerts::{BoxedAlertSink, LogAlertSink, WebhookAlertSink};
use yjtracker::config::{ConfigError, Settings};
use yjtracker::fetch::HttpFetcher;
use yjtracker::http_client::HttpClient;
use yjtracker::pipeline::{Pipeline, TargetOutcome};

/// Run every due target (or the named ones) once.
///
/// Per-target failures are reported and recorded in health but do not make
/// the command fail.
pub async fn cmd_run(
    settings: &Settings,
    only: &[String],
    force: bool,
    dry_run: bool,
) -> anyhow::Result<()> {
    let targets = super::targets(settings)?;
    let render = settings.render_service()?;
    if render.is_none() {
        if let Some(target) = targets
            .iter()
            .filter(|t| only.is_empty() || only.contains(&t.id))
            .find(|t| t.enabled && t.render.is_some())
        {
            return Err(ConfigError::RenderNotConfigured(target.id.clone()).into());
        }
    }

    let store = super::open_store(settings).await?;

    let client = HttpClient::builder()
        .user_agent(&settings.user_agent)
        .build()?;
    let mut fetcher = HttpFetcher::new(client);
    if let Some(render) = render {
        fetcher = fetcher.with_render(render);
    }

    let alerts: BoxedAlertSink = match &settings.alert_webhook_url {
        Some(url) => Arc::new(WebhookAlertSink::new(url)?),
        None => Arc::new(LogAlertSink),
    };

    let mut options = settings.pipeline_options();
    options.force = force;
    options.dry_run = dry_run;

    let pipeline = Pipeline::new(targets, Arc::new(fetcher), store)?
        .with_options(options)
        .with_alerts(alerts);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling in-flight runs");
            on_signal.cancel();
        }
    });

    let report = if only.is_empty() {
        pipeline.run(&cancel).await
    } else {
        pipeline.run_targets(only, &cancel).await?
    };

    for target in &report.targets {
        match &target.outcome {
            TargetOutcome::Succeeded {
                stats,
                facts,
                warnings,
            } => {
                println!(
                    "  {} {}: {} facts, {} inserted, {} updated, {} unchanged",
                    style("✓").green(),
                    target.target_id,
                    stats.facts_found,
                    stats.inserted,
                    stats.updated,
                    stats.unchanged
                );
                for w in warnings {
                    println!(
                        "      {} {}: {} ({})",
                        style("!").yellow(),
                        w.fact_type,
                        w.reason,
                        super::truncate(&w.raw, 60)
                    );
                }
                if dry_run {
                    for fact in facts {
                        println!(
                            "      {} = {} {}{}",
                            fact.fact_type,
                            fact.value,
                            fact.unit.as_str(),
                            fact.subject
                                .as_deref()
                                .map(|s| format!(" [{}]", s))
                                .unwrap_or_default()
                        );
                    }
                }
            }
            TargetOutcome::Failed(e) => {
                println!("  {} {}: {}", style("✗").red(), target.target_id, e);
            }
            TargetOutcome::Skipped(reason) => {
                println!(
                    "  {} {}: skipped ({})",
                    style("-").dim(),
                    target.target_id,
                    reason.as_str()
                );
            }
            TargetOutcome::Cancelled => {
                println!("  {} {}: cancelled", style("!").yellow(), target.target_id);
            }
        }
    }

    println!(
        "{} {} succeeded, {} failed, {} skipped, {} cancelled",
        style("Done:").bold(),
        report.succeeded(),
        report.failed(),
        report.skipped(),
        report.cancelled()
    );
    Ok(())
}
