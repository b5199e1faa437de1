//! Target listing, health and enable/disable commands.

use console::style;

use yjtracker::config::Settings;
use yjtracker::models::{HealthState, HealthStatus};
use yjtracker::pipeline::{disable_target, enable_target};

use super::{format_time, truncate};

fn styled_state(state: HealthState) -> String {
    let s = format!("{:<9}", state.as_str());
    match state {
        HealthState::Healthy => style(s).green().to_string(),
        HealthState::Warning => style(s).yellow().to_string(),
        HealthState::Error => style(s).red().to_string(),
        HealthState::Disabled => style(s).dim().to_string(),
        HealthState::Unknown => s,
    }
}

/// Show health for configured targets and any with stored health rows.
pub async fn cmd_status(settings: &Settings) -> anyhow::Result<()> {
    let store = super::open_store(settings).await?;
    let mut rows = store.list_health().await?;

    match super::targets(settings) {
        Ok(targets) => {
            for target in targets {
                if !rows.iter().any(|h| h.target_id == target.id) {
                    rows.push(HealthStatus::new(&target.id));
                }
            }
        }
        Err(e) => println!("{} {}", style("!").yellow(), e),
    }
    rows.sort_by(|a, b| a.target_id.cmp(&b.target_id));

    if rows.is_empty() {
        println!("{} No targets configured", style("!").yellow());
        return Ok(());
    }

    println!("\n{}", style("Target health").bold());
    println!("{}", "-".repeat(90));
    println!(
        "{:<24} {:<9} {:>5} {:<16} {:<16} Last error",
        "ID", "State", "Fails", "Last run", "Last success"
    );
    println!("{}", "-".repeat(90));

    for health in rows {
        let note = match (&health.disabled_reason, &health.last_error) {
            (Some(reason), _) if health.state == HealthState::Disabled => reason.clone(),
            (_, Some(error)) if health.consecutive_failures > 0 => error.clone(),
            _ => String::new(),
        };
        println!(
            "{:<24} {} {:>5} {:<16} {:<16} {}",
            truncate(&health.target_id, 24),
            styled_state(health.state),
            health.consecutive_failures,
            format_time(health.last_run_at),
            format_time(health.last_success_at),
            truncate(&note, 40)
        );
        if health.is_running() {
            println!(
                "{:<24} running since {}",
                "",
                format_time(health.run_started_at)
            );
        }
    }
    Ok(())
}

pub async fn cmd_enable(settings: &Settings, target_id: &str) -> anyhow::Result<()> {
    super::find_target(settings, target_id)?;
    let store = super::open_store(settings).await?;
    enable_target(store.as_ref(), target_id).await?;
    println!("{} Enabled {}", style("✓").green(), target_id);
    Ok(())
}

pub async fn cmd_disable(
    settings: &Settings,
    target_id: &str,
    reason: Option<&str>,
) -> anyhow::Result<()> {
    super::find_target(settings, target_id)?;
    let store = super::open_store(settings).await?;
    disable_target(store.as_ref(), target_id, reason).await?;
    println!("{} Disabled {}", style("✓").green(), target_id);
    Ok(())
}

/// List configured targets. Does not touch the database.
pub fn cmd_targets(settings: &Settings) -> anyhow::Result<()> {
    let targets = super::targets(settings)?;
    if targets.is_empty() {
        println!(
            "{} No targets in {}",
            style("!").yellow(),
            settings.targets_path.display()
        );
        return Ok(());
    }

    println!("\n{}", style("Targets").bold());
    println!("{}", "-".repeat(90));
    println!(
        "{:<24} {:<20} {:<5} {:>8} {:>5} URL",
        "ID", "Destination", "Type", "Cadence", "Rules"
    );
    println!("{}", "-".repeat(90));

    for target in targets {
        let id = if target.enabled {
            truncate(&target.id, 24)
        } else {
            format!("{} (off)", truncate(&target.id, 18))
        };
        println!(
            "{:<24} {:<20} {:<5} {:>7}h {:>5} {}",
            id,
            truncate(&target.destination, 20),
            target.content.as_str(),
            target.cadence.as_secs() / 3600,
            target.schema.rules.len() + target.schema.tables.len(),
            target.url
        );
    }
    Ok(())
}
