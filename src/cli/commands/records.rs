//! Record inspection, resolution, seeding and budget commands.

use std::path::Path;

use anyhow::bail;
use console::style;

use yjtracker::analysis::budget_breakdown;
use yjtracker::config::Settings;
use yjtracker::models::{FactType, RecordQuery, StoredRecord};
use yjtracker::pipeline::Loader;
use yjtracker::resolve::resolve_fact;
use yjtracker::seed::load_seed_file;

use super::{format_time, truncate};

fn parse_fact(name: &str) -> anyhow::Result<FactType> {
    match FactType::from_str(name) {
        Some(fact) => Ok(fact),
        None => {
            let known: Vec<&str> = FactType::ALL.iter().map(|f| f.as_str()).collect();
            bail!("unknown fact type '{}' (expected one of: {})", name, known.join(", "))
        }
    }
}

fn describe(record: &StoredRecord) -> String {
    format!(
        "{} {} ({}, {}, priority {}, {})",
        record.value,
        record.unit.as_str(),
        record.target_id,
        record.provenance.as_str(),
        record.priority,
        format_time(Some(record.extracted_at))
    )
}

pub async fn cmd_records(
    settings: &Settings,
    destination: Option<String>,
    fact: Option<String>,
    period: Option<String>,
) -> anyhow::Result<()> {
    let query = RecordQuery {
        destination,
        fact_type: fact.as_deref().map(parse_fact).transpose()?,
        period,
        subject: None,
    };
    let store = super::open_store(settings).await?;
    let records = store.list_records(&query).await?;

    if records.is_empty() {
        println!("{} No records found", style("!").yellow());
        return Ok(());
    }

    println!("{}", "-".repeat(100));
    println!(
        "{:<20} {:<44} {:>16} {:<6} {:<20}",
        "Destination", "Key", "Value", "Source", "Target"
    );
    println!("{}", "-".repeat(100));
    for record in &records {
        println!(
            "{:<20} {:<44} {:>16} {:<6} {:<20}",
            truncate(&record.destination, 20),
            truncate(&record.natural_key, 44),
            truncate(&format!("{} {}", record.value, record.unit.as_str()), 16),
            record.provenance.as_str(),
            truncate(&record.target_id, 20)
        );
    }
    println!("{} record(s)", records.len());
    Ok(())
}

pub async fn cmd_resolve(
    settings: &Settings,
    fact: &str,
    subject: Option<&str>,
    period: Option<&str>,
) -> anyhow::Result<()> {
    let fact_type = parse_fact(fact)?;
    let store = super::open_store(settings).await?;

    let Some(resolution) = resolve_fact(store.as_ref(), fact_type, subject, period).await? else {
        println!("{} No records for {}", style("!").yellow(), fact_type);
        return Ok(());
    };

    println!(
        "{} {} = {}",
        style("✓").green(),
        fact_type,
        describe(&resolution.winner)
    );
    if let Some(doc) = &resolution.winner.document_name {
        println!("    from {} ({})", doc, resolution.winner.source_url);
    }
    if resolution.conflict {
        println!("{} Sources disagree:", style("!").yellow());
    }
    for alt in &resolution.alternatives {
        println!("    {}", describe(alt));
    }
    Ok(())
}

pub async fn cmd_seed(settings: &Settings, file: &Path) -> anyhow::Result<()> {
    let records = load_seed_file(file)?;
    let store = super::open_store(settings).await?;
    let report = Loader::new(store).load(&records).await?;

    println!(
        "{} Seeded {} record(s): {} inserted, {} updated, {} unchanged, {} kept live",
        style("✓").green(),
        records.len(),
        report.inserted,
        report.updated,
        report.unchanged,
        report.skipped
    );
    Ok(())
}

pub async fn cmd_budget(settings: &Settings, period: &str) -> anyhow::Result<()> {
    let store = super::open_store(settings).await?;
    let summary = budget_breakdown(store.as_ref(), period).await?;

    println!("\n{}", style(format!("Fiscal year {}", period)).bold());
    println!("  Total budget: ${:.0}", summary.total);
    println!(
        "  Detention:    {:.1}% (${:.0})",
        summary.detention_percentage, summary.detention_total
    );
    println!(
        "  Community:    {:.1}% (${:.0})",
        summary.community_percentage, summary.community_total
    );
    println!("  Programs:     {}", summary.allocation_count);
    Ok(())
}
