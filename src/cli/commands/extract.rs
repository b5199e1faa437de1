//! Try a target's extraction rules on a local file.

use std::path::Path;

use anyhow::Context;
use console::style;

use yjtracker::config::Settings;
use yjtracker::extract::Extractor;
use yjtracker::fetch::pdf_to_text;
use yjtracker::models::{ContentKind, RawDocument};

/// Print what the target's schema finds in `file`. No store access.
pub async fn cmd_extract(settings: &Settings, target_id: &str, file: &Path) -> anyhow::Result<()> {
    let target = super::find_target(settings, target_id)?;

    let bytes = tokio::fs::read(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;
    let body = match target.content {
        ContentKind::Pdf => pdf_to_text(bytes).await?,
        _ => String::from_utf8_lossy(&bytes).into_owned(),
    };

    let url = format!("file://{}", file.display());
    let doc = RawDocument::from_body(&target.id, &url, target.content, &body);
    let outcome = Extractor::new(&target.schema).extract(&doc);

    println!(
        "\n{} {} ({} chars)",
        style("Extracting").bold(),
        doc.document_name(),
        doc.text.len()
    );
    for fact in &outcome.facts {
        let subject = fact
            .subject
            .as_deref()
            .map(|s| format!(" [{}]", s))
            .unwrap_or_default();
        let category = fact
            .category
            .as_deref()
            .map(|c| format!(" ({})", c))
            .unwrap_or_default();
        println!(
            "  {} {} = {} {}{}{}",
            style("✓").green(),
            fact.fact_type,
            fact.value,
            fact.unit.as_str(),
            subject,
            category
        );
    }
    for warning in &outcome.warnings {
        println!(
            "  {} {}: {} in '{}'",
            style("!").yellow(),
            warning.fact_type,
            warning.reason,
            super::truncate(&warning.raw, 60)
        );
    }
    for missing in &outcome.missing {
        println!("  {} {}: not present", style("-").dim(), missing);
    }
    println!(
        "{} facts, {} warnings, {} not present",
        outcome.facts.len(),
        outcome.warnings.len(),
        outcome.missing.len()
    );
    Ok(())
}
