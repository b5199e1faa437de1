//! Initialize command.

use console::style;

use yjtracker::config::Settings;
use yjtracker::repository::DbContext;

/// Create the database tables. Safe to run repeatedly.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    let url = settings.require_database_url()?;
    let ctx = DbContext::from_url(url)?;
    ctx.init_schema().await?;

    for table in ctx.list_tables().await? {
        println!("  {} {}", style("✓").green(), table);
    }

    match super::targets(settings) {
        Ok(targets) => println!(
            "  {} {} target(s) in {}",
            style("✓").green(),
            targets.len(),
            settings.targets_path.display()
        ),
        Err(e) => println!("  {} {}", style("!").yellow(), e),
    }

    println!("{} Initialized database {}", style("✓").green(), url);
    Ok(())
}
