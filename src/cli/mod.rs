//! CLI parser and dispatch.

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use yjtracker::config::Settings;

#[derive(Parser)]
#[command(name = "yjt")]
#[command(about = "Queensland Youth Justice Tracker data pipeline")]
#[command(version)]
pub struct Cli {
    /// SQLite database (sqlite:///path/to/db or a plain path)
    #[arg(long, global = true, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Targets file
    #[arg(long, global = true, env = "YJT_TARGETS")]
    targets: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database tables
    Init,

    /// Fetch, extract and load targets that are due
    Run {
        /// Only run these targets (repeatable)
        #[arg(short, long = "target")]
        targets: Vec<String>,
        /// Run even when a target is not due
        #[arg(short, long)]
        force: bool,
        /// Targets to run concurrently
        #[arg(short, long, env = "YJT_WORKERS")]
        workers: Option<usize>,
        /// Fetch and extract without writing anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Show target health
    Status,

    /// Re-enable a disabled target
    Enable {
        /// Target ID
        target_id: String,
    },

    /// Stop a target from running
    Disable {
        /// Target ID
        target_id: String,
        /// Why it was disabled
        #[arg(short, long)]
        reason: Option<String>,
    },

    /// List configured targets
    Targets,

    /// List stored records
    Records {
        /// Only records in this destination
        #[arg(short, long)]
        destination: Option<String>,
        /// Only records of this fact type
        #[arg(short, long)]
        fact: Option<String>,
        /// Only records for this period
        #[arg(short, long)]
        period: Option<String>,
    },

    /// Show the authoritative value for a fact
    Resolve {
        /// Fact type, e.g. overrepresentation_factor
        fact: String,
        /// Subject, for facts reported per program or facility
        #[arg(short, long)]
        subject: Option<String>,
        /// Only consider this period
        #[arg(short, long)]
        period: Option<String>,
    },

    /// Load hand-curated records from a TOML file
    Seed {
        /// Seed file
        file: PathBuf,
    },

    /// Detention vs community budget split for a period
    Budget {
        /// Reporting period, e.g. 2024-25
        period: String,
    },

    /// Run a target's extraction rules on a local file
    Extract {
        /// Target ID
        target_id: String,
        /// Document to extract from
        file: PathBuf,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::from_env()?;
    if let Some(url) = cli.database_url {
        settings.database_url = Some(url);
    }
    if let Some(path) = cli.targets {
        settings.targets_path = path;
    }

    match cli.command {
        Commands::Init => commands::init::cmd_init(&settings).await,
        Commands::Run {
            targets,
            force,
            workers,
            dry_run,
        } => {
            if let Some(workers) = workers {
                settings.workers = workers;
            }
            commands::run::cmd_run(&settings, &targets, force, dry_run).await
        }
        Commands::Status => commands::status::cmd_status(&settings).await,
        Commands::Enable { target_id } => {
            commands::status::cmd_enable(&settings, &target_id).await
        }
        Commands::Disable { target_id, reason } => {
            commands::status::cmd_disable(&settings, &target_id, reason.as_deref()).await
        }
        Commands::Targets => commands::status::cmd_targets(&settings),
        Commands::Records {
            destination,
            fact,
            period,
        } => commands::records::cmd_records(&settings, destination, fact, period).await,
        Commands::Resolve {
            fact,
            subject,
            period,
        } => {
            commands::records::cmd_resolve(&settings, &fact, subject.as_deref(), period.as_deref())
                .await
        }
        Commands::Seed { file } => commands::records::cmd_seed(&settings, &file).await,
        Commands::Budget { period } => commands::records::cmd_budget(&settings, &period).await,
        Commands::Extract { target_id, file } => {
            commands::extract::cmd_extract(&settings, &target_id, &file).await
        }
    }
}
