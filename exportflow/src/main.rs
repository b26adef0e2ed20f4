mod commands;
mod logging;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "exportflow",
    version,
    about = "ClickHouse export and analytics refresh pipelines"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Export marked rows from ClickHouse to object storage
    Export {
        /// Execute the script instead of only counting rows
        #[arg(long)]
        live: bool,
        /// SQL script template (overrides EXPORT_SCRIPT_PATH)
        #[arg(long)]
        script: Option<PathBuf>,
    },
    /// Rebuild models and the analytics site, publish it, then prune exports
    Analytics {
        /// Retention window for the cleanup finalizer, in days
        #[arg(long)]
        retention_days: Option<u32>,
        /// Build without publishing
        #[arg(long)]
        skip_publish: bool,
    },
    /// Delete exported files older than the retention window
    Cleanup {
        /// Retention window, in days
        #[arg(long)]
        retention_days: Option<u32>,
        /// Key prefix of exported files
        #[arg(long)]
        prefix: Option<String>,
    },
    /// List exported files with their size and age
    CheckStorage {
        /// Key prefix to list
        #[arg(long)]
        prefix: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    logging::init(&cli.log_level, cli.json_logs);

    let succeeded = match cli.command {
        Commands::Export { live, script } => commands::export::execute(live, script).await?,
        Commands::Analytics {
            retention_days,
            skip_publish,
        } => commands::analytics::execute(retention_days, skip_publish).await?,
        Commands::Cleanup {
            retention_days,
            prefix,
        } => commands::cleanup::execute(retention_days, prefix).await?,
        Commands::CheckStorage { prefix } => commands::check_storage::execute(prefix).await?,
    };

    if !succeeded {
        std::process::exit(1);
    }
    Ok(())
}
