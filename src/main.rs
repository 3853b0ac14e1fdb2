use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use hsbc_exporter::app;
use hsbc_exporter::config::{default_config_path, ResolvedConfig};
use hsbc_exporter::recon::ReconOptions;

#[derive(Parser)]
#[command(name = "hsbc-exporter")]
#[command(about = "Bulk statement export automation for the HSBCnet portal")]
#[command(version)]
struct Cli {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Export statements for every selected account on the list page
    ExportAll {
        /// Start date, dd/mm/yyyy (defaults to yesterday)
        #[arg(long)]
        from: Option<String>,
        /// End date, dd/mm/yyyy (defaults to yesterday)
        #[arg(long)]
        to: Option<String>,
    },
    /// Export the account whose details page is currently open
    ExportAccount {
        /// Start date, dd/mm/yyyy (defaults to the first of this month)
        #[arg(long)]
        from: Option<String>,
        /// End date, dd/mm/yyyy (defaults to today)
        #[arg(long)]
        to: Option<String>,
    },
    /// Show or clear the run history
    History {
        #[command(subcommand)]
        action: Option<HistoryCommand>,
    },
    /// Talk to the reconciliation host
    Recon {
        #[command(subcommand)]
        action: ReconCommand,
    },
    /// Show current configuration
    Config,
}

#[derive(Subcommand)]
enum HistoryCommand {
    /// Delete all recorded runs
    Clear,
}

#[derive(Subcommand)]
enum ReconCommand {
    /// Probe whether the host responds
    Check,
    /// Run a full reconciliation
    Run {
        #[arg(long)]
        skip_cashbook: bool,
        #[arg(long)]
        skip_distribution: bool,
        #[arg(long)]
        skip_bnp_distribution: bool,
        #[arg(long)]
        force_reconsolidate: bool,
        /// Restrict to one month (as the engine expects it)
        #[arg(long)]
        month: Option<String>,
        /// Restrict to one entity
        #[arg(long)]
        entity: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("hsbc_exporter=info")),
        )
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = ResolvedConfig::load_or_default(&config_path)?;

    match cli.command {
        Command::ExportAll { from, to } => app::export_all(&config, from, to).await,
        Command::ExportAccount { from, to } => app::export_account(&config, from, to).await,
        Command::History { action: None } => app::show_history(&config).await,
        Command::History {
            action: Some(HistoryCommand::Clear),
        } => app::clear_history(&config).await,
        Command::Recon {
            action: ReconCommand::Check,
        } => app::recon_check(&config).await,
        Command::Recon {
            action:
                ReconCommand::Run {
                    skip_cashbook,
                    skip_distribution,
                    skip_bnp_distribution,
                    force_reconsolidate,
                    month,
                    entity,
                },
        } => {
            let options = ReconOptions {
                skip_cashbook,
                skip_distribution,
                skip_bnp_distribution,
                force_reconsolidate,
                month,
                entity,
            };
            app::recon_run(&config, options).await
        }
        Command::Config => {
            println!("Config file:    {}", config_path.display());
            println!("Data directory: {}", config.data_dir.display());
            println!("Download root:  {}", config.download_root.display());
            println!("Portal URL:     {}", config.portal_url);
            Ok(())
        }
    }
}
