//! Auditship - audit log shipping tool

use anyhow::Result;
use auditship::auth::TokenProvider;
use auditship::config::ShipConfig;
use auditship::shipper::Shipper;
use auditship::sink::HttpEventSink;
use auditship::usage;
use auditship_common::logging::{init_logging, LogConfig, LogLevel};
use clap::Parser;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "auditship")]
#[command(author, version, about = "Ships audit logs from object storage to a log-analytics endpoint")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Walk the audit-log hierarchy and ship everything new since the last run
    Ship,

    /// Forward a paginated usage report to the ingestion endpoint
    Usage {
        /// First page URL of the usage report
        #[arg(short, long)]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // LOG_LEVEL takes precedence over the verbose flag
    let mut log_config = LogConfig::from_env()?;
    if cli.verbose && std::env::var("LOG_LEVEL").is_err() {
        log_config = log_config.with_level(LogLevel::Debug);
    }
    init_logging(&log_config)?;

    let config = ShipConfig::load()?;

    match cli.command {
        Command::Ship => {
            info!("starting audit log shipping run");
            let shipper = Shipper::from_config(config).await?;
            let failures = shipper.run().await?;

            for failure in &failures {
                warn!("{}", failure);
            }
            info!(failures = failures.len(), "shipping run complete");
        },
        Command::Usage { url } => {
            info!("forwarding usage report");
            let token = TokenProvider::from_config(&config.ingest)?.get_token().await?;
            let sink = HttpEventSink::new(&config.ingest, &token)?;
            let client = reqwest::Client::new();

            let count = usage::forward_usage_report(&client, &sink, &url).await?;
            info!(records = count, "usage report forwarding complete");
        },
    }

    Ok(())
}
