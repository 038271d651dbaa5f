//! Oversell Agent CLI
//!
//! A command-line tool for reading risk reports, inspecting samples and
//! checking the health of a running oversell agent.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use commands::{report, samples, status};

/// Oversell Agent CLI
#[derive(Parser)]
#[command(name = "osctl")]
#[command(author, version, about = "CLI for the Oversell Agent", long_about = None)]
pub struct Cli {
    /// Agent API URL (can also be set via OSCTL_API_URL env var)
    #[arg(long, env = "OSCTL_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum Period {
    Daily,
    Weekly,
    Monthly,
}

impl Period {
    fn as_str(&self) -> &'static str {
        match self {
            Period::Daily => "daily",
            Period::Weekly => "weekly",
            Period::Monthly => "monthly",
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compute the risk report for a period ending now
    Report {
        #[arg(value_enum)]
        period: Period,
    },

    /// Show the most recent sample of a metric type
    Latest {
        /// Metric type (cpu_steal, cpu_iowait, cpu_bench, io_latency,
        /// random_io, disk_stats, memory, cpu_load)
        metric_type: String,
    },

    /// List samples of a metric type
    Samples {
        /// Metric type
        metric_type: String,

        /// How many hours back to look
        #[arg(long, default_value_t = 24)]
        hours: u32,
    },

    /// Run one full collection pass on the agent now
    Collect,

    /// Show agent health and readiness
    Status,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        output::print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();

    let api_url = config::Config::load()?.resolve_api_url(cli.api_url);
    let client = client::ApiClient::new(&api_url)?;

    match cli.command {
        Commands::Report { period } => {
            report::show_report(&client, period.as_str(), cli.format).await?;
        }
        Commands::Latest { metric_type } => {
            samples::show_latest(&client, &metric_type, cli.format).await?;
        }
        Commands::Samples { metric_type, hours } => {
            samples::list_samples(&client, &metric_type, hours, cli.format).await?;
        }
        Commands::Collect => {
            samples::collect_now(&client, cli.format).await?;
        }
        Commands::Status => {
            status::show_status(&client, cli.format).await?;
        }
    }

    Ok(())
}
