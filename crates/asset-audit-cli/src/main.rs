//! asset-audit - non-current asset anomaly audit
//!
//! Usage:
//!   asset-audit run --input portfolio.json --output enriched.json
//!   asset-audit run --input portfolio.json --config audit.json --reference 2025-06-30T00:00:00Z
//!   asset-audit summary --input enriched.json
//!   asset-audit config > audit.json

use anyhow::Result;
use asset_audit_cli::{PortfolioSummary, io};
use asset_audit_core::{AuditConfig, AuditPipeline};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "asset-audit")]
#[command(about = "Statistical and model-based anomaly audit of non-current asset portfolios")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit a portfolio export and write the enriched report
    Run {
        /// Portfolio JSON (machinery, real estate, intangibles, other assets)
        #[arg(short, long)]
        input: PathBuf,

        /// Audit config JSON; defaults apply to anything omitted
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Report destination, stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Audit reference timestamp (RFC 3339), the current time when omitted
        #[arg(long)]
        reference: Option<DateTime<Utc>>,

        /// Seed for the model and synthesized end-of-life dates
        #[arg(long)]
        seed: Option<u64>,

        /// Audit the four classes on separate threads
        #[arg(long)]
        parallel: bool,
    },

    /// Print the dashboard of an enriched report
    Summary {
        #[arg(short, long)]
        input: PathBuf,
    },

    /// Print the default config as JSON
    Config,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            input,
            config,
            output,
            reference,
            seed,
            parallel,
        } => run_audit(input, config, output, reference, seed, parallel),
        Commands::Summary { input } => run_summary(input),
        Commands::Config => {
            println!("{}", serde_json::to_string_pretty(&AuditConfig::default())?);
            Ok(())
        }
    }
}

fn run_audit(
    input: PathBuf,
    config: Option<PathBuf>,
    output: Option<PathBuf>,
    reference: Option<DateTime<Utc>>,
    seed: Option<u64>,
    parallel: bool,
) -> Result<()> {
    let mut config = io::load_config(config.as_deref())?;
    if let Some(reference) = reference {
        config = config.with_reference(reference);
    }
    if let Some(seed) = seed {
        config = config.with_seed(seed);
    }
    config.parallel_classes |= parallel;

    let portfolio = io::load_portfolio(&input)?;
    let pipeline = AuditPipeline::new(config)?;
    let report = pipeline.run(&portfolio)?;

    io::write_report(&report, output.as_deref())?;
    let summary = PortfolioSummary::from_report(&report);
    eprint!("{}", summary.render());
    info!(run_id = %report.run_id, "audit complete");
    Ok(())
}

fn run_summary(input: PathBuf) -> Result<()> {
    let report = io::load_report(&input)?;
    let summary = PortfolioSummary::from_report(&report);
    eprint!("{}", summary.render());
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
