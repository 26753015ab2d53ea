//! Campaign Express: email experiment engine.
//!
//! Runs a simulated email A/B test end to end: creates a test group, drives
//! sends through a simulated dispatcher on concurrent workers, feeds
//! engagement events back into the tracker, and prints the analysis.

mod simulation;

use campaign_core::config::AppConfig;
use campaign_core::types::TestType;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "campaign-express")]
#[command(about = "Email experiment (A/B test) engine")]
#[command(version)]
struct Cli {
    /// TOML config file (environment variables take precedence)
    #[arg(long, env = "CAMPAIGN_EXPRESS_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, env = "CAMPAIGN_EXPRESS__LOG_JSON", default_value_t = false)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a simulated experiment against the engine
    Simulate(SimulateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct SimulateArgs {
    /// Variants as NAME:TRUE_RATE pairs, e.g. "A:0.30,B:0.15"
    #[arg(long, value_delimiter = ',', default_value = "A:0.30,B:0.15")]
    pub variants: Vec<String>,

    /// Test type deciding the primary metric
    #[arg(long, default_value = "subject")]
    pub test_type: TestType,

    /// Target audience size (stopping condition)
    #[arg(long)]
    pub audience: Option<u64>,

    /// Confidence required to declare a winner
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Disable progressive optimization (uniform allocation)
    #[arg(long, default_value_t = false)]
    pub no_progressive: bool,

    /// Fraction of dispatches that fail
    #[arg(long, default_value_t = 0.02)]
    pub failure_rate: f64,

    /// Concurrent send workers
    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    /// Seed for allocation and engagement randomness
    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Print the report as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "campaign_express=info,campaign_experiments=info".into());
    if cli.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    // Load configuration
    let loaded = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };
    let config = loaded.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    config.experiments.validate()?;

    info!(
        node_id = %config.node_id,
        significance_method = ?config.experiments.significance_method,
        confidence_threshold = config.experiments.default_confidence_threshold,
        "Configuration loaded"
    );

    match cli.command {
        Command::Simulate(args) => {
            let report = simulation::run(&config.experiments, args.clone()).await?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                simulation::print_report(&report);
            }
        }
    }

    Ok(())
}
