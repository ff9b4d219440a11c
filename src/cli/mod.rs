//! CLI module for the experiment engine
//!
//! Provides offline subcommands over the statistics engine:
//! - `sample-size`: prospective sample size plan
//! - `spending`: alpha-spending boundaries for every planned look
//! - `analyze`: significance and Bayesian analysis of supplied counts

pub mod analyze;
pub mod sample_size;
pub mod spending;

use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use crate::infrastructure::logging;

/// PMP Experiment Engine - A/B/n test planning and analysis
#[derive(Parser)]
#[command(name = "pmp-experiment-engine")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compute the sample size needed per variant
    SampleSize(sample_size::SampleSizeArgs),

    /// Print the alpha-spending schedule of a sequential design
    Spending(spending::SpendingArgs),

    /// Analyze conversion counts read from a JSON file
    Analyze(analyze::AnalyzeArgs),
}

/// Load configuration and install logging for a command
fn bootstrap() -> AppConfig {
    dotenvy::dotenv().ok();

    let config = AppConfig::load().unwrap_or_default();
    logging::init_logging(&config.logging);
    config
}
