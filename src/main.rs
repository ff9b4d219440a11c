use clap::Parser;
use pmp_experiment_engine::cli::{self, Cli, Command};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::SampleSize(args) => cli::sample_size::run(args).await,
        Command::Spending(args) => cli::spending::run(args).await,
        Command::Analyze(args) => cli::analyze::run(args).await,
    }
}
