//! Spending command - prints sequential boundaries

use clap::{Args, ValueEnum};

use crate::domain::experiment::AlphaSpending;
use crate::infrastructure::experiment::spending_schedule;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpendingFunction {
    ObrienFleming,
    Pocock,
    HaybittlePeto,
}

impl From<SpendingFunction> for AlphaSpending {
    fn from(function: SpendingFunction) -> Self {
        match function {
            SpendingFunction::ObrienFleming => AlphaSpending::OBrienFleming,
            SpendingFunction::Pocock => AlphaSpending::Pocock,
            SpendingFunction::HaybittlePeto => AlphaSpending::HaybittlePeto,
        }
    }
}

/// Arguments for the spending command
#[derive(Args, Clone, Debug)]
pub struct SpendingArgs {
    /// Alpha-spending function
    #[arg(long, value_enum, default_value_t = SpendingFunction::ObrienFleming)]
    pub function: SpendingFunction,

    /// Overall significance level (defaults to the configured one)
    #[arg(long)]
    pub alpha: Option<f64>,

    /// Number of planned analyses (defaults to the configured one)
    #[arg(long)]
    pub analyses: Option<u32>,
}

/// Print the schedule as JSON
pub async fn run(args: SpendingArgs) -> anyhow::Result<()> {
    let config = super::bootstrap();

    let schedule = spending_schedule(
        args.function.into(),
        args.alpha.unwrap_or(config.engine.significance_level),
        args.analyses.unwrap_or(config.engine.planned_analyses),
    )?;

    println!("{}", serde_json::to_string_pretty(&schedule)?);
    Ok(())
}
