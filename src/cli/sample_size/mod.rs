//! Sample size command - plans a fixed-horizon experiment

use clap::Args;
use tracing::info;

use crate::infrastructure::experiment::{calculate_sample_size, SampleSizeParams};

/// Arguments for the sample-size command
#[derive(Args, Clone, Debug)]
pub struct SampleSizeArgs {
    /// Conversion rate of the control, in (0, 1)
    #[arg(long)]
    pub baseline: f64,

    /// Smallest absolute lift worth detecting
    #[arg(long)]
    pub mde: f64,

    /// Significance level (defaults to the configured one)
    #[arg(long)]
    pub alpha: Option<f64>,

    /// Statistical power (defaults to the configured one)
    #[arg(long)]
    pub power: Option<f64>,

    /// Number of variants including the control
    #[arg(long, default_value_t = 2)]
    pub variants: usize,

    /// Expected subjects per day across all variants
    #[arg(long)]
    pub daily_traffic: Option<u64>,
}

/// Print the sample size plan as JSON
pub async fn run(args: SampleSizeArgs) -> anyhow::Result<()> {
    let config = super::bootstrap();

    let mut params = SampleSizeParams::new(args.baseline, args.mde)
        .with_significance_level(args.alpha.unwrap_or(config.engine.significance_level))
        .with_power(args.power.unwrap_or(config.engine.power))
        .with_variant_count(args.variants);

    if let Some(traffic) = args.daily_traffic {
        params = params.with_expected_daily_traffic(traffic);
    }

    let plan = calculate_sample_size(&params)?;
    info!(
        per_variant = plan.sample_size_per_variant,
        total = plan.total_sample_size,
        "Sample size calculated"
    );

    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(())
}
