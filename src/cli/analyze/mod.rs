//! Analyze command - runs the statistics engine over supplied counts

use std::path::PathBuf;

use anyhow::Context;
use clap::Args;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::EngineConfig;
use crate::domain::experiment::{
    validate_probability, ArmCounts, BayesianResult, RetrospectivePower, SignificanceResult,
    VariantId,
};
use crate::domain::DomainError;
use crate::infrastructure::experiment::{
    bayesian_compare_all, calculate_significance, retrospective_power,
};

/// Arguments for the analyze command
#[derive(Args, Clone, Debug)]
pub struct AnalyzeArgs {
    /// JSON file with variant counts; the first variant is the control
    #[arg(long)]
    pub input: PathBuf,
}

/// Counts of one variant
#[derive(Debug, Clone, Deserialize)]
pub struct VariantCounts {
    pub id: String,
    pub participants: u64,
    pub conversions: u64,
}

/// Contents of the input file
#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeInput {
    #[serde(default)]
    pub significance_level: Option<f64>,
    #[serde(default)]
    pub credible_level: Option<f64>,
    #[serde(default)]
    pub min_sample_size_per_variant: Option<u64>,
    pub variants: Vec<VariantCounts>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeOutput {
    pub significance: SignificanceResult,
    pub bayesian: Vec<BayesianResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrospective_power: Option<RetrospectivePower>,
}

/// Frequentist and Bayesian analysis of the supplied counts
pub fn analyze_counts(
    input: &AnalyzeInput,
    engine: &EngineConfig,
) -> Result<AnalyzeOutput, DomainError> {
    let alpha = input.significance_level.unwrap_or(engine.significance_level);
    let credible_level = input.credible_level.unwrap_or(engine.credible_level);
    validate_probability("significance level", alpha)?;

    let arms = input
        .variants
        .iter()
        .map(|v| {
            if v.conversions > v.participants {
                return Err(DomainError::validation(format!(
                    "Variant '{}' has more conversions ({}) than participants ({})",
                    v.id, v.conversions, v.participants
                )));
            }

            Ok(ArmCounts::new(VariantId::new(&v.id)?, v.participants, v.conversions))
        })
        .collect::<Result<Vec<_>, DomainError>>()?;

    let (control, treatments) = arms
        .split_first()
        .filter(|(_, treatments)| !treatments.is_empty())
        .ok_or_else(|| DomainError::validation("At least 2 variants are required"))?;

    let significance = calculate_significance(
        &arms,
        alpha,
        input
            .min_sample_size_per_variant
            .unwrap_or(engine.min_sample_size_per_variant),
    )?;

    let bayesian = bayesian_compare_all(control, treatments, credible_level)?;

    let best = treatments
        .iter()
        .filter(|t| t.participants > 0)
        .max_by(|a, b| a.rate().total_cmp(&b.rate()));

    let retrospective = match best {
        Some(treatment) if control.participants > 0 => {
            Some(retrospective_power(control, treatment, alpha, arms.len())?)
        }
        _ => None,
    };

    Ok(AnalyzeOutput {
        significance,
        bayesian,
        retrospective_power: retrospective,
    })
}

/// Read the input file and print the analysis as JSON
pub async fn run(args: AnalyzeArgs) -> anyhow::Result<()> {
    let config = super::bootstrap();

    let raw = tokio::fs::read_to_string(&args.input)
        .await
        .with_context(|| format!("Failed to read {}", args.input.display()))?;
    let input: AnalyzeInput = serde_json::from_str(&raw)
        .with_context(|| format!("Invalid analysis input in {}", args.input.display()))?;

    let output = analyze_counts(&input, &config.engine)?;
    info!(
        variants = input.variants.len(),
        significant = output.significance.is_significant(),
        "Analysis complete"
    );

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
