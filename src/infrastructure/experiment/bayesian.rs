//! Beta-Binomial posterior inference
//!
//! Every variant starts from a uniform Beta(1, 1) prior. Comparisons use a
//! normal approximation to the difference of the two posteriors.

use crate::domain::experiment::{
    validate_probability, ArmCounts, BayesianResult, Interval, Posterior,
};
use crate::domain::DomainError;

use super::distributions::{normal_cdf, normal_quantile};

/// Default level of the reported credible interval
pub const DEFAULT_CREDIBLE_LEVEL: f64 = 0.95;

/// Beta(successes + 1, failures + 1) posterior of an arm
pub fn posterior(arm: &ArmCounts) -> Posterior {
    let alpha = arm.conversions as f64 + 1.0;
    let beta = arm.failures() as f64 + 1.0;
    let total = alpha + beta;

    Posterior {
        variant_id: arm.variant_id.clone(),
        alpha,
        beta,
        mean: alpha / total,
        variance: alpha * beta / (total.powi(2) * (total + 1.0)),
    }
}

/// Probability that `treatment` converts better than `control`, with the
/// treatment's credible interval and the expected loss of choosing it
pub fn compare(
    control: &ArmCounts,
    treatment: &ArmCounts,
    credible_level: f64,
) -> Result<BayesianResult, DomainError> {
    validate_probability("credible level", credible_level)?;

    let a = posterior(control);
    let b = posterior(treatment);

    let mean_diff = b.mean - a.mean;
    let sd_diff = (a.variance + b.variance).sqrt();

    if !(sd_diff > 0.0) {
        return Err(DomainError::computation(format!(
            "Degenerate posterior variance comparing '{}' and '{}'",
            control.variant_id, treatment.variant_id
        )));
    }

    let z = normal_quantile((1.0 + credible_level) / 2.0)?;
    let sd_b = b.variance.sqrt();

    Ok(BayesianResult {
        probability_treatment_better: normal_cdf(mean_diff / sd_diff),
        credible_interval: Interval {
            lower: (b.mean - z * sd_b).max(0.0),
            upper: (b.mean + z * sd_b).min(1.0),
            level: credible_level,
        },
        expected_loss: (a.mean - b.mean).max(0.0),
        control: a,
        treatment: b,
    })
}

/// Compare every treatment arm against the control arm
pub fn compare_all(
    control: &ArmCounts,
    treatments: &[ArmCounts],
    credible_level: f64,
) -> Result<Vec<BayesianResult>, DomainError> {
    treatments
        .iter()
        .map(|treatment| compare(control, treatment, credible_level))
        .collect()
}
