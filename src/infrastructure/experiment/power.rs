//! Power analysis for conversion-rate experiments
//!
//! Effect sizes use Cohen's h, the difference of arcsine-transformed
//! proportions, so the required sample size per arm is
//! `n = 2 (z_{1-a/2} + z_power)^2 / h^2`.

use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;

use crate::domain::experiment::{
    validate_positive, validate_probability, ArmCounts, ExperimentValidationError,
    RetrospectivePower, SampleSizePlan, SensitivityPoint, DEFAULT_POWER,
    DEFAULT_SIGNIFICANCE_LEVEL,
};
use crate::domain::DomainError;

use super::distributions::{normal_cdf, normal_quantile, two_sided_critical_value};
use super::statistical::bonferroni_alpha;

/// Power levels reported in the retrospective sensitivity table
pub const SENSITIVITY_POWER_LEVELS: [f64; 3] = [0.5, 0.8, 0.9];

/// Inputs of a prospective sample size calculation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSizeParams {
    pub baseline_rate: f64,
    pub minimum_detectable_effect: f64,
    #[serde(default = "default_significance_level")]
    pub significance_level: f64,
    #[serde(default = "default_power")]
    pub power: f64,
    #[serde(default = "default_variant_count")]
    pub variant_count: usize,
    #[serde(default)]
    pub expected_daily_traffic: Option<u64>,
}

fn default_significance_level() -> f64 {
    DEFAULT_SIGNIFICANCE_LEVEL
}

fn default_power() -> f64 {
    DEFAULT_POWER
}

fn default_variant_count() -> usize {
    2
}

impl SampleSizeParams {
    pub fn new(baseline_rate: f64, minimum_detectable_effect: f64) -> Self {
        Self {
            baseline_rate,
            minimum_detectable_effect,
            significance_level: DEFAULT_SIGNIFICANCE_LEVEL,
            power: DEFAULT_POWER,
            variant_count: default_variant_count(),
            expected_daily_traffic: None,
        }
    }

    pub fn with_significance_level(mut self, alpha: f64) -> Self {
        self.significance_level = alpha;
        self
    }

    pub fn with_power(mut self, power: f64) -> Self {
        self.power = power;
        self
    }

    pub fn with_variant_count(mut self, variant_count: usize) -> Self {
        self.variant_count = variant_count;
        self
    }

    pub fn with_expected_daily_traffic(mut self, traffic: u64) -> Self {
        self.expected_daily_traffic = Some(traffic);
        self
    }

    pub fn validate(&self) -> Result<(), ExperimentValidationError> {
        validate_probability("baseline rate", self.baseline_rate)?;
        validate_positive("minimum detectable effect", self.minimum_detectable_effect)?;
        validate_probability("significance level", self.significance_level)?;
        validate_probability("power", self.power)?;

        if self.variant_count < 2 {
            return Err(ExperimentValidationError::InsufficientVariants);
        }

        let target = self.baseline_rate + self.minimum_detectable_effect;

        if target >= 1.0 {
            return Err(ExperimentValidationError::EffectExceedsUnitRange(target));
        }

        if self.expected_daily_traffic == Some(0) {
            return Err(ExperimentValidationError::NonPositive {
                name: "expected daily traffic",
                value: 0.0,
            });
        }

        Ok(())
    }
}

/// Cohen's h between two proportions
pub fn cohens_h(p1: f64, p2: f64) -> f64 {
    2.0 * (p2.sqrt().asin() - p1.sqrt().asin())
}

/// Required participants per arm and in total
pub fn calculate_sample_size(params: &SampleSizeParams) -> Result<SampleSizePlan, DomainError> {
    params.validate()?;

    let target_rate = params.baseline_rate + params.minimum_detectable_effect;
    let effect_size = cohens_h(params.baseline_rate, target_rate);
    let adjusted_alpha = bonferroni_alpha(params.significance_level, params.variant_count);

    let z_alpha = two_sided_critical_value(adjusted_alpha)?;
    let z_power = normal_quantile(params.power)?;

    let per_variant = (2.0 * (z_alpha + z_power).powi(2) / effect_size.powi(2)).ceil();

    if !per_variant.is_finite() {
        return Err(DomainError::computation(format!(
            "Sample size is unbounded for effect size {}",
            effect_size
        )));
    }

    let sample_size_per_variant = per_variant as u64;

    let days_to_target = params.expected_daily_traffic.map(|daily| {
        let per_variant_per_day = daily as f64 / params.variant_count as f64;
        (sample_size_per_variant as f64 / per_variant_per_day).ceil() as u64
    });

    Ok(SampleSizePlan {
        baseline_rate: params.baseline_rate,
        minimum_detectable_effect: params.minimum_detectable_effect,
        target_rate,
        effect_size,
        significance_level: params.significance_level,
        adjusted_significance_level: adjusted_alpha,
        power: params.power,
        variant_count: params.variant_count,
        sample_size_per_variant,
        total_sample_size: sample_size_per_variant * params.variant_count as u64,
        days_to_target,
    })
}

/// Smallest absolute lift over `baseline_rate` detectable with `sample_size_per_variant`
///
/// Returns `None` when even a rate of 1 would not reach the requested power.
pub fn minimum_detectable_effect(
    baseline_rate: f64,
    sample_size_per_variant: u64,
    alpha: f64,
    power: f64,
    variant_count: usize,
) -> Result<Option<f64>, DomainError> {
    validate_probability("baseline rate", baseline_rate)?;
    validate_probability("significance level", alpha)?;
    validate_probability("power", power)?;

    if sample_size_per_variant == 0 {
        return Err(ExperimentValidationError::NonPositive {
            name: "sample size per variant",
            value: 0.0,
        }
        .into());
    }

    let adjusted_alpha = bonferroni_alpha(alpha, variant_count);
    let z_sum = two_sided_critical_value(adjusted_alpha)? + normal_quantile(power)?;
    let h = (2.0 / sample_size_per_variant as f64).sqrt() * z_sum;

    let angle = baseline_rate.sqrt().asin() + h / 2.0;

    if angle > FRAC_PI_2 {
        return Ok(None);
    }

    Ok(Some(angle.sin().powi(2) - baseline_rate))
}

/// Power achieved by a per-arm sample size for effect size `h`
pub fn achieved_power(effect_size: f64, sample_size_per_variant: u64, alpha: f64) -> Result<f64, DomainError> {
    let z_alpha = two_sided_critical_value(alpha)?;
    let z_beta = effect_size.abs() * (sample_size_per_variant as f64 / 2.0).sqrt() - z_alpha;
    Ok(normal_cdf(z_beta))
}

/// Post-hoc power of `treatment` against `control`
///
/// The per-arm sample size is the smaller of the two arms. The result is
/// informational and never feeds a stopping decision.
pub fn retrospective_power(
    control: &ArmCounts,
    treatment: &ArmCounts,
    alpha: f64,
    variant_count: usize,
) -> Result<RetrospectivePower, DomainError> {
    let n = control.participants.min(treatment.participants);

    if n == 0 {
        return Err(DomainError::computation(format!(
            "Retrospective power needs participants in '{}' and '{}'",
            control.variant_id, treatment.variant_id
        )));
    }

    let adjusted_alpha = bonferroni_alpha(alpha, variant_count);
    let observed_effect_size = cohens_h(control.rate(), treatment.rate());
    let power = achieved_power(observed_effect_size, n, adjusted_alpha)?;

    // Degenerate baselines have no defined sensitivity
    let sensitivity = if control.rate() > 0.0 && control.rate() < 1.0 {
        SENSITIVITY_POWER_LEVELS
            .iter()
            .map(|&level| {
                minimum_detectable_effect(control.rate(), n, alpha, level, variant_count).map(
                    |mde| SensitivityPoint {
                        power: level,
                        minimum_detectable_effect: mde,
                    },
                )
            })
            .collect::<Result<Vec<_>, _>>()?
    } else {
        SENSITIVITY_POWER_LEVELS
            .iter()
            .map(|&level| SensitivityPoint {
                power: level,
                minimum_detectable_effect: None,
            })
            .collect()
    };

    Ok(RetrospectivePower {
        control_id: control.variant_id.clone(),
        treatment_id: treatment.variant_id.clone(),
        observed_difference: treatment.rate() - control.rate(),
        observed_effect_size,
        sample_size_per_variant: n,
        significance_level: adjusted_alpha,
        achieved_power: power,
        sensitivity,
    })
}
