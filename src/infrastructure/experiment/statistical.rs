//! Frequentist significance testing for conversion experiments
//!
//! Two variants are compared with a pooled two-proportion z-test. Three or
//! more variants go through a one-way ANOVA over Bernoulli outcomes, followed
//! by Bonferroni-corrected pairwise z-tests when the omnibus test rejects.

use crate::domain::experiment::{
    AnovaResult, ArmCounts, ExperimentValidationError, InsufficientData, Interval,
    SignificanceResult, UndefinedStatistic, ZTestResult,
};
use crate::domain::DomainError;

use super::distributions::{f_survival, two_tailed_p_value};

/// Minimum participants per variant before a verdict is reported
pub const DEFAULT_MIN_SAMPLE_SIZE_PER_VARIANT: u64 = 30;

/// z value of the 95% confidence interval on the difference
const CONFIDENCE_Z: f64 = 1.96;
const CONFIDENCE_LEVEL: f64 = 0.95;

/// Bonferroni-corrected alpha for all pairwise comparisons among `variant_count` arms
pub fn bonferroni_alpha(alpha: f64, variant_count: usize) -> f64 {
    let comparisons = variant_count * variant_count.saturating_sub(1) / 2;

    if comparisons <= 1 {
        alpha
    } else {
        alpha / comparisons as f64
    }
}

/// Pooled two-proportion z-test of `treatment` against `control`
pub fn two_proportion_z_test(
    control: &ArmCounts,
    treatment: &ArmCounts,
    alpha: f64,
) -> Result<ZTestResult, DomainError> {
    if control.participants == 0 || treatment.participants == 0 {
        return Err(DomainError::computation(format!(
            "Cannot compare '{}' and '{}' without participants in both",
            control.variant_id, treatment.variant_id
        )));
    }

    let n_a = control.participants as f64;
    let n_b = treatment.participants as f64;
    let p_a = control.rate();
    let p_b = treatment.rate();

    let pooled = (control.conversions + treatment.conversions) as f64 / (n_a + n_b);
    let se = (pooled * (1.0 - pooled) * (1.0 / n_a + 1.0 / n_b)).sqrt();

    if !(se > 0.0) {
        return Err(DomainError::computation(format!(
            "Zero variance comparing '{}' and '{}': pooled rate is {}",
            control.variant_id, treatment.variant_id, pooled
        )));
    }

    let difference = p_b - p_a;
    let z_score = difference / se;
    let p_value = two_tailed_p_value(z_score);

    let unpooled_se = (p_a * (1.0 - p_a) / n_a + p_b * (1.0 - p_b) / n_b).sqrt();
    let margin = CONFIDENCE_Z * unpooled_se;

    Ok(ZTestResult {
        control_id: control.variant_id.clone(),
        treatment_id: treatment.variant_id.clone(),
        control_rate: p_a,
        treatment_rate: p_b,
        difference,
        relative_lift: (p_a > 0.0).then(|| difference / p_a),
        z_score,
        p_value,
        significance_level: alpha,
        significant: p_value < alpha,
        confidence_interval: Interval {
            lower: difference - margin,
            upper: difference + margin,
            level: CONFIDENCE_LEVEL,
        },
    })
}

/// One-way ANOVA across all arms with pairwise follow-ups
pub fn one_way_anova(arms: &[ArmCounts], alpha: f64) -> Result<AnovaResult, DomainError> {
    let k = arms.len();

    if k < 2 {
        return Err(ExperimentValidationError::InsufficientVariants.into());
    }

    let total: u64 = arms.iter().map(|a| a.participants).sum();
    let total_conversions: u64 = arms.iter().map(|a| a.conversions).sum();

    if total <= k as u64 || arms.iter().any(|a| a.participants == 0) {
        return Err(DomainError::computation(format!(
            "ANOVA needs participants in every variant and more than {} in total, got {}",
            k, total
        )));
    }

    let grand_rate = total_conversions as f64 / total as f64;

    let ss_between: f64 = arms
        .iter()
        .map(|a| a.participants as f64 * (a.rate() - grand_rate).powi(2))
        .sum();
    let ss_within: f64 = arms
        .iter()
        .map(|a| a.participants as f64 * a.rate() * (1.0 - a.rate()))
        .sum();

    let df_between = (k - 1) as u64;
    let df_within = total - k as u64;

    let ms_between = ss_between / df_between as f64;
    let ms_within = ss_within / df_within as f64;

    if !(ms_within > 0.0) {
        return Err(DomainError::computation(
            "Zero within-group variance: every variant converts at 0% or 100%",
        ));
    }

    let f_statistic = ms_between / ms_within;
    let p_value = f_survival(f_statistic, df_between as f64, df_within as f64)?;
    let significant = p_value < alpha;

    let best = extreme_arm(arms, |candidate, current| candidate > current);
    let worst = extreme_arm(arms, |candidate, current| candidate < current);
    let absolute_effect = best.rate() - worst.rate();

    let corrected = bonferroni_alpha(alpha, k);
    let pairwise = if significant {
        pairwise_tests(arms, corrected)?
    } else {
        Vec::new()
    };

    Ok(AnovaResult {
        f_statistic,
        df_between,
        df_within,
        ss_between,
        ss_within,
        p_value,
        significance_level: alpha,
        significant,
        best_variant: best.variant_id.clone(),
        worst_variant: worst.variant_id.clone(),
        absolute_effect,
        relative_effect: (worst.rate() > 0.0).then(|| absolute_effect / worst.rate()),
        corrected_significance_level: corrected,
        pairwise,
    })
}

/// All pairwise z-tests at the given (already corrected) alpha
pub fn pairwise_tests(arms: &[ArmCounts], alpha: f64) -> Result<Vec<ZTestResult>, DomainError> {
    let mut results = Vec::with_capacity(arms.len() * arms.len().saturating_sub(1) / 2);

    for (i, first) in arms.iter().enumerate() {
        for second in &arms[i + 1..] {
            results.push(two_proportion_z_test(first, second, alpha)?);
        }
    }

    Ok(results)
}

/// Significance of an experiment's arms, control first
///
/// Returns `InsufficientData` while any arm has fewer than
/// `min_sample_size` participants.
pub fn calculate_significance(
    arms: &[ArmCounts],
    alpha: f64,
    min_sample_size: u64,
) -> Result<SignificanceResult, DomainError> {
    if arms.len() < 2 {
        return Err(ExperimentValidationError::InsufficientVariants.into());
    }

    let smallest = arms.iter().map(|a| a.participants).min().unwrap_or(0);

    if smallest < min_sample_size {
        return Ok(SignificanceResult::InsufficientData(InsufficientData::new(
            min_sample_size,
            smallest,
        )));
    }

    match arms {
        [control, treatment] => Ok(SignificanceResult::TwoSample(two_proportion_z_test(
            control, treatment, alpha,
        )?)),
        _ => Ok(SignificanceResult::MultiVariant(one_way_anova(arms, alpha)?)),
    }
}

/// Like `calculate_significance`, but a statistic that is not defined for the
/// data (zero variance, empty arms) becomes `Undefined` instead of an error
///
/// Used where a verdict must still be recorded, such as interim looks and the
/// final report.
pub fn significance_or_undefined(
    arms: &[ArmCounts],
    alpha: f64,
    min_sample_size: u64,
) -> Result<SignificanceResult, DomainError> {
    match calculate_significance(arms, alpha, min_sample_size) {
        Err(DomainError::Computation { message }) => {
            Ok(SignificanceResult::Undefined(UndefinedStatistic::new(message)))
        }
        other => other,
    }
}

/// First arm whose rate beats every other under `better`
fn extreme_arm(arms: &[ArmCounts], better: impl Fn(f64, f64) -> bool) -> &ArmCounts {
    let mut chosen = &arms[0];

    for arm in &arms[1..] {
        if better(arm.rate(), chosen.rate()) {
            chosen = arm;
        }
    }

    chosen
}
