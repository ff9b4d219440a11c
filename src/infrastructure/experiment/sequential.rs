//! Sequential monitoring with alpha spending and early stopping

use chrono::{DateTime, Duration, Utc};

use crate::domain::experiment::{
    AlphaSpending, ArmCounts, EarlyStoppingRules, ExperimentValidationError,
    InterimAnalysisRecord, Recommendation, SignificanceResult, SpendingPoint, StopReason,
};
use crate::domain::DomainError;

use super::distributions::two_sided_critical_value;
use super::statistical::significance_or_undefined;

/// Boundaries for every planned look
pub fn spending_schedule(
    function: AlphaSpending,
    alpha: f64,
    planned_analyses: u32,
) -> Result<Vec<SpendingPoint>, DomainError> {
    if planned_analyses == 0 {
        return Err(ExperimentValidationError::InvalidPlannedAnalyses.into());
    }

    (1..=planned_analyses)
        .map(|k| {
            let spent_alpha = function.spent_alpha(alpha, k, planned_analyses);

            Ok(SpendingPoint {
                analysis_number: k,
                spent_alpha,
                critical_value: two_sided_critical_value(spent_alpha)?,
            })
        })
        .collect()
}

/// Snapshot evaluated by one interim analysis
#[derive(Debug, Clone)]
pub struct InterimInput<'a> {
    pub rules: &'a EarlyStoppingRules,
    pub significance_level: f64,
    /// Per-variant minimum used by the significance test
    pub min_sample_size_per_variant: u64,
    pub arms: &'a [ArmCounts],
    pub analysis_number: u32,
    pub elapsed: Option<Duration>,
    pub timestamp: DateTime<Utc>,
}

/// Evaluate one interim look and produce its audit record
///
/// Decision order: maximum duration, minimum total sample size, superiority,
/// futility, planned sample size or final look, otherwise continue.
pub fn evaluate_interim(input: &InterimInput<'_>) -> Result<InterimAnalysisRecord, DomainError> {
    let rules = input.rules;
    let alpha = input.significance_level;

    let spent_alpha = rules
        .spending_function
        .spent_alpha(alpha, input.analysis_number, rules.planned_analyses);
    let critical_value = two_sided_critical_value(spent_alpha)?;
    let total_participants: u64 = input.arms.iter().map(|a| a.participants).sum();

    let record = |p_value: Option<f64>,
                  untestable_reason: Option<String>,
                  recommendation,
                  stop_reason| InterimAnalysisRecord {
        analysis_number: input.analysis_number,
        spent_alpha,
        remaining_alpha: (alpha - spent_alpha).max(0.0),
        critical_value,
        p_value,
        untestable_reason,
        recommendation,
        stop_reason,
        total_participants,
        timestamp: input.timestamp,
    };

    if let (Some(max_secs), Some(elapsed)) = (rules.max_duration_secs, input.elapsed) {
        if elapsed.num_seconds() >= 0 && elapsed.num_seconds() as u64 > max_secs {
            return Ok(record(
                None,
                None,
                Recommendation::StopFinal,
                Some(StopReason::Duration),
            ));
        }
    }

    if total_participants < rules.min_sample_size {
        return Ok(record(None, None, Recommendation::Continue, None));
    }

    // An undefined statistic carries no evidence either way; the look still
    // counts toward the planned sample size and final look below
    let (p_value, untestable_reason) = match significance_or_undefined(
        input.arms,
        alpha,
        input.min_sample_size_per_variant,
    )? {
        SignificanceResult::Undefined(undefined) => (None, Some(undefined.reason)),
        result => (result.p_value(), None),
    };

    if let Some(p) = p_value {
        let boundary = rules.superiority_boundary.unwrap_or(spent_alpha);

        if p < boundary {
            return Ok(record(
                Some(p),
                None,
                Recommendation::StopEfficacy,
                Some(StopReason::Superiority),
            ));
        }

        if rules.futility_boundary.is_some_and(|futility| p > futility) {
            return Ok(record(
                Some(p),
                None,
                Recommendation::StopFutility,
                Some(StopReason::Futility),
            ));
        }
    }

    let sample_exhausted = rules
        .max_sample_size
        .is_some_and(|max| total_participants >= max);

    if sample_exhausted || input.analysis_number >= rules.planned_analyses {
        return Ok(record(
            p_value,
            untestable_reason,
            Recommendation::StopFinal,
            Some(StopReason::SampleSize),
        ));
    }

    Ok(record(p_value, untestable_reason, Recommendation::Continue, None))
}
