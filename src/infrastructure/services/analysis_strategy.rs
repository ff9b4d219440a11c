//! Pluggable analysis strategies selected by an experiment's analysis method

use chrono::{DateTime, Utc};

use crate::domain::experiment::{
    AnalysisMethod, AnalysisOutcome, ArmCounts, EarlyStoppingRules, Experiment,
    InterimAnalysisRecord,
};
use crate::domain::DomainError;
use crate::infrastructure::experiment::{
    bayesian_compare_all, calculate_significance, evaluate_interim, InterimInput,
};

use super::experiment_service::EngineSettings;

/// Arm counts for the primary metric, control first
pub fn arm_counts(experiment: &Experiment) -> Vec<ArmCounts> {
    let metric = experiment.primary_metric();
    let control_id = experiment.control_variant().map(|v| v.id().clone());

    let mut arms: Vec<ArmCounts> = experiment
        .statistics()
        .iter()
        .map(|stats| ArmCounts::from_statistics(stats, metric))
        .collect();

    if let Some(position) = arms
        .iter()
        .position(|arm| Some(&arm.variant_id) == control_id.as_ref())
    {
        let control = arms.remove(position);
        arms.insert(0, control);
    }

    arms
}

/// Early-stopping rules of an experiment, or the configured defaults
pub fn effective_rules(experiment: &Experiment, settings: &EngineSettings) -> EarlyStoppingRules {
    experiment
        .early_stopping()
        .cloned()
        .unwrap_or_else(|| settings.default_early_stopping())
}

/// Evaluate the next interim look without recording it
pub fn evaluate_next_interim(
    experiment: &Experiment,
    settings: &EngineSettings,
    now: DateTime<Utc>,
) -> Result<InterimAnalysisRecord, DomainError> {
    let rules = effective_rules(experiment, settings);
    let arms = arm_counts(experiment);

    evaluate_interim(&InterimInput {
        rules: &rules,
        significance_level: experiment.significance_level(),
        min_sample_size_per_variant: settings.min_sample_size_per_variant,
        arms: &arms,
        analysis_number: experiment.next_analysis_number(),
        elapsed: experiment.elapsed(now),
        timestamp: now,
    })
}

/// A read-only analysis over a snapshot of an experiment
pub trait AnalysisStrategy: Send + Sync {
    fn method(&self) -> AnalysisMethod;

    fn analyze(
        &self,
        experiment: &Experiment,
        settings: &EngineSettings,
        now: DateTime<Utc>,
    ) -> Result<AnalysisOutcome, DomainError>;
}

/// Fixed-horizon z-test or ANOVA
#[derive(Debug, Clone, Copy, Default)]
pub struct FrequentistStrategy;

impl AnalysisStrategy for FrequentistStrategy {
    fn method(&self) -> AnalysisMethod {
        AnalysisMethod::Frequentist
    }

    fn analyze(
        &self,
        experiment: &Experiment,
        settings: &EngineSettings,
        _now: DateTime<Utc>,
    ) -> Result<AnalysisOutcome, DomainError> {
        let result = calculate_significance(
            &arm_counts(experiment),
            experiment.significance_level(),
            settings.min_sample_size_per_variant,
        )?;

        Ok(AnalysisOutcome::Frequentist { result })
    }
}

/// Preview of the decision the next interim analysis would make
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialStrategy;

impl AnalysisStrategy for SequentialStrategy {
    fn method(&self) -> AnalysisMethod {
        AnalysisMethod::Sequential
    }

    fn analyze(
        &self,
        experiment: &Experiment,
        settings: &EngineSettings,
        now: DateTime<Utc>,
    ) -> Result<AnalysisOutcome, DomainError> {
        Ok(AnalysisOutcome::Sequential {
            preview: evaluate_next_interim(experiment, settings, now)?,
        })
    }
}

/// Beta-Binomial comparison of every treatment against the control
#[derive(Debug, Clone, Copy, Default)]
pub struct BayesianStrategy;

impl AnalysisStrategy for BayesianStrategy {
    fn method(&self) -> AnalysisMethod {
        AnalysisMethod::Bayesian
    }

    fn analyze(
        &self,
        experiment: &Experiment,
        settings: &EngineSettings,
        _now: DateTime<Utc>,
    ) -> Result<AnalysisOutcome, DomainError> {
        let arms = arm_counts(experiment);

        let (control, treatments) = arms
            .split_first()
            .ok_or_else(|| DomainError::computation("Experiment has no variants to compare"))?;

        Ok(AnalysisOutcome::Bayesian {
            comparisons: bayesian_compare_all(control, treatments, settings.credible_level)?,
        })
    }
}

/// Strategy for an analysis method
pub fn strategy_for(method: AnalysisMethod) -> Box<dyn AnalysisStrategy> {
    match method {
        AnalysisMethod::Frequentist => Box::new(FrequentistStrategy),
        AnalysisMethod::Sequential => Box::new(SequentialStrategy),
        AnalysisMethod::Bayesian => Box::new(BayesianStrategy),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::experiment::{
        Assignment, ConversionPolicy, ExperimentId, SubjectId, Variant, VariantId, DEFAULT_METRIC,
    };
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 0, 0, 0).unwrap()
    }

    /// Active experiment where the control is listed second
    fn populated(method: AnalysisMethod, counts: &[(&str, u64, u64)]) -> Experiment {
        let mut experiment = Experiment::new(ExperimentId::new("strategy").unwrap(), "Strategy", now())
            .with_analysis_method(method)
            .with_traffic_split(vec![100.0 / counts.len() as f64; counts.len()]);

        for (i, (id, _, _)) in counts.iter().enumerate() {
            experiment = experiment.with_variant(
                Variant::new(VariantId::new(*id).unwrap(), *id).with_control(i == 1),
            );
        }

        experiment.start(now()).unwrap();

        for (id, participants, conversions) in counts {
            for n in 0..*participants {
                let subject = SubjectId::new(format!("{}-{}", id, n)).unwrap();
                experiment
                    .record_assignment(Assignment::new(
                        experiment.id().clone(),
                        subject.clone(),
                        VariantId::new(*id).unwrap(),
                        now(),
                    ))
                    .unwrap();

                if n < *conversions {
                    experiment
                        .record_conversion(
                            &subject,
                            DEFAULT_METRIC,
                            1.0,
                            ConversionPolicy::default(),
                            now(),
                        )
                        .unwrap();
                }
            }
        }

        experiment
    }

    #[test]
    fn test_arm_counts_put_control_first() {
        let experiment = populated(AnalysisMethod::Frequentist, &[("b", 40, 4), ("a", 40, 8)]);
        let arms = arm_counts(&experiment);

        assert_eq!(arms[0].variant_id.as_str(), "a");
        assert_eq!(arms[0].conversions, 8);
        assert_eq!(arms[1].variant_id.as_str(), "b");
    }

    #[test]
    fn test_strategy_for_method() {
        for method in [
            AnalysisMethod::Frequentist,
            AnalysisMethod::Sequential,
            AnalysisMethod::Bayesian,
        ] {
            assert_eq!(strategy_for(method).method(), method);
        }
    }

    #[test]
    fn test_frequentist_strategy() {
        let experiment = populated(AnalysisMethod::Frequentist, &[("b", 100, 40), ("a", 100, 20)]);
        let outcome = FrequentistStrategy
            .analyze(&experiment, &EngineSettings::default(), now())
            .unwrap();

        match outcome {
            AnalysisOutcome::Frequentist { result } => assert!(result.is_significant()),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_sequential_preview_does_not_record() {
        let experiment = populated(AnalysisMethod::Sequential, &[("b", 30, 15), ("a", 30, 3)]);
        let outcome = SequentialStrategy
            .analyze(&experiment, &EngineSettings::default(), now())
            .unwrap();

        match outcome {
            AnalysisOutcome::Sequential { preview } => {
                assert_eq!(preview.analysis_number, 1);
                assert_eq!(preview.total_participants, 60);
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        assert!(experiment.interim_analyses().is_empty());
    }

    #[test]
    fn test_bayesian_strategy_compares_against_control() {
        let experiment = populated(AnalysisMethod::Bayesian, &[("b", 200, 60), ("a", 200, 30)]);
        let outcome = BayesianStrategy
            .analyze(&experiment, &EngineSettings::default(), now())
            .unwrap();

        match outcome {
            AnalysisOutcome::Bayesian { comparisons } => {
                assert_eq!(comparisons.len(), 1);
                assert_eq!(comparisons[0].control.variant_id.as_str(), "a");
                assert!(comparisons[0].probability_treatment_better > 0.99);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
