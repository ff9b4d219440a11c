//! Experiment domain module
//!
//! Types and traits for running controlled experiments: the experiment
//! aggregate and its lifecycle, sticky subject assignment, per-variant
//! counters, early-stopping rules and the results produced by the
//! statistics engine.

mod assignment;
mod entity;
mod events;
mod interim;
mod repository;
mod result;
mod statistics;
mod validation;

pub use assignment::{
    matches_all, Assignment, AssignmentContext, AssignmentMode, TargetingOperator, TargetingRule,
};
pub use entity::{
    AnalysisMethod, Experiment, ExperimentId, ExperimentStatus, StopReason, SubjectId, Variant,
    VariantId, DEFAULT_POWER, DEFAULT_SIGNIFICANCE_LEVEL,
};
pub use events::{Clock, ErrorReporter, EventPublisher, ExperimentEvent};
pub use interim::{
    AlphaSpending, EarlyStoppingRules, InterimAnalysisRecord, Recommendation,
    DEFAULT_PLANNED_ANALYSES, DEFAULT_SEQUENTIAL_MIN_SAMPLE_SIZE,
};
pub use repository::{ExperimentQuery, ExperimentRepository};
pub use result::{
    AnalysisOutcome, AnovaResult, ArmCounts, BayesianResult, ExperimentReport, InsufficientData,
    InsufficientReason, Interval, Posterior, RetrospectivePower, SampleSizePlan,
    SensitivityPoint, SignificanceResult, SpendingPoint, UndefinedStatistic, VariantSummary,
    ZTestResult,
};
pub use statistics::{
    ConversionOutcome, ConversionPolicy, MetricTally, VariantStatistics, DEFAULT_METRIC,
};
pub use validation::{
    equal_traffic_split, validate_experiment_id, validate_positive, validate_probability,
    validate_subject_id, validate_traffic_split, validate_variant_id, ExperimentValidationError,
    MAX_EXPERIMENT_ID_LENGTH, TRAFFIC_SPLIT_TOLERANCE,
};

#[cfg(test)]
pub use events::{MockClock, MockErrorReporter, MockEventPublisher};
#[cfg(test)]
pub use repository::mock::MockExperimentRepository;
