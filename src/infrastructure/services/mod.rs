//! Infrastructure services

mod analysis_strategy;
mod experiment_service;
mod interim_scheduler;

pub use analysis_strategy::{
    arm_counts, effective_rules, evaluate_next_interim, strategy_for, AnalysisStrategy,
    BayesianStrategy, FrequentistStrategy, SequentialStrategy,
};
pub use experiment_service::{
    CreateExperimentRequest, CreateVariantRequest, EngineSettings, ExperimentService,
    DEFAULT_MONITOR_INTERVAL_SECS,
};
pub use interim_scheduler::{InterimAnalysisScheduler, TickSummary};
