//! PMP Experiment Engine
//!
//! Controlled experiments with statistically sound analysis:
//! - Sticky, deterministic subject assignment with targeting rules
//! - Per-variant participant and conversion aggregation
//! - Two-proportion z-tests, one-way ANOVA with Bonferroni-corrected pairwise tests
//! - Sample size, minimum detectable effect and retrospective power
//! - Sequential monitoring with alpha spending and early stopping
//! - Beta-Binomial posterior comparison

pub mod cli;
pub mod config;
pub mod domain;
pub mod infrastructure;

pub use config::AppConfig;
pub use domain::DomainError;
pub use infrastructure::services::{EngineSettings, ExperimentService, InterimAnalysisScheduler};
