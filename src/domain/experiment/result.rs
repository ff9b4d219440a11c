//! Analysis result types produced by the statistics engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::entity::{AnalysisMethod, ExperimentId, ExperimentStatus, StopReason, VariantId};
use super::interim::InterimAnalysisRecord;
use super::statistics::{MetricTally, VariantStatistics};

// ============================================================================
// ArmCounts
// ============================================================================

/// Binomial counts for one variant, the input of every binomial analysis
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmCounts {
    pub variant_id: VariantId,
    pub participants: u64,
    pub conversions: u64,
}

impl ArmCounts {
    pub fn new(variant_id: VariantId, participants: u64, conversions: u64) -> Self {
        Self {
            variant_id,
            participants,
            conversions,
        }
    }

    /// Snapshot a variant's counters for the given metric
    pub fn from_statistics(stats: &VariantStatistics, metric: &str) -> Self {
        Self::new(
            stats.variant_id().clone(),
            stats.participants(),
            stats.conversions(metric),
        )
    }

    pub fn rate(&self) -> f64 {
        if self.participants == 0 {
            return 0.0;
        }
        self.conversions as f64 / self.participants as f64
    }

    pub fn failures(&self) -> u64 {
        self.participants.saturating_sub(self.conversions)
    }
}

// ============================================================================
// Frequentist results
// ============================================================================

/// Two-sided interval around an estimate
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub lower: f64,
    pub upper: f64,
    pub level: f64,
}

impl Interval {
    pub fn contains(&self, value: f64) -> bool {
        value >= self.lower && value <= self.upper
    }
}

/// Why a significance verdict was withheld
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsufficientReason {
    InsufficientSampleSize,
}

/// Non-exceptional result returned while a variant is below the sample minimum
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsufficientData {
    pub significant: bool,
    pub reason: InsufficientReason,
    pub min_sample_size: u64,
    pub smallest_sample: u64,
}

impl InsufficientData {
    pub fn new(min_sample_size: u64, smallest_sample: u64) -> Self {
        Self {
            significant: false,
            reason: InsufficientReason::InsufficientSampleSize,
            min_sample_size,
            smallest_sample,
        }
    }
}

/// Verdict withheld because the test statistic is not defined for the data,
/// e.g. every subject in every arm had the same outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UndefinedStatistic {
    pub significant: bool,
    pub reason: String,
}

impl UndefinedStatistic {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            significant: false,
            reason: reason.into(),
        }
    }
}

/// Pooled two-proportion z-test of treatment against control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZTestResult {
    pub control_id: VariantId,
    pub treatment_id: VariantId,
    pub control_rate: f64,
    pub treatment_rate: f64,
    /// Treatment rate minus control rate
    pub difference: f64,
    /// Difference relative to the control rate, absent when the control rate is 0
    pub relative_lift: Option<f64>,
    pub z_score: f64,
    pub p_value: f64,
    /// Threshold the p-value was compared against
    pub significance_level: f64,
    pub significant: bool,
    /// 95% interval on the difference using the unpooled standard error
    pub confidence_interval: Interval,
}

/// One-way ANOVA over Bernoulli outcomes with Bonferroni-corrected follow-ups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnovaResult {
    pub f_statistic: f64,
    pub df_between: u64,
    pub df_within: u64,
    pub ss_between: f64,
    pub ss_within: f64,
    pub p_value: f64,
    pub significance_level: f64,
    pub significant: bool,
    pub best_variant: VariantId,
    pub worst_variant: VariantId,
    /// Best rate minus worst rate
    pub absolute_effect: f64,
    /// Absolute effect relative to the worst rate, absent when that rate is 0
    pub relative_effect: Option<f64>,
    pub corrected_significance_level: f64,
    /// Pairwise tests, only run when the omnibus test is significant
    pub pairwise: Vec<ZTestResult>,
}

impl AnovaResult {
    pub fn comparison(&self, a: &VariantId, b: &VariantId) -> Option<&ZTestResult> {
        self.pairwise.iter().find(|t| {
            (&t.control_id == a && &t.treatment_id == b)
                || (&t.control_id == b && &t.treatment_id == a)
        })
    }
}

/// Outcome of the significance calculator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignificanceResult {
    InsufficientData(InsufficientData),
    Undefined(UndefinedStatistic),
    TwoSample(ZTestResult),
    MultiVariant(AnovaResult),
}

impl SignificanceResult {
    pub fn is_significant(&self) -> bool {
        match self {
            Self::InsufficientData(_) | Self::Undefined(_) => false,
            Self::TwoSample(result) => result.significant,
            Self::MultiVariant(result) => result.significant,
        }
    }

    /// The test's p-value; the omnibus one for multi-variant experiments
    pub fn p_value(&self) -> Option<f64> {
        match self {
            Self::InsufficientData(_) | Self::Undefined(_) => None,
            Self::TwoSample(result) => Some(result.p_value),
            Self::MultiVariant(result) => Some(result.p_value),
        }
    }
}

// ============================================================================
// Power analysis results
// ============================================================================

/// Prospective sample size plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSizePlan {
    pub baseline_rate: f64,
    pub minimum_detectable_effect: f64,
    pub target_rate: f64,
    /// Cohen's h
    pub effect_size: f64,
    pub significance_level: f64,
    pub adjusted_significance_level: f64,
    pub power: f64,
    pub variant_count: usize,
    pub sample_size_per_variant: u64,
    pub total_sample_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub days_to_target: Option<u64>,
}

/// Minimum detectable effect at a given power
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensitivityPoint {
    pub power: f64,
    /// Absent when no rate up to 1 reaches the requested power
    pub minimum_detectable_effect: Option<f64>,
}

/// Post-hoc power of an experiment; informational only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrospectivePower {
    pub control_id: VariantId,
    pub treatment_id: VariantId,
    pub observed_difference: f64,
    pub observed_effect_size: f64,
    pub sample_size_per_variant: u64,
    pub significance_level: f64,
    pub achieved_power: f64,
    pub sensitivity: Vec<SensitivityPoint>,
}

// ============================================================================
// Sequential results
// ============================================================================

/// Boundary for one planned look
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpendingPoint {
    pub analysis_number: u32,
    pub spent_alpha: f64,
    pub critical_value: f64,
}

// ============================================================================
// Bayesian results
// ============================================================================

/// Beta posterior for one variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Posterior {
    pub variant_id: VariantId,
    pub alpha: f64,
    pub beta: f64,
    pub mean: f64,
    pub variance: f64,
}

/// Beta-Binomial comparison of a treatment against the control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BayesianResult {
    pub control: Posterior,
    pub treatment: Posterior,
    pub probability_treatment_better: f64,
    /// Credible interval for the treatment's conversion rate
    pub credible_interval: Interval,
    pub expected_loss: f64,
}

// ============================================================================
// Reports
// ============================================================================

/// Output of an analysis strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum AnalysisOutcome {
    Frequentist { result: SignificanceResult },
    Sequential { preview: InterimAnalysisRecord },
    Bayesian { comparisons: Vec<BayesianResult> },
}

/// Per-variant summary in the final report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantSummary {
    pub variant_id: VariantId,
    pub name: String,
    pub control: bool,
    pub participants: u64,
    pub conversions: u64,
    pub conversion_rate: f64,
    pub metrics: BTreeMap<String, MetricTally>,
}

/// Final analysis computed from a stopped experiment's frozen statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub experiment_id: ExperimentId,
    pub name: String,
    pub status: ExperimentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    pub analysis_method: AnalysisMethod,
    pub primary_metric: String,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub analyzed_at: DateTime<Utc>,
    pub variants: Vec<VariantSummary>,
    pub significance: SignificanceResult,
    pub bayesian: Vec<BayesianResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrospective_power: Option<RetrospectivePower>,
    pub interim_analyses: Vec<InterimAnalysisRecord>,
}
