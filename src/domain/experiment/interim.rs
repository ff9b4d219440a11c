//! Early-stopping rules and the interim analysis audit trail

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::entity::StopReason;
use super::validation::{validate_probability, ExperimentValidationError};

/// Default minimum total sample size before any stopping decision is made
pub const DEFAULT_SEQUENTIAL_MIN_SAMPLE_SIZE: u64 = 50;

/// Default number of planned interim analyses
pub const DEFAULT_PLANNED_ANALYSES: u32 = 5;

// ============================================================================
// AlphaSpending
// ============================================================================

/// Alpha-spending function allocating the type-I error budget across looks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AlphaSpending {
    /// Conservative early, spends most of the budget late
    #[default]
    OBrienFleming,
    /// Spends the budget linearly
    Pocock,
    /// Fixed tiny boundary at every interim look, full alpha at the final one
    HaybittlePeto,
}

impl AlphaSpending {
    /// Cumulative alpha spent at analysis `k` of `planned`
    ///
    /// `k` is clamped to `1..=planned`.
    pub fn spent_alpha(&self, alpha: f64, k: u32, planned: u32) -> f64 {
        let planned = planned.max(1);
        let k = k.clamp(1, planned);
        let information = f64::from(k) / f64::from(planned);

        match self {
            Self::OBrienFleming => alpha * (1.0 - (-1.96 * information.sqrt()).exp()),
            Self::Pocock => alpha * information,
            Self::HaybittlePeto => {
                if k < planned {
                    alpha * 0.001
                } else {
                    alpha
                }
            }
        }
    }
}

impl fmt::Display for AlphaSpending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OBrienFleming => write!(f, "obrien_fleming"),
            Self::Pocock => write!(f, "pocock"),
            Self::HaybittlePeto => write!(f, "haybittle_peto"),
        }
    }
}

// ============================================================================
// EarlyStoppingRules
// ============================================================================

/// Configuration for sequential monitoring of an experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarlyStoppingRules {
    /// Number of planned interim analyses (K)
    #[serde(default = "default_planned_analyses")]
    pub planned_analyses: u32,
    /// Spending function used to derive boundaries
    #[serde(default)]
    pub spending_function: AlphaSpending,
    /// Minimum total participants before any boundary is checked
    #[serde(default = "default_min_sample_size")]
    pub min_sample_size: u64,
    /// Explicit p-value boundary for superiority; overrides the spent alpha
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub superiority_boundary: Option<f64>,
    /// p-values above this boundary stop the experiment for futility
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub futility_boundary: Option<f64>,
    /// Maximum running time in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration_secs: Option<u64>,
    /// Planned total sample size; reaching it stops the experiment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sample_size: Option<u64>,
}

fn default_planned_analyses() -> u32 {
    DEFAULT_PLANNED_ANALYSES
}

fn default_min_sample_size() -> u64 {
    DEFAULT_SEQUENTIAL_MIN_SAMPLE_SIZE
}

impl Default for EarlyStoppingRules {
    fn default() -> Self {
        Self {
            planned_analyses: DEFAULT_PLANNED_ANALYSES,
            spending_function: AlphaSpending::default(),
            min_sample_size: DEFAULT_SEQUENTIAL_MIN_SAMPLE_SIZE,
            superiority_boundary: None,
            futility_boundary: None,
            max_duration_secs: None,
            max_sample_size: None,
        }
    }
}

impl EarlyStoppingRules {
    pub fn with_spending_function(mut self, spending_function: AlphaSpending) -> Self {
        self.spending_function = spending_function;
        self
    }

    pub fn with_planned_analyses(mut self, planned_analyses: u32) -> Self {
        self.planned_analyses = planned_analyses;
        self
    }

    pub fn with_min_sample_size(mut self, min_sample_size: u64) -> Self {
        self.min_sample_size = min_sample_size;
        self
    }

    pub fn with_superiority_boundary(mut self, boundary: f64) -> Self {
        self.superiority_boundary = Some(boundary);
        self
    }

    pub fn with_futility_boundary(mut self, boundary: f64) -> Self {
        self.futility_boundary = Some(boundary);
        self
    }

    pub fn with_max_duration_secs(mut self, secs: u64) -> Self {
        self.max_duration_secs = Some(secs);
        self
    }

    pub fn with_max_sample_size(mut self, max_sample_size: u64) -> Self {
        self.max_sample_size = Some(max_sample_size);
        self
    }

    pub fn validate(&self) -> Result<(), ExperimentValidationError> {
        if self.planned_analyses == 0 {
            return Err(ExperimentValidationError::InvalidPlannedAnalyses);
        }

        if let Some(boundary) = self.superiority_boundary {
            validate_probability("superiority boundary", boundary)?;
        }

        if let Some(boundary) = self.futility_boundary {
            validate_probability("futility boundary", boundary)?;
        }

        Ok(())
    }
}

// ============================================================================
// InterimAnalysisRecord
// ============================================================================

/// Outcome of a single interim look
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recommendation {
    Continue,
    StopEfficacy,
    StopFutility,
    StopFinal,
}

impl Recommendation {
    pub fn should_stop(&self) -> bool {
        !matches!(self, Self::Continue)
    }
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continue => write!(f, "continue"),
            Self::StopEfficacy => write!(f, "stop_efficacy"),
            Self::StopFutility => write!(f, "stop_futility"),
            Self::StopFinal => write!(f, "stop_final"),
        }
    }
}

/// Immutable audit record appended on every interim analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterimAnalysisRecord {
    pub analysis_number: u32,
    pub spent_alpha: f64,
    pub remaining_alpha: f64,
    pub critical_value: f64,
    /// Observed p-value, absent when the sample was too small to test
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_value: Option<f64>,
    /// Why the test statistic was undefined although the sample was large enough
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub untestable_reason: Option<String>,
    pub recommendation: Recommendation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    pub total_participants: u64,
    pub timestamp: DateTime<Utc>,
}
