//! Collaborator seams: event publishing, error reporting and time

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::entity::{ExperimentId, StopReason, SubjectId, VariantId};
use super::interim::Recommendation;

#[cfg(test)]
use mockall::automock;

// ============================================================================
// ExperimentEvent
// ============================================================================

/// Structured event emitted on every state-changing operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExperimentEvent {
    ExperimentCreated {
        experiment_id: ExperimentId,
        variant_count: usize,
        timestamp: DateTime<Utc>,
    },
    AssignmentCreated {
        experiment_id: ExperimentId,
        subject_id: SubjectId,
        variant_id: VariantId,
        timestamp: DateTime<Utc>,
    },
    ConversionRecorded {
        experiment_id: ExperimentId,
        subject_id: SubjectId,
        variant_id: VariantId,
        metric: String,
        value: f64,
        timestamp: DateTime<Utc>,
    },
    InterimAnalysisPerformed {
        experiment_id: ExperimentId,
        analysis_number: u32,
        p_value: Option<f64>,
        recommendation: Recommendation,
        total_participants: u64,
        timestamp: DateTime<Utc>,
    },
    EarlyStoppingTriggered {
        experiment_id: ExperimentId,
        analysis_number: u32,
        reason: StopReason,
        timestamp: DateTime<Utc>,
    },
    ExperimentStopped {
        experiment_id: ExperimentId,
        reason: StopReason,
        total_participants: u64,
        timestamp: DateTime<Utc>,
    },
}

impl ExperimentEvent {
    /// Event name as published to telemetry
    pub fn name(&self) -> &'static str {
        match self {
            Self::ExperimentCreated { .. } => "experiment_created",
            Self::AssignmentCreated { .. } => "assignment_created",
            Self::ConversionRecorded { .. } => "conversion_recorded",
            Self::InterimAnalysisPerformed { .. } => "interim_analysis_performed",
            Self::EarlyStoppingTriggered { .. } => "early_stopping_triggered",
            Self::ExperimentStopped { .. } => "experiment_stopped",
        }
    }

    pub fn experiment_id(&self) -> &ExperimentId {
        match self {
            Self::ExperimentCreated { experiment_id, .. }
            | Self::AssignmentCreated { experiment_id, .. }
            | Self::ConversionRecorded { experiment_id, .. }
            | Self::InterimAnalysisPerformed { experiment_id, .. }
            | Self::EarlyStoppingTriggered { experiment_id, .. }
            | Self::ExperimentStopped { experiment_id, .. } => experiment_id,
        }
    }

    /// Payload as a plain JSON record
    pub fn payload(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

// ============================================================================
// Collaborator traits
// ============================================================================

/// Fire-and-forget sink for experiment events
#[cfg_attr(test, automock)]
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: &ExperimentEvent);
}

/// Sink for validation and computation failures
#[cfg_attr(test, automock)]
pub trait ErrorReporter: Send + Sync {
    fn report(&self, message: &str, source: &str, context: &Value);
}

/// Source of the current time
#[cfg_attr(test, automock)]
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}
