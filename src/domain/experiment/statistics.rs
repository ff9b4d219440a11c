//! Per-variant aggregated counters

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::entity::VariantId;

/// Metric recorded when the caller does not name one
pub const DEFAULT_METRIC: &str = "conversion";

// ============================================================================
// ConversionPolicy
// ============================================================================

/// How repeated conversions for the same (subject, metric) pair are counted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConversionPolicy {
    /// Only the first conversion per (subject, metric) is counted
    #[default]
    FirstPerSubject,
    /// Every conversion event and its value is counted
    AllowRepeated,
}

/// Result of recording a conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversionOutcome {
    /// The subject converted on this metric for the first time
    Recorded,
    /// A repeat event counted under `AllowRepeated`
    RecordedRepeat,
    /// A repeat event ignored under `FirstPerSubject`
    Duplicate,
}

impl ConversionOutcome {
    pub fn was_counted(&self) -> bool {
        !matches!(self, Self::Duplicate)
    }
}

// ============================================================================
// MetricTally
// ============================================================================

/// Counters for one named metric of one variant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricTally {
    /// Distinct subjects that converted on this metric
    pub converted_subjects: u64,
    /// Conversion events counted under the active policy
    pub events: u64,
    /// Sum of the values of counted events
    pub total_value: f64,
}

// ============================================================================
// VariantStatistics
// ============================================================================

/// Running participant and conversion counters for a variant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantStatistics {
    variant_id: VariantId,
    participants: u64,
    #[serde(default)]
    metrics: BTreeMap<String, MetricTally>,
}

impl VariantStatistics {
    /// Zero-initialized statistics for a variant
    pub fn new(variant_id: VariantId) -> Self {
        Self {
            variant_id,
            participants: 0,
            metrics: BTreeMap::new(),
        }
    }

    pub fn variant_id(&self) -> &VariantId {
        &self.variant_id
    }

    pub fn participants(&self) -> u64 {
        self.participants
    }

    pub fn metrics(&self) -> &BTreeMap<String, MetricTally> {
        &self.metrics
    }

    pub fn metric(&self, name: &str) -> Option<&MetricTally> {
        self.metrics.get(name)
    }

    /// Distinct converting subjects for a metric
    pub fn conversions(&self, metric: &str) -> u64 {
        self.metrics.get(metric).map_or(0, |m| m.converted_subjects)
    }

    /// Converting subjects divided by participants, 0 when nobody participated
    pub fn conversion_rate(&self, metric: &str) -> f64 {
        if self.participants == 0 {
            return 0.0;
        }
        self.conversions(metric) as f64 / self.participants as f64
    }

    pub(super) fn add_participant(&mut self) {
        self.participants += 1;
    }

    pub(super) fn add_conversion(&mut self, metric: &str, value: f64, first_for_subject: bool) {
        let tally = self.metrics.entry(metric.to_string()).or_default();

        if first_for_subject {
            tally.converted_subjects += 1;
        }

        tally.events += 1;
        tally.total_value += value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats() -> VariantStatistics {
        VariantStatistics::new(VariantId::new("control").unwrap())
    }

    #[test]
    fn test_zero_initialized() {
        let stats = stats();
        assert_eq!(stats.participants(), 0);
        assert_eq!(stats.conversions(DEFAULT_METRIC), 0);
        assert_eq!(stats.conversion_rate(DEFAULT_METRIC), 0.0);
    }

    #[test]
    fn test_conversion_rate() {
        let mut stats = stats();
        for _ in 0..4 {
            stats.add_participant();
        }
        stats.add_conversion(DEFAULT_METRIC, 1.0, true);

        assert_eq!(stats.conversions(DEFAULT_METRIC), 1);
        assert!((stats.conversion_rate(DEFAULT_METRIC) - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_repeat_conversion_counts_event_not_subject() {
        let mut stats = stats();
        stats.add_participant();
        stats.add_conversion("reply", 2.0, true);
        stats.add_conversion("reply", 3.0, false);

        let tally = stats.metric("reply").unwrap();
        assert_eq!(tally.converted_subjects, 1);
        assert_eq!(tally.events, 2);
        assert!((tally.total_value - 5.0).abs() < 1e-12);
        assert!((stats.conversion_rate("reply") - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_outcome_was_counted() {
        assert!(ConversionOutcome::Recorded.was_counted());
        assert!(ConversionOutcome::RecordedRepeat.was_counted());
        assert!(!ConversionOutcome::Duplicate.was_counted());
    }
}
