//! Counters emitted through the `metrics` facade
//!
//! Nothing is recorded unless the host installs a recorder.

use metrics::counter;

use crate::domain::experiment::{ConversionOutcome, Recommendation, StopReason};

pub fn record_assignment(experiment_id: &str, variant_id: &str) {
    let labels = [
        ("experiment", experiment_id.to_string()),
        ("variant", variant_id.to_string()),
    ];

    counter!("experiment_assignments_total", &labels).increment(1);
}

pub fn record_conversion(experiment_id: &str, metric: &str, outcome: ConversionOutcome) {
    let outcome = match outcome {
        ConversionOutcome::Recorded => "recorded",
        ConversionOutcome::RecordedRepeat => "repeat",
        ConversionOutcome::Duplicate => "duplicate",
    };

    let labels = [
        ("experiment", experiment_id.to_string()),
        ("metric", metric.to_string()),
        ("outcome", outcome.to_string()),
    ];

    counter!("experiment_conversions_total", &labels).increment(1);
}

pub fn record_interim_analysis(experiment_id: &str, recommendation: Recommendation) {
    let labels = [
        ("experiment", experiment_id.to_string()),
        ("recommendation", recommendation.to_string()),
    ];

    counter!("experiment_interim_analyses_total", &labels).increment(1);
}

pub fn record_early_stop(experiment_id: &str, reason: StopReason) {
    let labels = [
        ("experiment", experiment_id.to_string()),
        ("reason", reason.to_string()),
    ];

    counter!("experiment_early_stops_total", &labels).increment(1);
}

pub fn record_reported_error(source: &str) {
    counter!("experiment_errors_total", "source" => source.to_string()).increment(1);
}
