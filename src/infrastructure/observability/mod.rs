//! Observability infrastructure - engine counters

mod metrics;

pub use metrics::{
    record_assignment, record_conversion, record_early_stop, record_interim_analysis,
    record_reported_error,
};
