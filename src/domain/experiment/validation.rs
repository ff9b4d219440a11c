//! Experiment validation utilities

use thiserror::Error;

use crate::domain::DomainError;

/// Maximum length for experiment IDs
pub const MAX_EXPERIMENT_ID_LENGTH: usize = 50;

/// Maximum length for variant IDs
pub const MAX_VARIANT_ID_LENGTH: usize = 50;

/// Maximum length for opaque subject identifiers
pub const MAX_SUBJECT_ID_LENGTH: usize = 256;

/// Allowed deviation of the traffic split total from 100
pub const TRAFFIC_SPLIT_TOLERANCE: f64 = 1e-6;

/// Validation errors for experiments, variants and analysis parameters
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExperimentValidationError {
    #[error("Experiment ID cannot be empty")]
    EmptyId,

    #[error("Experiment ID exceeds maximum length of {0} characters")]
    IdTooLong(usize),

    #[error("Experiment ID must start and end with a letter or number")]
    InvalidIdBoundary,

    #[error("Experiment ID contains invalid character: '{0}'")]
    InvalidIdCharacter(char),

    #[error("Experiment ID cannot contain consecutive hyphens")]
    ConsecutiveHyphens,

    #[error("Variant ID cannot be empty")]
    EmptyVariantId,

    #[error("Variant ID exceeds maximum length of {0} characters")]
    VariantIdTooLong(usize),

    #[error("Variant ID must start and end with a letter or number")]
    InvalidVariantIdBoundary,

    #[error("Variant ID contains invalid character: '{0}'")]
    InvalidVariantIdCharacter(char),

    #[error("Variant ID cannot contain consecutive hyphens")]
    VariantIdConsecutiveHyphens,

    #[error("Subject ID must be between 1 and {0} characters")]
    InvalidSubjectId(usize),

    #[error("Metric name cannot be empty")]
    EmptyMetricName,

    #[error("Experiment must have at least 2 variants")]
    InsufficientVariants,

    #[error("Duplicate variant ID: '{0}'")]
    DuplicateVariantId(String),

    #[error("Traffic split has {got} entries but experiment has {expected} variants")]
    TrafficSplitLength { expected: usize, got: usize },

    #[error("Traffic split weights must be non-negative, got {0}")]
    NegativeTrafficWeight(f64),

    #[error("Traffic split must sum to 100%, got {0}")]
    InvalidTrafficSum(f64),

    #[error("{name} must be in (0, 1), got {value}")]
    ProbabilityOutOfRange { name: &'static str, value: f64 },

    #[error("{name} must be positive, got {value}")]
    NonPositive { name: &'static str, value: f64 },

    #[error("Baseline rate plus effect must stay below 1, got {0}")]
    EffectExceedsUnitRange(f64),

    #[error("Planned number of interim analyses must be at least 1")]
    InvalidPlannedAnalyses,

    #[error("Invalid experiment status transition from {0} to {1}")]
    InvalidStatusTransition(String, String),
}

impl From<ExperimentValidationError> for DomainError {
    fn from(error: ExperimentValidationError) -> Self {
        DomainError::validation(error.to_string())
    }
}

enum IdentifierProblem {
    Empty,
    TooLong,
    Boundary,
    Character(char),
    ConsecutiveHyphens,
}

fn check_identifier(id: &str, max_len: usize) -> Result<(), IdentifierProblem> {
    if id.is_empty() {
        return Err(IdentifierProblem::Empty);
    }

    if id.len() > max_len {
        return Err(IdentifierProblem::TooLong);
    }

    let starts_ok = id.chars().next().is_some_and(|c| c.is_ascii_alphanumeric());
    let ends_ok = id.chars().last().is_some_and(|c| c.is_ascii_alphanumeric());

    if !starts_ok || !ends_ok {
        return Err(IdentifierProblem::Boundary);
    }

    let mut prev_was_hyphen = false;

    for ch in id.chars() {
        if ch == '-' {
            if prev_was_hyphen {
                return Err(IdentifierProblem::ConsecutiveHyphens);
            }
            prev_was_hyphen = true;
        } else if ch.is_ascii_alphanumeric() || ch == '_' {
            prev_was_hyphen = false;
        } else {
            return Err(IdentifierProblem::Character(ch));
        }
    }

    Ok(())
}

/// Validate an experiment ID
pub fn validate_experiment_id(id: &str) -> Result<(), ExperimentValidationError> {
    check_identifier(id, MAX_EXPERIMENT_ID_LENGTH).map_err(|problem| match problem {
        IdentifierProblem::Empty => ExperimentValidationError::EmptyId,
        IdentifierProblem::TooLong => ExperimentValidationError::IdTooLong(MAX_EXPERIMENT_ID_LENGTH),
        IdentifierProblem::Boundary => ExperimentValidationError::InvalidIdBoundary,
        IdentifierProblem::Character(ch) => ExperimentValidationError::InvalidIdCharacter(ch),
        IdentifierProblem::ConsecutiveHyphens => ExperimentValidationError::ConsecutiveHyphens,
    })
}

/// Validate a variant ID
pub fn validate_variant_id(id: &str) -> Result<(), ExperimentValidationError> {
    check_identifier(id, MAX_VARIANT_ID_LENGTH).map_err(|problem| match problem {
        IdentifierProblem::Empty => ExperimentValidationError::EmptyVariantId,
        IdentifierProblem::TooLong => {
            ExperimentValidationError::VariantIdTooLong(MAX_VARIANT_ID_LENGTH)
        }
        IdentifierProblem::Boundary => ExperimentValidationError::InvalidVariantIdBoundary,
        IdentifierProblem::Character(ch) => ExperimentValidationError::InvalidVariantIdCharacter(ch),
        IdentifierProblem::ConsecutiveHyphens => {
            ExperimentValidationError::VariantIdConsecutiveHyphens
        }
    })
}

/// Validate an opaque subject identifier supplied by the caller
pub fn validate_subject_id(id: &str) -> Result<(), ExperimentValidationError> {
    if id.is_empty() || id.len() > MAX_SUBJECT_ID_LENGTH {
        return Err(ExperimentValidationError::InvalidSubjectId(
            MAX_SUBJECT_ID_LENGTH,
        ));
    }
    Ok(())
}

/// Validate that a traffic split matches the variant count and sums to 100
pub fn validate_traffic_split(
    split: &[f64],
    variant_count: usize,
) -> Result<(), ExperimentValidationError> {
    if split.len() != variant_count {
        return Err(ExperimentValidationError::TrafficSplitLength {
            expected: variant_count,
            got: split.len(),
        });
    }

    if let Some(&weight) = split.iter().find(|w| !w.is_finite() || **w < 0.0) {
        return Err(ExperimentValidationError::NegativeTrafficWeight(weight));
    }

    let total: f64 = split.iter().sum();

    if (total - 100.0).abs() > TRAFFIC_SPLIT_TOLERANCE {
        return Err(ExperimentValidationError::InvalidTrafficSum(total));
    }

    Ok(())
}

/// Validate that a probability-like parameter lies in the open interval (0, 1)
pub fn validate_probability(name: &'static str, value: f64) -> Result<(), ExperimentValidationError> {
    if value.is_finite() && value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(ExperimentValidationError::ProbabilityOutOfRange { name, value })
    }
}

/// Validate that a parameter is strictly positive
pub fn validate_positive(name: &'static str, value: f64) -> Result<(), ExperimentValidationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ExperimentValidationError::NonPositive { name, value })
    }
}

/// Derive an equal traffic split for `variant_count` variants
pub fn equal_traffic_split(variant_count: usize) -> Vec<f64> {
    if variant_count == 0 {
        return Vec::new();
    }
    vec![100.0 / variant_count as f64; variant_count]
}

#[cfg(test)]
mod tests {
    use super::*;

    mod experiment_id_validation {
        use super::*;

        #[test]
        fn test_valid_experiment_ids() {
            assert!(validate_experiment_id("exp-1").is_ok());
            assert!(validate_experiment_id("connect_note_test").is_ok());
            assert!(validate_experiment_id("a").is_ok());
            assert!(validate_experiment_id("experiment-2024-01").is_ok());
        }

        #[test]
        fn test_empty_id() {
            assert_eq!(
                validate_experiment_id(""),
                Err(ExperimentValidationError::EmptyId)
            );
        }

        #[test]
        fn test_id_too_long() {
            let long_id = "a".repeat(51);
            assert_eq!(
                validate_experiment_id(&long_id),
                Err(ExperimentValidationError::IdTooLong(50))
            );
        }

        #[test]
        fn test_invalid_boundary() {
            assert_eq!(
                validate_experiment_id("-abc"),
                Err(ExperimentValidationError::InvalidIdBoundary)
            );
            assert_eq!(
                validate_experiment_id("abc-"),
                Err(ExperimentValidationError::InvalidIdBoundary)
            );
        }

        #[test]
        fn test_invalid_character() {
            assert_eq!(
                validate_experiment_id("abc.def"),
                Err(ExperimentValidationError::InvalidIdCharacter('.'))
            );
            assert_eq!(
                validate_experiment_id("abc def"),
                Err(ExperimentValidationError::InvalidIdCharacter(' '))
            );
        }

        #[test]
        fn test_consecutive_hyphens() {
            assert_eq!(
                validate_experiment_id("abc--def"),
                Err(ExperimentValidationError::ConsecutiveHyphens)
            );
        }
    }

    mod variant_id_validation {
        use super::*;

        #[test]
        fn test_valid_variant_ids() {
            assert!(validate_variant_id("control").is_ok());
            assert!(validate_variant_id("A").is_ok());
            assert!(validate_variant_id("treatment-group-1").is_ok());
        }

        #[test]
        fn test_invalid_variant_ids() {
            assert_eq!(
                validate_variant_id(""),
                Err(ExperimentValidationError::EmptyVariantId)
            );
            assert_eq!(
                validate_variant_id("variant--a"),
                Err(ExperimentValidationError::VariantIdConsecutiveHyphens)
            );
            assert_eq!(
                validate_variant_id(&"v".repeat(51)),
                Err(ExperimentValidationError::VariantIdTooLong(50))
            );
        }
    }

    mod traffic_split_validation {
        use super::*;

        #[test]
        fn test_valid_split() {
            assert!(validate_traffic_split(&[50.0, 50.0], 2).is_ok());
            assert!(validate_traffic_split(&[33.3333333, 33.3333333, 33.3333334], 3).is_ok());
        }

        #[test]
        fn test_split_must_sum_to_100() {
            let err = validate_traffic_split(&[30.0, 30.0], 2).unwrap_err();
            assert_eq!(err, ExperimentValidationError::InvalidTrafficSum(60.0));
            assert!(err.to_string().contains("must sum to 100%"));
        }

        #[test]
        fn test_split_length_mismatch() {
            assert_eq!(
                validate_traffic_split(&[100.0], 2),
                Err(ExperimentValidationError::TrafficSplitLength {
                    expected: 2,
                    got: 1
                })
            );
        }

        #[test]
        fn test_negative_weight() {
            assert_eq!(
                validate_traffic_split(&[120.0, -20.0], 2),
                Err(ExperimentValidationError::NegativeTrafficWeight(-20.0))
            );
        }

        #[test]
        fn test_equal_split_sums_to_100() {
            for k in 2..=7 {
                let split = equal_traffic_split(k);
                assert!(validate_traffic_split(&split, k).is_ok(), "k = {}", k);
            }
        }
    }

    mod parameter_validation {
        use super::*;

        #[test]
        fn test_probability_bounds() {
            assert!(validate_probability("alpha", 0.05).is_ok());
            assert!(validate_probability("alpha", 0.0).is_err());
            assert!(validate_probability("alpha", 1.0).is_err());
            assert!(validate_probability("alpha", f64::NAN).is_err());
        }

        #[test]
        fn test_positive() {
            assert!(validate_positive("minimum detectable effect", 0.01).is_ok());
            assert!(validate_positive("minimum detectable effect", 0.0).is_err());
            assert!(validate_positive("minimum detectable effect", -0.1).is_err());
        }

        #[test]
        fn test_subject_id() {
            assert!(validate_subject_id("urn:li:member:42").is_ok());
            assert!(validate_subject_id("").is_err());
            assert!(validate_subject_id(&"x".repeat(257)).is_err());
        }
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_split_accepted_only_near_100(a in 0.0f64..100.0, b in 0.0f64..100.0) {
                let result = validate_traffic_split(&[a, b], 2);
                if ((a + b) - 100.0).abs() <= TRAFFIC_SPLIT_TOLERANCE {
                    prop_assert!(result.is_ok());
                } else {
                    prop_assert!(result.is_err());
                }
            }
        }
    }
}
