use thiserror::Error;

/// Core domain errors
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Computation error: {message}")]
    Computation { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DomainError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn computation(message: impl Into<String>) -> Self {
        Self::Computation {
            message: message.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether the error must be forwarded to the error-reporting collaborator
    pub fn is_reportable(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::Computation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_error() {
        let error = DomainError::not_found("Experiment 'exp-1' not found");
        assert_eq!(error.to_string(), "Not found: Experiment 'exp-1' not found");
    }

    #[test]
    fn test_validation_error() {
        let error = DomainError::validation("traffic split must sum to 100%");
        assert_eq!(
            error.to_string(),
            "Validation error: traffic split must sum to 100%"
        );
    }

    #[test]
    fn test_computation_error() {
        let error = DomainError::computation("zero variance");
        assert_eq!(error.to_string(), "Computation error: zero variance");
    }

    #[test]
    fn test_reportable_errors() {
        assert!(DomainError::validation("x").is_reportable());
        assert!(DomainError::computation("x").is_reportable());
        assert!(!DomainError::not_found("x").is_reportable());
        assert!(!DomainError::conflict("x").is_reportable());
    }
}
