//! Subject assignment types and targeting rules

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::entity::{ExperimentId, SubjectId, VariantId};

/// Free-form attributes describing the subject at assignment time
pub type AssignmentContext = BTreeMap<String, Value>;

// ============================================================================
// AssignmentMode
// ============================================================================

/// How a variant is chosen for a subject seen for the first time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMode {
    /// Hash of experiment and subject ID, reproducible across retries
    #[default]
    Deterministic,
    /// Weighted random draw
    Random,
}

// ============================================================================
// TargetingRule
// ============================================================================

/// Comparison applied by a targeting rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetingOperator {
    Equals,
    NotEquals,
    OneOf,
    Exists,
}

/// A condition the assignment context must satisfy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetingRule {
    pub attribute: String,
    pub operator: TargetingOperator,
    #[serde(default)]
    pub value: Value,
}

impl TargetingRule {
    pub fn equals(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            attribute: attribute.into(),
            operator: TargetingOperator::Equals,
            value: value.into(),
        }
    }

    pub fn not_equals(attribute: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            attribute: attribute.into(),
            operator: TargetingOperator::NotEquals,
            value: value.into(),
        }
    }

    pub fn one_of(attribute: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            attribute: attribute.into(),
            operator: TargetingOperator::OneOf,
            value: Value::Array(values),
        }
    }

    pub fn exists(attribute: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            operator: TargetingOperator::Exists,
            value: Value::Null,
        }
    }

    /// Check the rule against a subject's context
    pub fn matches(&self, context: &AssignmentContext) -> bool {
        let actual = context.get(&self.attribute);

        match self.operator {
            TargetingOperator::Exists => actual.is_some_and(|v| !v.is_null()),
            TargetingOperator::Equals => actual == Some(&self.value),
            TargetingOperator::NotEquals => actual != Some(&self.value),
            TargetingOperator::OneOf => match (&self.value, actual) {
                (Value::Array(allowed), Some(actual)) => allowed.contains(actual),
                _ => false,
            },
        }
    }
}

/// Whether every rule matches; an empty rule set matches everyone
pub fn matches_all(rules: &[TargetingRule], context: &AssignmentContext) -> bool {
    rules.iter().all(|rule| rule.matches(context))
}

// ============================================================================
// Assignment
// ============================================================================

/// Sticky mapping of a subject to a variant within an experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub experiment_id: ExperimentId,
    pub subject_id: SubjectId,
    pub variant_id: VariantId,
    pub assigned_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: AssignmentContext,
}

impl Assignment {
    pub fn new(
        experiment_id: ExperimentId,
        subject_id: SubjectId,
        variant_id: VariantId,
        assigned_at: DateTime<Utc>,
    ) -> Self {
        Self {
            experiment_id,
            subject_id,
            variant_id,
            assigned_at,
            context: AssignmentContext::new(),
        }
    }

    pub fn with_context(mut self, context: AssignmentContext) -> Self {
        self.context = context;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> AssignmentContext {
        let mut ctx = AssignmentContext::new();
        ctx.insert("locale".to_string(), json!("en-US"));
        ctx.insert("premium".to_string(), json!(true));
        ctx.insert("connections".to_string(), Value::Null);
        ctx
    }

    #[test]
    fn test_equals_rule() {
        assert!(TargetingRule::equals("locale", "en-US").matches(&context()));
        assert!(!TargetingRule::equals("locale", "de-DE").matches(&context()));
        assert!(!TargetingRule::equals("missing", "x").matches(&context()));
    }

    #[test]
    fn test_not_equals_rule() {
        assert!(TargetingRule::not_equals("premium", false).matches(&context()));
        assert!(TargetingRule::not_equals("missing", 1).matches(&context()));
        assert!(!TargetingRule::not_equals("premium", true).matches(&context()));
    }

    #[test]
    fn test_one_of_rule() {
        let rule = TargetingRule::one_of("locale", vec![json!("fr-FR"), json!("en-US")]);
        assert!(rule.matches(&context()));

        let rule = TargetingRule::one_of("locale", vec![json!("fr-FR")]);
        assert!(!rule.matches(&context()));
    }

    #[test]
    fn test_exists_rule() {
        assert!(TargetingRule::exists("premium").matches(&context()));
        assert!(!TargetingRule::exists("connections").matches(&context()));
        assert!(!TargetingRule::exists("missing").matches(&context()));
    }

    #[test]
    fn test_matches_all() {
        let rules = vec![
            TargetingRule::equals("locale", "en-US"),
            TargetingRule::equals("premium", true),
        ];
        assert!(matches_all(&rules, &context()));
        assert!(matches_all(&[], &AssignmentContext::new()));

        let rules = vec![
            TargetingRule::equals("locale", "en-US"),
            TargetingRule::equals("premium", false),
        ];
        assert!(!matches_all(&rules, &context()));
    }

    #[test]
    fn test_rule_serialization() {
        let rule = TargetingRule::equals("locale", "en-US");
        let json = serde_json::to_string(&rule).unwrap();
        assert!(json.contains("\"operator\":\"equals\""));

        let parsed: TargetingRule = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, rule);
    }
}
