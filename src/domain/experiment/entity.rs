//! Experiment domain entities

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

use super::assignment::{Assignment, AssignmentMode, TargetingRule};
use super::interim::{EarlyStoppingRules, InterimAnalysisRecord};
use super::statistics::{ConversionOutcome, ConversionPolicy, VariantStatistics, DEFAULT_METRIC};
use super::validation::{
    validate_experiment_id, validate_positive, validate_probability, validate_subject_id,
    validate_traffic_split, validate_variant_id, ExperimentValidationError,
};
use crate::domain::storage::{StorageEntity, StorageKey};
use crate::domain::DomainError;

/// Default significance level
pub const DEFAULT_SIGNIFICANCE_LEVEL: f64 = 0.05;

/// Default statistical power
pub const DEFAULT_POWER: f64 = 0.80;

// ============================================================================
// ExperimentId
// ============================================================================

/// Unique identifier for an experiment
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ExperimentId(String);

impl ExperimentId {
    /// Create a new experiment ID with validation
    pub fn new(id: impl Into<String>) -> Result<Self, ExperimentValidationError> {
        let id = id.into();
        validate_experiment_id(&id)?;
        Ok(Self(id))
    }

    /// Generate a fresh random experiment ID
    pub fn generate() -> Self {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("exp-{}", &uuid[..16]))
    }

    /// Get the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ExperimentId {
    type Error = ExperimentValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ExperimentId> for String {
    fn from(id: ExperimentId) -> Self {
        id.0
    }
}

impl fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ExperimentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl StorageKey for ExperimentId {
    fn as_str(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// VariantId
// ============================================================================

/// Unique identifier for a variant within an experiment
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct VariantId(String);

impl VariantId {
    /// Create a new variant ID with validation
    pub fn new(id: impl Into<String>) -> Result<Self, ExperimentValidationError> {
        let id = id.into();
        validate_variant_id(&id)?;
        Ok(Self(id))
    }

    /// Get the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for VariantId {
    type Error = ExperimentValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<VariantId> for String {
    fn from(id: VariantId) -> Self {
        id.0
    }
}

impl fmt::Display for VariantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for VariantId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// ============================================================================
// SubjectId
// ============================================================================

/// Opaque caller-supplied identifier of the subject being assigned
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectId(String);

impl SubjectId {
    pub fn new(id: impl Into<String>) -> Result<Self, ExperimentValidationError> {
        let id = id.into();
        validate_subject_id(&id)?;
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SubjectId {
    type Error = ExperimentValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SubjectId> for String {
    fn from(id: SubjectId) -> Self {
        id.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// ExperimentStatus / StopReason
// ============================================================================

/// Lifecycle status of an experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentStatus {
    /// Being configured, not yet accepting subjects
    #[default]
    Draft,
    /// Accepting assignments and conversions
    Active,
    /// Frozen; statistics no longer change
    Stopped,
    /// Final analysis has been produced
    Analyzed,
}

impl ExperimentStatus {
    /// Check if the experiment is currently running
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Active)
    }

    /// Check if the experiment has stopped (STOPPED or ANALYZED)
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Analyzed)
    }

    /// Check if a transition to the target status is valid
    pub fn can_transition_to(&self, target: ExperimentStatus) -> bool {
        matches!(
            (self, target),
            (Self::Draft, Self::Active)
                | (Self::Active, Self::Stopped)
                | (Self::Stopped, Self::Analyzed)
        )
    }
}

impl fmt::Display for ExperimentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Draft => write!(f, "draft"),
            Self::Active => write!(f, "active"),
            Self::Stopped => write!(f, "stopped"),
            Self::Analyzed => write!(f, "analyzed"),
        }
    }
}

/// Why an experiment stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Manual,
    Superiority,
    Futility,
    #[serde(rename = "maximum_duration_reached")]
    Duration,
    SampleSize,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Superiority => write!(f, "superiority"),
            Self::Futility => write!(f, "futility"),
            Self::Duration => write!(f, "maximum_duration_reached"),
            Self::SampleSize => write!(f, "sample_size"),
        }
    }
}

// ============================================================================
// AnalysisMethod
// ============================================================================

/// Statistical approach used to evaluate an experiment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMethod {
    #[default]
    Frequentist,
    Sequential,
    Bayesian,
}

impl fmt::Display for AnalysisMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Frequentist => write!(f, "frequentist"),
            Self::Sequential => write!(f, "sequential"),
            Self::Bayesian => write!(f, "bayesian"),
        }
    }
}

// ============================================================================
// Variant
// ============================================================================

/// A treatment arm of an experiment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variant {
    id: VariantId,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    /// Opaque payload handed back to the caller, never interpreted here
    #[serde(default)]
    content: Value,
    #[serde(default)]
    control: bool,
}

impl Variant {
    /// Create a new variant
    pub fn new(id: VariantId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            content: Value::Null,
            control: false,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_content(mut self, content: Value) -> Self {
        self.content = content;
        self
    }

    pub fn with_control(mut self, control: bool) -> Self {
        self.control = control;
        self
    }

    pub fn id(&self) -> &VariantId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn content(&self) -> &Value {
        &self.content
    }

    pub fn is_control(&self) -> bool {
        self.control
    }
}

// ============================================================================
// Experiment
// ============================================================================

/// An experiment together with its aggregated state
///
/// The aggregate is persisted as a unit so assignments, statistics and the
/// interim audit trail are never saved partially.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Experiment {
    id: ExperimentId,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    status: ExperimentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_reason: Option<StopReason>,
    variants: Vec<Variant>,
    traffic_split: Vec<f64>,
    significance_level: f64,
    power: f64,
    analysis_method: AnalysisMethod,
    primary_metric: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    minimum_effect_size: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    early_stopping: Option<EarlyStoppingRules>,
    #[serde(default)]
    targeting: Vec<TargetingRule>,
    #[serde(default)]
    assignment_mode: AssignmentMode,
    statistics: Vec<VariantStatistics>,
    #[serde(default)]
    assignments: BTreeMap<String, Assignment>,
    /// Metrics each subject has converted on
    #[serde(default)]
    converted: BTreeMap<String, BTreeSet<String>>,
    #[serde(default)]
    interim_analyses: Vec<InterimAnalysisRecord>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    /// Bumped on every mutation of the aggregate
    #[serde(default)]
    version: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    analyzed_at: Option<DateTime<Utc>>,
}

impl Experiment {
    /// Create a new experiment in Draft status
    pub fn new(id: ExperimentId, name: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            name: name.into(),
            description: None,
            status: ExperimentStatus::Draft,
            stop_reason: None,
            variants: Vec::new(),
            traffic_split: Vec::new(),
            significance_level: DEFAULT_SIGNIFICANCE_LEVEL,
            power: DEFAULT_POWER,
            analysis_method: AnalysisMethod::default(),
            primary_metric: DEFAULT_METRIC.to_string(),
            minimum_effect_size: None,
            early_stopping: None,
            targeting: Vec::new(),
            assignment_mode: AssignmentMode::default(),
            statistics: Vec::new(),
            assignments: BTreeMap::new(),
            converted: BTreeMap::new(),
            interim_analyses: Vec::new(),
            created_at,
            updated_at: created_at,
            version: 0,
            started_at: None,
            completed_at: None,
            analyzed_at: None,
        }
    }

    // Builder methods

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a variant along with its zero-initialized statistics
    pub fn with_variant(mut self, variant: Variant) -> Self {
        self.statistics
            .push(VariantStatistics::new(variant.id().clone()));
        self.variants.push(variant);
        self
    }

    /// Set traffic weights as percentages, in variant order
    pub fn with_traffic_split(mut self, split: Vec<f64>) -> Self {
        self.traffic_split = split;
        self
    }

    pub fn with_significance_level(mut self, alpha: f64) -> Self {
        self.significance_level = alpha;
        self
    }

    pub fn with_power(mut self, power: f64) -> Self {
        self.power = power;
        self
    }

    pub fn with_analysis_method(mut self, method: AnalysisMethod) -> Self {
        self.analysis_method = method;
        self
    }

    pub fn with_primary_metric(mut self, metric: impl Into<String>) -> Self {
        self.primary_metric = metric.into();
        self
    }

    pub fn with_minimum_effect_size(mut self, effect: f64) -> Self {
        self.minimum_effect_size = Some(effect);
        self
    }

    pub fn with_early_stopping(mut self, rules: EarlyStoppingRules) -> Self {
        self.early_stopping = Some(rules);
        self
    }

    pub fn with_targeting_rule(mut self, rule: TargetingRule) -> Self {
        self.targeting.push(rule);
        self
    }

    pub fn with_assignment_mode(mut self, mode: AssignmentMode) -> Self {
        self.assignment_mode = mode;
        self
    }

    /// Check every configuration invariant
    pub fn validate(&self) -> Result<(), ExperimentValidationError> {
        if self.variants.len() < 2 {
            return Err(ExperimentValidationError::InsufficientVariants);
        }

        let mut seen = HashSet::new();

        for variant in &self.variants {
            if !seen.insert(variant.id()) {
                return Err(ExperimentValidationError::DuplicateVariantId(
                    variant.id().to_string(),
                ));
            }
        }

        validate_traffic_split(&self.traffic_split, self.variants.len())?;
        validate_probability("significance level", self.significance_level)?;
        validate_probability("power", self.power)?;

        if let Some(effect) = self.minimum_effect_size {
            validate_positive("minimum effect size", effect)?;
        }

        if self.primary_metric.trim().is_empty() {
            return Err(ExperimentValidationError::EmptyMetricName);
        }

        if let Some(ref rules) = self.early_stopping {
            rules.validate()?;
        }

        Ok(())
    }

    // Getters

    pub fn id(&self) -> &ExperimentId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn status(&self) -> ExperimentStatus {
        self.status
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.stop_reason
    }

    pub fn variants(&self) -> &[Variant] {
        &self.variants
    }

    pub fn variant(&self, id: &VariantId) -> Option<&Variant> {
        self.variants.iter().find(|v| v.id() == id)
    }

    pub fn traffic_split(&self) -> &[f64] {
        &self.traffic_split
    }

    pub fn significance_level(&self) -> f64 {
        self.significance_level
    }

    pub fn power(&self) -> f64 {
        self.power
    }

    pub fn analysis_method(&self) -> AnalysisMethod {
        self.analysis_method
    }

    pub fn primary_metric(&self) -> &str {
        &self.primary_metric
    }

    pub fn minimum_effect_size(&self) -> Option<f64> {
        self.minimum_effect_size
    }

    pub fn early_stopping(&self) -> Option<&EarlyStoppingRules> {
        self.early_stopping.as_ref()
    }

    pub fn targeting(&self) -> &[TargetingRule] {
        &self.targeting
    }

    pub fn assignment_mode(&self) -> AssignmentMode {
        self.assignment_mode
    }

    pub fn statistics(&self) -> &[VariantStatistics] {
        &self.statistics
    }

    pub fn variant_statistics(&self, id: &VariantId) -> Option<&VariantStatistics> {
        self.statistics.iter().find(|s| s.variant_id() == id)
    }

    pub fn assignments(&self) -> &BTreeMap<String, Assignment> {
        &self.assignments
    }

    pub fn assignment(&self, subject_id: &SubjectId) -> Option<&Assignment> {
        self.assignments.get(subject_id.as_str())
    }

    pub fn interim_analyses(&self) -> &[InterimAnalysisRecord] {
        &self.interim_analyses
    }

    pub fn next_analysis_number(&self) -> u32 {
        self.interim_analyses.len() as u32 + 1
    }

    pub fn total_participants(&self) -> u64 {
        self.statistics.iter().map(|s| s.participants()).sum()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn analyzed_at(&self) -> Option<DateTime<Utc>> {
        self.analyzed_at
    }

    /// Time since start, measured up to completion if the experiment stopped
    pub fn elapsed(&self, now: DateTime<Utc>) -> Option<Duration> {
        let started = self.started_at?;
        let end = self.completed_at.unwrap_or(now);
        Some(end - started)
    }

    /// The control variant: the flagged one, otherwise the first
    pub fn control_variant(&self) -> Option<&Variant> {
        self.variants
            .iter()
            .find(|v| v.is_control())
            .or_else(|| self.variants.first())
    }

    /// Map a point in `[0, 100)` onto a variant by walking cumulative weights
    pub fn variant_for_point(&self, point: f64) -> Option<&Variant> {
        let mut cumulative = 0.0;

        for (variant, weight) in self.variants.iter().zip(&self.traffic_split) {
            cumulative += weight;

            if point < cumulative {
                return Some(variant);
            }
        }

        // Rounding can leave the top of the range uncovered
        self.variants
            .iter()
            .zip(&self.traffic_split)
            .rev()
            .find(|(_, weight)| **weight > 0.0)
            .map(|(variant, _)| variant)
    }

    // Status transitions

    /// Start the experiment
    pub fn start(&mut self, at: DateTime<Utc>) -> Result<(), ExperimentValidationError> {
        self.transition(ExperimentStatus::Active)?;
        self.started_at = Some(at);
        self.touch(at);
        Ok(())
    }

    /// Stop the experiment; returns `false` if it was already stopped
    pub fn stop(
        &mut self,
        reason: StopReason,
        at: DateTime<Utc>,
    ) -> Result<bool, ExperimentValidationError> {
        if self.status.is_terminal() {
            return Ok(false);
        }

        self.transition(ExperimentStatus::Stopped)?;
        self.stop_reason = Some(reason);
        self.completed_at = Some(at);
        self.touch(at);
        Ok(true)
    }

    /// Mark the final analysis as done
    pub fn mark_analyzed(&mut self, at: DateTime<Utc>) -> Result<(), ExperimentValidationError> {
        self.transition(ExperimentStatus::Analyzed)?;
        self.analyzed_at = Some(at);
        self.touch(at);
        Ok(())
    }

    // Aggregation

    /// Persist an assignment and count the participant exactly once
    ///
    /// An existing assignment for the subject is returned unchanged.
    pub fn record_assignment(&mut self, assignment: Assignment) -> Result<Assignment, DomainError> {
        if let Some(existing) = self.assignments.get(assignment.subject_id.as_str()) {
            return Ok(existing.clone());
        }

        let stats = self
            .statistics
            .iter_mut()
            .find(|s| s.variant_id() == &assignment.variant_id)
            .ok_or_else(|| {
                DomainError::not_found(format!(
                    "Variant '{}' not found in experiment '{}'",
                    assignment.variant_id, self.id
                ))
            })?;

        stats.add_participant();
        self.touch(assignment.assigned_at);
        self.assignments
            .insert(assignment.subject_id.as_str().to_string(), assignment.clone());

        Ok(assignment)
    }

    /// Attribute a conversion to the subject's assigned variant
    pub fn record_conversion(
        &mut self,
        subject_id: &SubjectId,
        metric: &str,
        value: f64,
        policy: ConversionPolicy,
        at: DateTime<Utc>,
    ) -> Result<ConversionOutcome, DomainError> {
        let variant_id = self
            .assignments
            .get(subject_id.as_str())
            .map(|a| a.variant_id.clone())
            .ok_or_else(|| {
                DomainError::not_found(format!(
                    "Subject '{}' is not assigned in experiment '{}'",
                    subject_id, self.id
                ))
            })?;

        let first_for_subject = self
            .converted
            .entry(subject_id.as_str().to_string())
            .or_default()
            .insert(metric.to_string());

        let outcome = match (first_for_subject, policy) {
            (true, _) => ConversionOutcome::Recorded,
            (false, ConversionPolicy::AllowRepeated) => ConversionOutcome::RecordedRepeat,
            (false, ConversionPolicy::FirstPerSubject) => return Ok(ConversionOutcome::Duplicate),
        };

        let stats = self
            .statistics
            .iter_mut()
            .find(|s| s.variant_id() == &variant_id)
            .ok_or_else(|| {
                DomainError::internal(format!(
                    "Statistics missing for variant '{}' in experiment '{}'",
                    variant_id, self.id
                ))
            })?;

        stats.add_conversion(metric, value, first_for_subject);
        self.touch(at);

        Ok(outcome)
    }

    /// Append an interim analysis to the audit trail
    pub fn append_interim_analysis(&mut self, record: InterimAnalysisRecord) {
        self.touch(record.timestamp);
        self.interim_analyses.push(record);
    }

    // Private helpers

    fn transition(&mut self, target: ExperimentStatus) -> Result<(), ExperimentValidationError> {
        if !self.status.can_transition_to(target) {
            return Err(ExperimentValidationError::InvalidStatusTransition(
                self.status.to_string(),
                target.to_string(),
            ));
        }
        self.status = target;
        Ok(())
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
        self.version += 1;
    }
}

impl StorageEntity for Experiment {
    type Key = ExperimentId;

    fn key(&self) -> &Self::Key {
        &self.id
    }
}
