//! Experiment service
//!
//! Orchestrates the registry, assignment, aggregation and analysis of
//! experiments. Every mutation of an experiment runs under that experiment's
//! lock and persists the whole aggregate in a single save; analyses read a
//! snapshot and never mutate persisted state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::domain::experiment::{
    matches_all, AnalysisMethod, AnalysisOutcome, Assignment, AssignmentContext, AssignmentMode,
    BayesianResult, Clock, ConversionOutcome, ConversionPolicy, EarlyStoppingRules,
    ErrorReporter, EventPublisher, Experiment, ExperimentEvent, ExperimentId, ExperimentQuery,
    ExperimentReport, ExperimentRepository, ExperimentStatus, ExperimentValidationError,
    InterimAnalysisRecord, RetrospectivePower, SampleSizePlan, SignificanceResult, StopReason,
    SubjectId, TargetingRule, Variant, VariantId, VariantSummary, DEFAULT_METRIC,
    DEFAULT_PLANNED_ANALYSES, DEFAULT_POWER, DEFAULT_SEQUENTIAL_MIN_SAMPLE_SIZE,
    DEFAULT_SIGNIFICANCE_LEVEL,
};
use crate::domain::DomainError;
use crate::infrastructure::events::{SystemClock, TracingErrorReporter, TracingEventPublisher};
use crate::infrastructure::experiment::{
    bayesian_compare_all, calculate_sample_size, calculate_significance, retrospective_power,
    significance_or_undefined, ConsistentHasher, SampleSizeParams, DEFAULT_CREDIBLE_LEVEL,
    DEFAULT_MIN_SAMPLE_SIZE_PER_VARIANT,
};
use crate::infrastructure::observability;

use super::analysis_strategy::{arm_counts, evaluate_next_interim, strategy_for};

// ============================================================================
// Settings
// ============================================================================

/// Engine-wide defaults applied to experiments and analyses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    pub default_significance_level: f64,
    pub default_power: f64,
    pub min_sample_size_per_variant: u64,
    pub sequential_min_sample_size: u64,
    pub planned_analyses: u32,
    pub credible_level: f64,
    pub conversion_policy: ConversionPolicy,
    /// Period of the interim analysis scheduler
    pub monitor_interval_secs: u64,
}

/// Default period between scheduled interim analyses
pub const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 3_600;

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            default_significance_level: DEFAULT_SIGNIFICANCE_LEVEL,
            default_power: DEFAULT_POWER,
            min_sample_size_per_variant: DEFAULT_MIN_SAMPLE_SIZE_PER_VARIANT,
            sequential_min_sample_size: DEFAULT_SEQUENTIAL_MIN_SAMPLE_SIZE,
            planned_analyses: DEFAULT_PLANNED_ANALYSES,
            credible_level: DEFAULT_CREDIBLE_LEVEL,
            conversion_policy: ConversionPolicy::default(),
            monitor_interval_secs: DEFAULT_MONITOR_INTERVAL_SECS,
        }
    }
}

impl EngineSettings {
    /// Early-stopping rules for sequential experiments that configure none
    pub fn default_early_stopping(&self) -> EarlyStoppingRules {
        EarlyStoppingRules::default()
            .with_planned_analyses(self.planned_analyses)
            .with_min_sample_size(self.sequential_min_sample_size)
    }
}

// ============================================================================
// Request Types
// ============================================================================

/// Request to create a new experiment
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateExperimentRequest {
    /// Generated when absent
    pub id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub variants: Vec<CreateVariantRequest>,
    /// Equal split when absent
    pub traffic_split: Option<Vec<f64>>,
    pub significance_level: Option<f64>,
    pub power: Option<f64>,
    pub analysis_method: AnalysisMethod,
    pub primary_metric: Option<String>,
    pub minimum_effect_size: Option<f64>,
    pub early_stopping: Option<EarlyStoppingRules>,
    pub targeting: Vec<TargetingRule>,
    pub assignment_mode: AssignmentMode,
}

/// Request to create a new variant
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateVariantRequest {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub content: Value,
    pub control: bool,
}

// ============================================================================
// Per-experiment locks
// ============================================================================

#[derive(Debug, Default)]
struct ExperimentLocks {
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl ExperimentLocks {
    /// Lock for an experiment; entries nobody holds or waits on are dropped
    /// so unknown IDs do not accumulate
    fn lock_for(&self, id: &ExperimentId) -> Result<Arc<tokio::sync::Mutex<()>>, DomainError> {
        let mut locks = self
            .locks
            .lock()
            .map_err(|_| DomainError::internal("Experiment lock registry poisoned"))?;

        locks.retain(|_, lock| Arc::strong_count(lock) > 1);

        Ok(locks.entry(id.as_str().to_string()).or_default().clone())
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }
}

// ============================================================================
// Experiment Service
// ============================================================================

/// Service for running experiments end to end
pub struct ExperimentService<R: ExperimentRepository> {
    repository: Arc<R>,
    publisher: Arc<dyn EventPublisher>,
    reporter: Arc<dyn ErrorReporter>,
    clock: Arc<dyn Clock>,
    settings: EngineSettings,
    locks: ExperimentLocks,
}

impl<R: ExperimentRepository> std::fmt::Debug for ExperimentService<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExperimentService")
            .field("repository", &self.repository)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl<R: ExperimentRepository> ExperimentService<R> {
    /// Create a new experiment service with logging collaborators
    pub fn new(repository: Arc<R>) -> Self {
        Self {
            repository,
            publisher: Arc::new(TracingEventPublisher),
            reporter: Arc::new(TracingErrorReporter),
            clock: Arc::new(SystemClock),
            settings: EngineSettings::default(),
            locks: ExperimentLocks::default(),
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    // ========================================================================
    // Registry
    // ========================================================================

    /// Validate and persist a new experiment in Draft status
    pub async fn create_experiment(
        &self,
        request: CreateExperimentRequest,
    ) -> Result<Experiment, DomainError> {
        debug!(experiment_id = ?request.id, "Creating experiment");

        let context = json!({ "experiment_id": request.id, "name": request.name });
        let experiment = self.reported(self.build_experiment(request), "experiment.create", &context)?;

        let created = self.repository.create(experiment).await?;

        self.publisher.publish(&ExperimentEvent::ExperimentCreated {
            experiment_id: created.id().clone(),
            variant_count: created.variants().len(),
            timestamp: created.created_at(),
        });
        info!(experiment_id = %created.id(), variants = created.variants().len(), "Experiment created");

        Ok(created)
    }

    /// Get an experiment by ID
    pub async fn get_experiment(&self, id: &str) -> Result<Option<Experiment>, DomainError> {
        let experiment_id = self.parse_id(id)?;
        self.repository.get(&experiment_id).await
    }

    /// List experiments matching a query
    pub async fn list_experiments(
        &self,
        query: &ExperimentQuery,
    ) -> Result<Vec<Experiment>, DomainError> {
        self.repository.list(query).await
    }

    /// Move a Draft experiment to Active
    pub async fn start_experiment(&self, id: &str) -> Result<Experiment, DomainError> {
        debug!(experiment_id = %id, "Starting experiment");

        let experiment_id = self.parse_id(id)?;
        let lock = self.locks.lock_for(&experiment_id)?;
        let _guard = lock.lock().await;

        let mut experiment = self.repository.load(&experiment_id).await?;
        experiment
            .start(self.clock.now())
            .map_err(|e| DomainError::conflict(e.to_string()))?;

        let saved = self.repository.save(experiment).await?;
        info!(experiment_id = %id, "Experiment started");

        Ok(saved)
    }

    /// Stop an experiment; stopping a stopped experiment is a no-op
    pub async fn stop_experiment(
        &self,
        id: &str,
        reason: StopReason,
    ) -> Result<Experiment, DomainError> {
        debug!(experiment_id = %id, reason = %reason, "Stopping experiment");

        let experiment_id = self.parse_id(id)?;
        let lock = self.locks.lock_for(&experiment_id)?;
        let _guard = lock.lock().await;

        let mut experiment = self.repository.load(&experiment_id).await?;
        let now = self.clock.now();

        let stopped = experiment
            .stop(reason, now)
            .map_err(|e| DomainError::conflict(e.to_string()))?;

        if !stopped {
            debug!(experiment_id = %id, status = %experiment.status(), "Experiment already stopped");
            return Ok(experiment);
        }

        let saved = self.repository.save(experiment).await?;

        self.publisher.publish(&ExperimentEvent::ExperimentStopped {
            experiment_id: saved.id().clone(),
            reason,
            total_participants: saved.total_participants(),
            timestamp: now,
        });
        info!(experiment_id = %id, reason = %reason, "Experiment stopped");

        Ok(saved)
    }

    // ========================================================================
    // Assignment & aggregation
    // ========================================================================

    /// Assign a subject to a variant
    ///
    /// Returns `None` when the experiment is unknown, not running, or the
    /// subject does not match its targeting rules. An existing assignment is
    /// returned unchanged.
    pub async fn assign_subject(
        &self,
        experiment_id: &str,
        subject_id: &str,
        context: AssignmentContext,
    ) -> Result<Option<Assignment>, DomainError> {
        let error_context = json!({ "experiment_id": experiment_id });
        let experiment_id = self.reported(self.parse_id(experiment_id), "experiment.assignment", &error_context)?;
        let subject_id = self.reported(
            SubjectId::new(subject_id).map_err(DomainError::from),
            "experiment.assignment",
            &error_context,
        )?;

        let lock = self.locks.lock_for(&experiment_id)?;
        let _guard = lock.lock().await;

        let Some(mut experiment) = self.repository.get(&experiment_id).await? else {
            debug!(experiment_id = %experiment_id, "Assignment skipped: unknown experiment");
            return Ok(None);
        };

        if !experiment.status().is_running() {
            debug!(
                experiment_id = %experiment_id,
                status = %experiment.status(),
                "Assignment skipped: experiment not active"
            );
            return Ok(None);
        }

        if let Some(existing) = experiment.assignment(&subject_id) {
            return Ok(Some(existing.clone()));
        }

        if !matches_all(experiment.targeting(), &context) {
            debug!(experiment_id = %experiment_id, subject_id = %subject_id, "Subject not targeted");
            return Ok(None);
        }

        let point = match experiment.assignment_mode() {
            AssignmentMode::Deterministic => {
                ConsistentHasher::traffic_point(experiment_id.as_str(), subject_id.as_str())
            }
            AssignmentMode::Random => rand::thread_rng().gen_range(0.0..100.0),
        };

        let variant_id = experiment
            .variant_for_point(point)
            .map(|v| v.id().clone())
            .ok_or_else(|| {
                DomainError::internal(format!(
                    "Experiment '{}' has no variant with traffic",
                    experiment_id
                ))
            })?;

        let now = self.clock.now();
        let assignment = experiment.record_assignment(
            Assignment::new(experiment_id.clone(), subject_id, variant_id, now).with_context(context),
        )?;

        self.repository.save(experiment).await?;

        self.publisher.publish(&ExperimentEvent::AssignmentCreated {
            experiment_id: experiment_id.clone(),
            subject_id: assignment.subject_id.clone(),
            variant_id: assignment.variant_id.clone(),
            timestamp: now,
        });
        observability::record_assignment(experiment_id.as_str(), assignment.variant_id.as_str());
        debug!(
            experiment_id = %experiment_id,
            subject_id = %assignment.subject_id,
            variant_id = %assignment.variant_id,
            "Subject assigned"
        );

        Ok(Some(assignment))
    }

    /// Record a conversion for an assigned subject
    ///
    /// `metric` defaults to the experiment's primary metric. Under the
    /// first-per-subject policy a repeated conversion is reported as a
    /// duplicate and leaves the counters untouched.
    pub async fn record_conversion(
        &self,
        experiment_id: &str,
        subject_id: &str,
        metric: Option<&str>,
        value: f64,
    ) -> Result<ConversionOutcome, DomainError> {
        let error_context = json!({
            "experiment_id": experiment_id,
            "metric": metric,
            "value": value,
        });

        let experiment_id = self.reported(self.parse_id(experiment_id), "experiment.conversion", &error_context)?;
        let subject_id = self.reported(
            SubjectId::new(subject_id).map_err(DomainError::from),
            "experiment.conversion",
            &error_context,
        )?;

        if !value.is_finite() {
            return self.reported(
                Err(DomainError::validation(format!(
                    "Conversion value must be finite, got {}",
                    value
                ))),
                "experiment.conversion",
                &error_context,
            );
        }

        let lock = self.locks.lock_for(&experiment_id)?;
        let _guard = lock.lock().await;

        let mut experiment = self.repository.load(&experiment_id).await?;

        if !experiment.status().is_running() {
            return Err(DomainError::conflict(format!(
                "Experiment '{}' is {} and does not accept conversions",
                experiment_id,
                experiment.status()
            )));
        }

        let metric = match metric {
            Some(name) if name.trim().is_empty() => {
                return self.reported(
                    Err(ExperimentValidationError::EmptyMetricName.into()),
                    "experiment.conversion",
                    &error_context,
                );
            }
            Some(name) => name.to_string(),
            None => experiment.primary_metric().to_string(),
        };

        let now = self.clock.now();
        let outcome = experiment.record_conversion(
            &subject_id,
            &metric,
            value,
            self.settings.conversion_policy,
            now,
        )?;

        observability::record_conversion(experiment_id.as_str(), &metric, outcome);

        if !outcome.was_counted() {
            debug!(experiment_id = %experiment_id, subject_id = %subject_id, metric = %metric, "Duplicate conversion ignored");
            return Ok(outcome);
        }

        let variant_id = experiment
            .assignment(&subject_id)
            .map(|a| a.variant_id.clone())
            .ok_or_else(|| DomainError::internal("Assignment vanished while recording conversion"))?;

        self.repository.save(experiment).await?;

        self.publisher.publish(&ExperimentEvent::ConversionRecorded {
            experiment_id: experiment_id.clone(),
            subject_id: subject_id.clone(),
            variant_id: variant_id.clone(),
            metric: metric.clone(),
            value,
            timestamp: now,
        });
        debug!(
            experiment_id = %experiment_id,
            subject_id = %subject_id,
            variant_id = %variant_id,
            metric = %metric,
            "Conversion recorded"
        );

        Ok(outcome)
    }

    // ========================================================================
    // Analysis (read-only)
    // ========================================================================

    /// Two-sample z-test or ANOVA over the primary metric
    pub async fn analyze_significance(&self, id: &str) -> Result<SignificanceResult, DomainError> {
        let experiment = self.snapshot(id).await?;
        let result = calculate_significance(
            &arm_counts(&experiment),
            experiment.significance_level(),
            self.settings.min_sample_size_per_variant,
        );

        self.reported(result, "experiment.significance", &json!({ "experiment_id": id }))
    }

    /// Prospective sample size for planned parameters
    pub fn calculate_sample_size(
        &self,
        params: &SampleSizeParams,
    ) -> Result<SampleSizePlan, DomainError> {
        let context = serde_json::to_value(params).unwrap_or(Value::Null);
        self.reported(calculate_sample_size(params), "experiment.power", &context)
    }

    /// Achieved power of the best treatment against the control
    pub async fn retrospective_power(&self, id: &str) -> Result<RetrospectivePower, DomainError> {
        let experiment = self.snapshot(id).await?;
        let arms = arm_counts(&experiment);

        let result = match arms.split_first() {
            Some((control, treatments)) => treatments
                .iter()
                .max_by(|a, b| a.rate().total_cmp(&b.rate()))
                .ok_or_else(|| DomainError::computation("Experiment has no treatment variant"))
                .and_then(|treatment| {
                    retrospective_power(
                        control,
                        treatment,
                        experiment.significance_level(),
                        arms.len(),
                    )
                }),
            None => Err(DomainError::computation("Experiment has no variants")),
        };

        self.reported(result, "experiment.power", &json!({ "experiment_id": id }))
    }

    /// Bayesian comparison of every treatment against the control
    pub async fn bayesian_analysis(&self, id: &str) -> Result<Vec<BayesianResult>, DomainError> {
        let experiment = self.snapshot(id).await?;
        let arms = arm_counts(&experiment);

        let result = match arms.split_first() {
            Some((control, treatments)) => {
                bayesian_compare_all(control, treatments, self.settings.credible_level)
            }
            None => Err(DomainError::computation("Experiment has no variants")),
        };

        self.reported(result, "experiment.bayesian", &json!({ "experiment_id": id }))
    }

    /// Run the experiment's configured analysis strategy
    pub async fn analyze(&self, id: &str) -> Result<AnalysisOutcome, DomainError> {
        let experiment = self.snapshot(id).await?;
        let strategy = strategy_for(experiment.analysis_method());
        let result = strategy.analyze(&experiment, &self.settings, self.clock.now());

        self.reported(
            result,
            "experiment.analysis",
            &json!({ "experiment_id": id, "method": strategy.method() }),
        )
    }

    /// What the next interim analysis would decide, without recording it
    pub async fn preview_interim(&self, id: &str) -> Result<InterimAnalysisRecord, DomainError> {
        let experiment = self.snapshot(id).await?;
        let result = evaluate_next_interim(&experiment, &self.settings, self.clock.now());

        self.reported(result, "experiment.interim", &json!({ "experiment_id": id }))
    }

    // ========================================================================
    // Sequential monitoring
    // ========================================================================

    /// Evaluate the next interim look, append it to the audit trail and stop
    /// the experiment when the decision says so
    ///
    /// The statistics are computed from a snapshot outside the lock. If the
    /// experiment changed in between, the evaluation is redone under the lock.
    pub async fn perform_interim_analysis(
        &self,
        id: &str,
    ) -> Result<InterimAnalysisRecord, DomainError> {
        debug!(experiment_id = %id, "Performing interim analysis");

        let error_context = json!({ "experiment_id": id });
        let experiment_id = self.reported(self.parse_id(id), "experiment.interim", &error_context)?;

        let snapshot = self.repository.load(&experiment_id).await?;
        Self::ensure_running(&snapshot)?;

        let now = self.clock.now();
        let evaluated = self.reported(
            evaluate_next_interim(&snapshot, &self.settings, now),
            "experiment.interim",
            &error_context,
        )?;

        let lock = self.locks.lock_for(&experiment_id)?;
        let _guard = lock.lock().await;

        let mut experiment = self.repository.load(&experiment_id).await?;
        Self::ensure_running(&experiment)?;

        let record = if experiment.version() == snapshot.version()
            && experiment.next_analysis_number() == evaluated.analysis_number
        {
            evaluated
        } else {
            debug!(experiment_id = %experiment_id, "Experiment changed during interim analysis, re-evaluating");
            self.reported(
                evaluate_next_interim(&experiment, &self.settings, now),
                "experiment.interim",
                &error_context,
            )?
        };

        if let Some(reason) = &record.untestable_reason {
            self.report_undefined(reason, "experiment.interim", &error_context);
        }

        experiment.append_interim_analysis(record.clone());

        let stop_reason = match (record.recommendation.should_stop(), record.stop_reason) {
            (true, Some(reason)) => {
                experiment
                    .stop(reason, now)
                    .map_err(|e| DomainError::conflict(e.to_string()))?;
                Some(reason)
            }
            _ => None,
        };

        let saved = self.repository.save(experiment).await?;

        self.publisher.publish(&ExperimentEvent::InterimAnalysisPerformed {
            experiment_id: experiment_id.clone(),
            analysis_number: record.analysis_number,
            p_value: record.p_value,
            recommendation: record.recommendation,
            total_participants: record.total_participants,
            timestamp: now,
        });
        observability::record_interim_analysis(experiment_id.as_str(), record.recommendation);

        info!(
            experiment_id = %experiment_id,
            analysis_number = record.analysis_number,
            p_value = ?record.p_value,
            recommendation = %record.recommendation,
            "Interim analysis recorded"
        );

        if let Some(reason) = stop_reason {
            self.publisher.publish(&ExperimentEvent::EarlyStoppingTriggered {
                experiment_id: experiment_id.clone(),
                analysis_number: record.analysis_number,
                reason,
                timestamp: now,
            });
            self.publisher.publish(&ExperimentEvent::ExperimentStopped {
                experiment_id: experiment_id.clone(),
                reason,
                total_participants: saved.total_participants(),
                timestamp: now,
            });
            observability::record_early_stop(experiment_id.as_str(), reason);
            warn!(experiment_id = %experiment_id, reason = %reason, "Experiment stopped early");
        }

        Ok(record)
    }

    // ========================================================================
    // Final analysis
    // ========================================================================

    /// Compute the final report of a stopped experiment and mark it analyzed
    pub async fn finalize(&self, id: &str) -> Result<ExperimentReport, DomainError> {
        debug!(experiment_id = %id, "Finalizing experiment");

        let error_context = json!({ "experiment_id": id });
        let experiment_id = self.reported(self.parse_id(id), "experiment.finalize", &error_context)?;

        let lock = self.locks.lock_for(&experiment_id)?;
        let _guard = lock.lock().await;

        let mut experiment = self.repository.load(&experiment_id).await?;

        if experiment.status() != ExperimentStatus::Stopped {
            return Err(DomainError::conflict(format!(
                "Experiment '{}' is {}; only stopped experiments can be finalized",
                experiment_id,
                experiment.status()
            )));
        }

        let now = self.clock.now();
        let report = self.reported(
            self.build_report(&experiment, now),
            "experiment.finalize",
            &error_context,
        )?;

        if let SignificanceResult::Undefined(undefined) = &report.significance {
            self.report_undefined(&undefined.reason, "experiment.finalize", &error_context);
        }

        experiment
            .mark_analyzed(now)
            .map_err(|e| DomainError::conflict(e.to_string()))?;
        self.repository.save(experiment).await?;

        info!(
            experiment_id = %experiment_id,
            significant = report.significance.is_significant(),
            "Experiment analyzed"
        );

        Ok(report)
    }

    // ========================================================================
    // Helper Methods
    // ========================================================================

    fn parse_id(&self, id: &str) -> Result<ExperimentId, DomainError> {
        ExperimentId::new(id).map_err(DomainError::from)
    }

    async fn snapshot(&self, id: &str) -> Result<Experiment, DomainError> {
        let experiment_id = self.parse_id(id)?;
        self.repository.load(&experiment_id).await
    }

    fn ensure_running(experiment: &Experiment) -> Result<(), DomainError> {
        if experiment.status().is_running() {
            Ok(())
        } else {
            Err(DomainError::conflict(format!(
                "Experiment '{}' is {}; interim analysis needs an active experiment",
                experiment.id(),
                experiment.status()
            )))
        }
    }

    /// Forward reportable errors to the error reporter before returning them
    fn reported<T>(
        &self,
        result: Result<T, DomainError>,
        operation: &str,
        context: &Value,
    ) -> Result<T, DomainError> {
        if let Err(ref error) = result {
            if error.is_reportable() {
                let kind = match error {
                    DomainError::Validation { .. } => "validation",
                    _ => "computation",
                };

                self.reporter
                    .report(&error.to_string(), &format!("{}.{}", operation, kind), context);
            }
        }

        result
    }

    /// Report a statistic that could not be computed but did not fail the operation
    fn report_undefined(&self, reason: &str, operation: &str, context: &Value) {
        warn!(context = %context, reason, "{} produced no test statistic", operation);
        self.reporter
            .report(reason, &format!("{}.computation", operation), context);
    }

    fn build_experiment(&self, request: CreateExperimentRequest) -> Result<Experiment, DomainError> {
        let experiment_id = match request.id {
            Some(ref id) => self.parse_id(id)?,
            None => ExperimentId::generate(),
        };

        if request.name.trim().is_empty() {
            return Err(DomainError::validation("Experiment name cannot be empty"));
        }

        let traffic_split = request
            .traffic_split
            .unwrap_or_else(|| crate::domain::experiment::equal_traffic_split(request.variants.len()));

        let mut experiment = Experiment::new(experiment_id, request.name, self.clock.now())
            .with_traffic_split(traffic_split)
            .with_significance_level(
                request
                    .significance_level
                    .unwrap_or(self.settings.default_significance_level),
            )
            .with_power(request.power.unwrap_or(self.settings.default_power))
            .with_analysis_method(request.analysis_method)
            .with_primary_metric(
                request
                    .primary_metric
                    .unwrap_or_else(|| DEFAULT_METRIC.to_string()),
            )
            .with_assignment_mode(request.assignment_mode);

        if let Some(description) = request.description {
            experiment = experiment.with_description(description);
        }

        if let Some(effect) = request.minimum_effect_size {
            experiment = experiment.with_minimum_effect_size(effect);
        }

        let early_stopping = match (request.early_stopping, request.analysis_method) {
            (Some(rules), _) => Some(rules),
            (None, AnalysisMethod::Sequential) => Some(self.settings.default_early_stopping()),
            (None, _) => None,
        };

        if let Some(rules) = early_stopping {
            experiment = experiment.with_early_stopping(rules);
        }

        for rule in request.targeting {
            experiment = experiment.with_targeting_rule(rule);
        }

        for variant_req in request.variants {
            experiment = experiment.with_variant(self.build_variant(variant_req)?);
        }

        experiment.validate()?;

        Ok(experiment)
    }

    fn build_variant(&self, request: CreateVariantRequest) -> Result<Variant, DomainError> {
        let variant_id = VariantId::new(&request.id)?;

        let mut variant = Variant::new(variant_id, request.name)
            .with_content(request.content)
            .with_control(request.control);

        if let Some(description) = request.description {
            variant = variant.with_description(description);
        }

        Ok(variant)
    }

    fn build_report(
        &self,
        experiment: &Experiment,
        now: DateTime<Utc>,
    ) -> Result<ExperimentReport, DomainError> {
        let metric = experiment.primary_metric();
        let arms = arm_counts(experiment);

        let significance = significance_or_undefined(
            &arms,
            experiment.significance_level(),
            self.settings.min_sample_size_per_variant,
        )?;

        let (bayesian, retrospective) = match arms.split_first() {
            Some((control, treatments)) => {
                let bayesian =
                    bayesian_compare_all(control, treatments, self.settings.credible_level)?;

                let best = treatments
                    .iter()
                    .filter(|t| t.participants > 0)
                    .max_by(|a, b| a.rate().total_cmp(&b.rate()));

                let retrospective = match best {
                    Some(treatment) if control.participants > 0 => Some(retrospective_power(
                        control,
                        treatment,
                        experiment.significance_level(),
                        arms.len(),
                    )?),
                    _ => None,
                };

                (bayesian, retrospective)
            }
            None => (Vec::new(), None),
        };

        let variants = experiment
            .variants()
            .iter()
            .filter_map(|variant| {
                experiment
                    .variant_statistics(variant.id())
                    .map(|stats| VariantSummary {
                        variant_id: variant.id().clone(),
                        name: variant.name().to_string(),
                        control: experiment
                            .control_variant()
                            .is_some_and(|c| c.id() == variant.id()),
                        participants: stats.participants(),
                        conversions: stats.conversions(metric),
                        conversion_rate: stats.conversion_rate(metric),
                        metrics: stats.metrics().clone(),
                    })
            })
            .collect();

        Ok(ExperimentReport {
            experiment_id: experiment.id().clone(),
            name: experiment.name().to_string(),
            status: ExperimentStatus::Analyzed,
            stop_reason: experiment.stop_reason(),
            analysis_method: experiment.analysis_method(),
            primary_metric: metric.to_string(),
            started_at: experiment.started_at(),
            completed_at: experiment.completed_at(),
            analyzed_at: now,
            variants,
            significance,
            bayesian,
            retrospective_power: retrospective,
            interim_analyses: experiment.interim_analyses().to_vec(),
        })
    }
}
