//! Experiment repository trait and query types

use async_trait::async_trait;
use std::fmt::Debug;

use super::entity::{AnalysisMethod, Experiment, ExperimentId, ExperimentStatus};
use crate::domain::DomainError;

// ============================================================================
// ExperimentQuery
// ============================================================================

/// Query parameters for listing experiments
#[derive(Debug, Clone, Default)]
pub struct ExperimentQuery {
    /// Filter by status
    pub status: Option<ExperimentStatus>,
    /// Filter by analysis method
    pub analysis_method: Option<AnalysisMethod>,
    /// Maximum number of results
    pub limit: Option<usize>,
    /// Number of results to skip
    pub offset: Option<usize>,
}

impl ExperimentQuery {
    /// Create a new query with no filters
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_status(mut self, status: ExperimentStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_analysis_method(mut self, method: AnalysisMethod) -> Self {
        self.analysis_method = Some(method);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Check whether an experiment passes the filters
    pub fn matches(&self, experiment: &Experiment) -> bool {
        self.status.is_none_or(|s| experiment.status() == s)
            && self
                .analysis_method
                .is_none_or(|m| experiment.analysis_method() == m)
    }

    /// Filter, sort newest first and paginate
    pub fn apply(&self, experiments: Vec<Experiment>) -> Vec<Experiment> {
        let mut results: Vec<_> = experiments.into_iter().filter(|e| self.matches(e)).collect();

        results.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });

        let offset = self.offset.unwrap_or(0);
        let limit = self.limit.unwrap_or(usize::MAX);

        results.into_iter().skip(offset).take(limit).collect()
    }
}

// ============================================================================
// ExperimentRepository
// ============================================================================

/// Persistence collaborator for experiment aggregates
///
/// `save` replaces the whole aggregate, so a mutated experiment is either
/// stored completely or not at all.
#[async_trait]
pub trait ExperimentRepository: Send + Sync + Debug {
    /// Store a new experiment; fails with `Conflict` if the ID is taken
    async fn create(&self, experiment: Experiment) -> Result<Experiment, DomainError>;

    /// Load an experiment by ID
    async fn get(&self, id: &ExperimentId) -> Result<Option<Experiment>, DomainError>;

    /// Replace an existing experiment; fails with `NotFound` if absent
    async fn save(&self, experiment: Experiment) -> Result<Experiment, DomainError>;

    /// Delete an experiment by ID
    async fn delete(&self, id: &ExperimentId) -> Result<bool, DomainError>;

    /// List experiments with optional filters
    async fn list(&self, query: &ExperimentQuery) -> Result<Vec<Experiment>, DomainError>;

    /// Load an experiment, failing with `NotFound` if absent
    async fn load(&self, id: &ExperimentId) -> Result<Experiment, DomainError> {
        self.get(id)
            .await?
            .ok_or_else(|| DomainError::not_found(format!("Experiment '{}' not found", id)))
    }

    async fn exists(&self, id: &ExperimentId) -> Result<bool, DomainError> {
        Ok(self.get(id).await?.is_some())
    }
}

#[cfg(test)]
pub mod mock {
    //! Mock implementation for testing

    use super::*;
    use std::collections::HashMap;
    use std::sync::RwLock;

    /// Mock experiment repository for testing
    #[derive(Debug, Default)]
    pub struct MockExperimentRepository {
        experiments: RwLock<HashMap<String, Experiment>>,
        should_fail: RwLock<bool>,
        saves: RwLock<usize>,
    }

    impl MockExperimentRepository {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_experiment(self, experiment: Experiment) -> Self {
            self.experiments
                .write()
                .unwrap()
                .insert(experiment.id().as_str().to_string(), experiment);
            self
        }

        pub fn with_error(self) -> Self {
            *self.should_fail.write().unwrap() = true;
            self
        }

        pub fn set_failing(&self, fail: bool) {
            *self.should_fail.write().unwrap() = fail;
        }

        /// Number of successful `save` calls
        pub fn save_count(&self) -> usize {
            *self.saves.read().unwrap()
        }

        fn check_should_fail(&self) -> Result<(), DomainError> {
            if *self.should_fail.read().unwrap() {
                Err(DomainError::storage("Mock error"))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl ExperimentRepository for MockExperimentRepository {
        async fn create(&self, experiment: Experiment) -> Result<Experiment, DomainError> {
            self.check_should_fail()?;
            let id = experiment.id().as_str().to_string();
            let mut experiments = self.experiments.write().unwrap();

            if experiments.contains_key(&id) {
                return Err(DomainError::conflict(format!(
                    "Experiment '{}' already exists",
                    id
                )));
            }

            experiments.insert(id, experiment.clone());
            Ok(experiment)
        }

        async fn get(&self, id: &ExperimentId) -> Result<Option<Experiment>, DomainError> {
            self.check_should_fail()?;
            Ok(self.experiments.read().unwrap().get(id.as_str()).cloned())
        }

        async fn save(&self, experiment: Experiment) -> Result<Experiment, DomainError> {
            self.check_should_fail()?;
            let id = experiment.id().as_str().to_string();
            let mut experiments = self.experiments.write().unwrap();

            if !experiments.contains_key(&id) {
                return Err(DomainError::not_found(format!(
                    "Experiment '{}' not found",
                    id
                )));
            }

            experiments.insert(id, experiment.clone());
            *self.saves.write().unwrap() += 1;
            Ok(experiment)
        }

        async fn delete(&self, id: &ExperimentId) -> Result<bool, DomainError> {
            self.check_should_fail()?;
            Ok(self
                .experiments
                .write()
                .unwrap()
                .remove(id.as_str())
                .is_some())
        }

        async fn list(&self, query: &ExperimentQuery) -> Result<Vec<Experiment>, DomainError> {
            self.check_should_fail()?;
            let all = self.experiments.read().unwrap().values().cloned().collect();
            Ok(query.apply(all))
        }
    }
}
