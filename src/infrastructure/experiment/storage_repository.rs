//! Storage-backed experiment repository

use async_trait::async_trait;
use std::sync::Arc;

use crate::domain::experiment::{Experiment, ExperimentId, ExperimentQuery, ExperimentRepository};
use crate::domain::storage::Storage;
use crate::domain::DomainError;

/// Storage-backed implementation of ExperimentRepository
#[derive(Debug, Clone)]
pub struct StorageExperimentRepository {
    storage: Arc<dyn Storage<Experiment>>,
}

impl StorageExperimentRepository {
    pub fn new(storage: Arc<dyn Storage<Experiment>>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl ExperimentRepository for StorageExperimentRepository {
    async fn create(&self, experiment: Experiment) -> Result<Experiment, DomainError> {
        if self.storage.exists(experiment.id()).await? {
            return Err(DomainError::conflict(format!(
                "Experiment '{}' already exists",
                experiment.id()
            )));
        }

        self.storage.create(experiment).await
    }

    async fn get(&self, id: &ExperimentId) -> Result<Option<Experiment>, DomainError> {
        self.storage.get(id).await
    }

    async fn save(&self, experiment: Experiment) -> Result<Experiment, DomainError> {
        if !self.storage.exists(experiment.id()).await? {
            return Err(DomainError::not_found(format!(
                "Experiment '{}' not found",
                experiment.id()
            )));
        }

        self.storage.update(experiment).await
    }

    async fn delete(&self, id: &ExperimentId) -> Result<bool, DomainError> {
        self.storage.delete(id).await
    }

    async fn list(&self, query: &ExperimentQuery) -> Result<Vec<Experiment>, DomainError> {
        Ok(query.apply(self.storage.list().await?))
    }

    async fn exists(&self, id: &ExperimentId) -> Result<bool, DomainError> {
        self.storage.exists(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::experiment::{
        Assignment, ConversionPolicy, ExperimentStatus, SubjectId, Variant, VariantId,
        DEFAULT_METRIC,
    };
    use crate::infrastructure::storage::InMemoryStorage;
    use chrono::Utc;

    fn create_repo() -> StorageExperimentRepository {
        let storage = Arc::new(InMemoryStorage::<Experiment>::new());
        StorageExperimentRepository::new(storage)
    }

    fn create_test_experiment(id: &str) -> Experiment {
        Experiment::new(
            ExperimentId::new(id).unwrap(),
            format!("Experiment {}", id),
            Utc::now(),
        )
        .with_variant(Variant::new(VariantId::new("control").unwrap(), "Control").with_control(true))
        .with_variant(Variant::new(VariantId::new("treatment").unwrap(), "Treatment"))
        .with_traffic_split(vec![50.0, 50.0])
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = create_repo();
        repo.create(create_test_experiment("test-1")).await.unwrap();

        let fetched = repo.get(&ExperimentId::new("test-1").unwrap()).await.unwrap();
        assert_eq!(fetched.unwrap().name(), "Experiment test-1");
    }

    #[tokio::test]
    async fn test_create_duplicate() {
        let repo = create_repo();
        let exp = create_test_experiment("test-1");

        repo.create(exp.clone()).await.unwrap();
        let result = repo.create(exp).await;

        assert!(result.unwrap_err().to_string().contains("already exists"));
    }

    #[tokio::test]
    async fn test_save_missing() {
        let repo = create_repo();
        let result = repo.save(create_test_experiment("test-1")).await;
        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_list_by_status() {
        let repo = create_repo();
        repo.create(create_test_experiment("draft")).await.unwrap();

        let mut active = create_test_experiment("active");
        active.start(Utc::now()).unwrap();
        repo.create(active).await.unwrap();

        let results = repo
            .list(&ExperimentQuery::new().with_status(ExperimentStatus::Active))
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id().as_str(), "active");
    }

    #[tokio::test]
    async fn test_save_load_round_trip() {
        let repo = create_repo();
        let mut exp = create_test_experiment("round-trip");
        repo.create(exp.clone()).await.unwrap();

        let now = Utc::now();
        exp.start(now).unwrap();

        for (subject, variant) in [("s-1", "control"), ("s-2", "treatment"), ("s-3", "treatment")] {
            exp.record_assignment(Assignment::new(
                exp.id().clone(),
                SubjectId::new(subject).unwrap(),
                VariantId::new(variant).unwrap(),
                now,
            ))
            .unwrap();
        }

        exp.record_conversion(
            &SubjectId::new("s-2").unwrap(),
            DEFAULT_METRIC,
            1.0,
            ConversionPolicy::default(),
            now,
        )
        .unwrap();

        repo.save(exp.clone()).await.unwrap();
        let loaded = repo.load(exp.id()).await.unwrap();
        repo.save(loaded.clone()).await.unwrap();
        let reloaded = repo.load(exp.id()).await.unwrap();

        assert_eq!(reloaded.statistics(), exp.statistics());
        assert_eq!(reloaded.assignments(), exp.assignments());
        assert_eq!(reloaded, loaded);
    }

    #[tokio::test]
    async fn test_delete() {
        let repo = create_repo();
        repo.create(create_test_experiment("test-1")).await.unwrap();

        let id = ExperimentId::new("test-1").unwrap();
        assert!(repo.delete(&id).await.unwrap());
        assert!(!repo.exists(&id).await.unwrap());
    }
}
