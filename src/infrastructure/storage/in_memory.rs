//! In-memory storage implementation

use std::collections::HashMap;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use serde_json::Value;

use crate::domain::storage::{Storage, StorageEntity, StorageKey};
use crate::domain::DomainError;

/// Thread-safe in-memory storage
///
/// Entities are kept in their serialized form, so every read returns a fresh
/// copy decoded from exactly what was written. Data is lost when the process
/// terminates.
#[derive(Debug)]
pub struct InMemoryStorage<E>
where
    E: StorageEntity,
{
    entities: RwLock<HashMap<String, Value>>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> Default for InMemoryStorage<E>
where
    E: StorageEntity,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<E> InMemoryStorage<E>
where
    E: StorageEntity,
{
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
            _entity: PhantomData,
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<String, Value>>, DomainError> {
        self.entities
            .read()
            .map_err(|e| DomainError::internal(format!("Failed to acquire read lock: {}", e)))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<String, Value>>, DomainError> {
        self.entities
            .write()
            .map_err(|e| DomainError::internal(format!("Failed to acquire write lock: {}", e)))
    }

    fn encode(entity: &E) -> Result<Value, DomainError> {
        serde_json::to_value(entity).map_err(|e| {
            DomainError::storage(format!(
                "Failed to serialize entity '{}': {}",
                entity.key().as_str(),
                e
            ))
        })
    }

    fn decode(key: &str, value: &Value) -> Result<E, DomainError> {
        E::deserialize(value).map_err(|e| {
            DomainError::storage(format!("Failed to deserialize entity '{}': {}", key, e))
        })
    }
}

#[async_trait]
impl<E> Storage<E> for InMemoryStorage<E>
where
    E: StorageEntity + 'static,
{
    async fn get(&self, key: &E::Key) -> Result<Option<E>, DomainError> {
        let entities = self.read()?;

        entities
            .get(key.as_str())
            .map(|value| Self::decode(key.as_str(), value))
            .transpose()
    }

    async fn list(&self) -> Result<Vec<E>, DomainError> {
        let entities = self.read()?;

        entities
            .iter()
            .map(|(key, value)| Self::decode(key, value))
            .collect()
    }

    async fn create(&self, entity: E) -> Result<E, DomainError> {
        let key = entity.key().as_str().to_string();
        let encoded = Self::encode(&entity)?;
        let mut entities = self.write()?;

        if entities.contains_key(&key) {
            return Err(DomainError::conflict(format!(
                "Entity with key '{}' already exists",
                key
            )));
        }

        entities.insert(key, encoded);
        Ok(entity)
    }

    async fn update(&self, entity: E) -> Result<E, DomainError> {
        let key = entity.key().as_str().to_string();
        let encoded = Self::encode(&entity)?;
        let mut entities = self.write()?;

        match entities.get_mut(&key) {
            Some(slot) => {
                *slot = encoded;
                Ok(entity)
            }
            None => Err(DomainError::not_found(format!(
                "Entity with key '{}' not found",
                key
            ))),
        }
    }

    async fn delete(&self, key: &E::Key) -> Result<bool, DomainError> {
        Ok(self.write()?.remove(key.as_str()).is_some())
    }

    async fn exists(&self, key: &E::Key) -> Result<bool, DomainError> {
        Ok(self.read()?.contains_key(key.as_str()))
    }

    async fn count(&self) -> Result<usize, DomainError> {
        Ok(self.read()?.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::experiment::{Experiment, ExperimentId, Variant, VariantId};
    use chrono::Utc;

    fn experiment(id: &str, name: &str) -> Experiment {
        Experiment::new(ExperimentId::new(id).unwrap(), name, Utc::now())
            .with_variant(Variant::new(VariantId::new("a").unwrap(), "A"))
            .with_variant(Variant::new(VariantId::new("b").unwrap(), "B"))
            .with_traffic_split(vec![50.0, 50.0])
    }

    fn key(id: &str) -> ExperimentId {
        ExperimentId::new(id).unwrap()
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let storage: InMemoryStorage<Experiment> = InMemoryStorage::new();
        let e = experiment("exp-1", "Test");

        storage.create(e.clone()).await.unwrap();

        let result = storage.get(&key("exp-1")).await.unwrap();
        assert_eq!(result, Some(e));
    }

    #[tokio::test]
    async fn test_create_conflict() {
        let storage: InMemoryStorage<Experiment> = InMemoryStorage::new();
        let e = experiment("exp-1", "Test");

        storage.create(e.clone()).await.unwrap();
        let result = storage.create(e).await;

        assert!(matches!(result, Err(DomainError::Conflict { .. })));
    }

    #[tokio::test]
    async fn test_update() {
        let storage: InMemoryStorage<Experiment> = InMemoryStorage::new();
        storage.create(experiment("exp-1", "Test")).await.unwrap();

        storage
            .update(experiment("exp-1", "Updated"))
            .await
            .unwrap();

        let result = storage.get(&key("exp-1")).await.unwrap();
        assert_eq!(result.unwrap().name(), "Updated");
    }

    #[tokio::test]
    async fn test_update_not_found() {
        let storage: InMemoryStorage<Experiment> = InMemoryStorage::new();
        let result = storage.update(experiment("exp-1", "Test")).await;

        assert!(matches!(result, Err(DomainError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_delete_and_count() {
        let storage: InMemoryStorage<Experiment> = InMemoryStorage::new();
        storage.create(experiment("exp-1", "A")).await.unwrap();
        storage.create(experiment("exp-2", "B")).await.unwrap();

        assert_eq!(storage.count().await.unwrap(), 2);
        assert!(storage.delete(&key("exp-1")).await.unwrap());
        assert!(!storage.delete(&key("exp-1")).await.unwrap());
        assert!(!storage.exists(&key("exp-1")).await.unwrap());
        assert_eq!(storage.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reads_are_detached_copies() {
        let storage: InMemoryStorage<Experiment> = InMemoryStorage::new();
        storage.create(experiment("exp-1", "Test")).await.unwrap();

        let mut loaded = storage.get(&key("exp-1")).await.unwrap().unwrap();
        loaded.start(Utc::now()).unwrap();

        let reloaded = storage.get(&key("exp-1")).await.unwrap().unwrap();
        assert!(reloaded.started_at().is_none());
    }
}
