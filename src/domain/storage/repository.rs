//! Storage trait definition

use std::fmt::Debug;

use async_trait::async_trait;

use crate::domain::DomainError;

use super::entity::StorageEntity;

/// Generic key-value storage for whole aggregates
///
/// Writes replace the stored value in one step; a backend must never leave a
/// partially written entity behind.
#[async_trait]
pub trait Storage<E>: Send + Sync + Debug
where
    E: StorageEntity + 'static,
{
    async fn get(&self, key: &E::Key) -> Result<Option<E>, DomainError>;

    async fn list(&self) -> Result<Vec<E>, DomainError>;

    /// Insert a new entity; fails with `Conflict` if the key exists
    async fn create(&self, entity: E) -> Result<E, DomainError>;

    /// Replace an existing entity; fails with `NotFound` if the key is absent
    async fn update(&self, entity: E) -> Result<E, DomainError>;

    /// Returns `true` if an entity was removed
    async fn delete(&self, key: &E::Key) -> Result<bool, DomainError>;

    async fn exists(&self, key: &E::Key) -> Result<bool, DomainError> {
        Ok(self.get(key).await?.is_some())
    }

    async fn count(&self) -> Result<usize, DomainError> {
        Ok(self.list().await?.len())
    }
}
