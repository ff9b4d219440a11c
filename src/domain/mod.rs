//! Domain layer - Core experiment entities, rules and collaborator traits

pub mod error;
pub mod experiment;
pub mod storage;

pub use error::DomainError;
pub use storage::{Storage, StorageEntity, StorageKey};
