//! Infrastructure layer - statistics engine, storage and collaborator implementations

pub mod events;
pub mod experiment;
pub mod logging;
pub mod observability;
pub mod services;
pub mod storage;
