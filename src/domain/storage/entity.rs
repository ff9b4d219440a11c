//! Storage entity traits

use std::fmt::Debug;

use serde::{de::DeserializeOwned, Serialize};

/// Key type usable by string-keyed storage backends
pub trait StorageKey: Clone + Debug + Send + Sync + Eq + std::hash::Hash {
    fn as_str(&self) -> &str;
}

/// Aggregate that is stored and loaded as a single unit
pub trait StorageEntity: Clone + Debug + Send + Sync + Serialize + DeserializeOwned {
    type Key: StorageKey;

    fn key(&self) -> &Self::Key;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::experiment::{Experiment, ExperimentId};
    use chrono::Utc;

    #[test]
    fn test_experiment_key_is_its_id() {
        let id = ExperimentId::new("reply-rate").unwrap();
        let experiment = Experiment::new(id.clone(), "Reply rate", Utc::now());

        assert_eq!(experiment.key(), &id);
        assert_eq!(StorageKey::as_str(experiment.key()), "reply-rate");
    }
}
