//! Consistent hashing for experiment variant assignment
//!
//! The same subject always lands in the same bucket for a given experiment,
//! independent of process, platform or toolchain.

use sha2::{Digest, Sha256};

/// Number of buckets the hash space is divided into
pub const BUCKET_COUNT: u32 = 10_000;

/// Consistent hasher for experiment assignments
#[derive(Debug, Clone, Copy)]
pub struct ConsistentHasher;

impl ConsistentHasher {
    /// Bucket in `[0, BUCKET_COUNT)` for a subject within an experiment
    pub fn bucket(experiment_id: &str, subject_id: &str) -> u32 {
        let mut hasher = Sha256::new();
        hasher.update(experiment_id.as_bytes());
        hasher.update(b":");
        hasher.update(subject_id.as_bytes());
        let digest = hasher.finalize();

        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);

        (u64::from_be_bytes(prefix) % u64::from(BUCKET_COUNT)) as u32
    }

    /// Bucket expressed as a point in `[0, 100)` for walking percentage weights
    pub fn traffic_point(experiment_id: &str, subject_id: &str) -> f64 {
        f64::from(Self::bucket(experiment_id, subject_id)) * 100.0 / f64::from(BUCKET_COUNT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_input_same_bucket() {
        let first = ConsistentHasher::bucket("exp-1", "member-42");
        let second = ConsistentHasher::bucket("exp-1", "member-42");
        assert_eq!(first, second);
    }

    #[test]
    fn test_bucket_in_range() {
        for i in 0..500 {
            let bucket = ConsistentHasher::bucket("exp-1", &format!("member-{}", i));
            assert!(bucket < BUCKET_COUNT);
        }
    }

    #[test]
    fn test_separator_prevents_collisions() {
        assert_ne!(
            ConsistentHasher::bucket("ab", "c"),
            ConsistentHasher::bucket("a", "bc")
        );
    }

    #[test]
    fn test_traffic_point_range() {
        let point = ConsistentHasher::traffic_point("exp-1", "member-1");
        assert!((0.0..100.0).contains(&point));
    }

    #[test]
    fn test_hash_distribution() {
        let mut buckets = [0u32; 10];

        for i in 0..10_000 {
            let bucket = ConsistentHasher::bucket("exp-1", &format!("member-{}", i));
            buckets[(bucket / 1_000) as usize] += 1;
        }

        for count in buckets {
            assert!(count > 850 && count < 1150, "bucket count {} out of range", count);
        }
    }

    #[test]
    fn test_experiments_hash_independently() {
        let differing = (0..200)
            .filter(|i| {
                let subject = format!("member-{}", i);
                ConsistentHasher::bucket("exp-1", &subject) / 5_000
                    != ConsistentHasher::bucket("exp-2", &subject) / 5_000
            })
            .count();

        // Roughly half should land on different halves
        assert!(differing > 60 && differing < 140);
    }
}
