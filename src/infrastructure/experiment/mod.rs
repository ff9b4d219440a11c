//! Statistics engine and persistence adapters for experiments

mod bayesian;
mod consistent_hashing;
mod distributions;
mod power;
mod sequential;
mod statistical;
mod storage_repository;

pub use bayesian::{compare as bayesian_compare, compare_all as bayesian_compare_all, posterior, DEFAULT_CREDIBLE_LEVEL};
pub use consistent_hashing::{ConsistentHasher, BUCKET_COUNT};
pub use distributions::{f_survival, normal_cdf, normal_quantile, two_sided_critical_value, two_tailed_p_value};
pub use power::{
    achieved_power, calculate_sample_size, cohens_h, minimum_detectable_effect,
    retrospective_power, SampleSizeParams, SENSITIVITY_POWER_LEVELS,
};
pub use sequential::{evaluate_interim, spending_schedule, InterimInput};
pub use statistical::{
    bonferroni_alpha, calculate_significance, one_way_anova, pairwise_tests,
    significance_or_undefined, two_proportion_z_test, DEFAULT_MIN_SAMPLE_SIZE_PER_VARIANT,
};
pub use storage_repository::StorageExperimentRepository;
