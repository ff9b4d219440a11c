//! Distribution helpers backed by statrs

use statrs::distribution::{ContinuousCDF, FisherSnedecor};
use statrs::function::erf::{erfc, erfc_inv};
use std::f64::consts::SQRT_2;

use crate::domain::DomainError;

/// Standard normal CDF
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

/// Standard normal quantile for `p` in (0, 1)
pub fn normal_quantile(p: f64) -> Result<f64, DomainError> {
    if !(p > 0.0 && p < 1.0) {
        return Err(DomainError::computation(format!(
            "Normal quantile requires a probability in (0, 1), got {}",
            p
        )));
    }
    Ok(-SQRT_2 * erfc_inv(2.0 * p))
}

/// Two-tailed p-value of a z statistic
pub fn two_tailed_p_value(z: f64) -> f64 {
    erfc(z.abs() / SQRT_2).clamp(0.0, 1.0)
}

/// Critical value z_{1 - alpha/2} of a two-sided test
pub fn two_sided_critical_value(alpha: f64) -> Result<f64, DomainError> {
    normal_quantile(1.0 - alpha / 2.0)
}

/// Upper-tail probability of the F distribution
pub fn f_survival(f: f64, df_between: f64, df_within: f64) -> Result<f64, DomainError> {
    let dist = FisherSnedecor::new(df_between, df_within).map_err(|e| {
        DomainError::computation(format!(
            "Invalid F distribution ({}, {}): {}",
            df_between, df_within, e
        ))
    })?;

    Ok(dist.sf(f).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normal_cdf_reference_points() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-12);
        assert!((normal_cdf(1.959964) - 0.975).abs() < 1e-6);
        assert!((normal_cdf(-1.0) - 0.158655).abs() < 1e-6);
    }

    #[test]
    fn test_normal_quantile_inverts_cdf() {
        assert!((normal_quantile(0.975).unwrap() - 1.959964).abs() < 1e-5);
        assert!((normal_quantile(0.8).unwrap() - 0.841621).abs() < 1e-5);
        assert!(normal_quantile(0.5).unwrap().abs() < 1e-12);

        for p in [0.001, 0.1, 0.3, 0.7, 0.99] {
            let z = normal_quantile(p).unwrap();
            assert!((normal_cdf(z) - p).abs() < 1e-9);
        }
    }

    #[test]
    fn test_normal_quantile_rejects_bounds() {
        assert!(matches!(
            normal_quantile(0.0),
            Err(DomainError::Computation { .. })
        ));
        assert!(normal_quantile(1.0).is_err());
        assert!(normal_quantile(f64::NAN).is_err());
    }

    #[test]
    fn test_two_tailed_p_value() {
        assert!((two_tailed_p_value(1.959964) - 0.05).abs() < 1e-6);
        assert!((two_tailed_p_value(-1.959964) - 0.05).abs() < 1e-6);
        assert!((two_tailed_p_value(0.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_f_survival() {
        // F(2, 297) critical value at 5% is about 3.026
        let p = f_survival(3.026, 2.0, 297.0).unwrap();
        assert!((p - 0.05).abs() < 1e-3);

        assert!((f_survival(0.0, 2.0, 10.0).unwrap() - 1.0).abs() < 1e-12);
        assert!(f_survival(1.0, 0.0, 10.0).is_err());
    }
}
