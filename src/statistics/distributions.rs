use statrs::distribution::{ChiSquared, ContinuousCDF, Normal};

use crate::error::{AnalysisError, Result};

fn chi_squared(dof: usize) -> Result<ChiSquared> {
    ChiSquared::new(dof as f64).map_err(|e| AnalysisError::Distribution(e.to_string()))
}

/// Right-tail probability `P(X > x)` of a chi-square variable with `dof` degrees of freedom.
pub fn chi_square_upper_tail(x: f64, dof: usize) -> Result<f64> {
    Ok(chi_squared(dof)?.sf(x))
}

/// Value `x` with `P(X <= x) = p` for a chi-square variable with `dof` degrees of freedom.
pub fn chi_square_inverse_cdf(p: f64, dof: usize) -> Result<f64> {
    Ok(chi_squared(dof)?.inverse_cdf(p))
}

/// `1 - P(-z <= Z <= z)` for a standard normal `Z`.
pub fn two_tailed_normal_p(z: f64) -> Result<f64> {
    let normal = Normal::new(0.0, 1.0).map_err(|e| AnalysisError::Distribution(e.to_string()))?;
    let z = z.abs();
    Ok(1.0 - (normal.cdf(z) - normal.cdf(-z)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_chi_square_critical_values() {
        assert_abs_diff_eq!(chi_square_inverse_cdf(0.95, 3).unwrap(), 7.814728, epsilon = 1e-4);
        assert_abs_diff_eq!(chi_square_inverse_cdf(0.90, 1).unwrap(), 2.705543, epsilon = 1e-4);
        assert_abs_diff_eq!(chi_square_upper_tail(7.814728, 3).unwrap(), 0.05, epsilon = 1e-5);
        assert!(chi_square_upper_tail(1.0, 0).is_err());
    }

    #[test]
    fn test_two_tailed_normal() {
        assert_abs_diff_eq!(two_tailed_normal_p(1.959964).unwrap(), 0.05, epsilon = 1e-5);
        assert_abs_diff_eq!(two_tailed_normal_p(0.0).unwrap(), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(two_tailed_normal_p(-1.959964).unwrap(), 0.05, epsilon = 1e-5);
    }
}
