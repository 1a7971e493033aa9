//! Sampling adequacy (Kaiser-Meyer-Olkin) and Bartlett's test of sphericity.

use ndarray::{Array1, ArrayView2};
use serde::Serialize;

use super::distributions::{chi_square_inverse_cdf, chi_square_upper_tail};
use crate::dense::determinant;
use crate::error::{AnalysisError, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Kmo {
    pub overall: f64,
    pub items: Array1<f64>,
}

/// Kaiser-Meyer-Olkin statistic, overall and per item.
///
/// `kmo = Σr² / (Σr² + Σa²)` over off-diagonal entries, where `r` are correlations and `a`
/// partial correlations. A fully indeterminate ratio (both sums zero) is 0.5.
pub fn kmo(correlation: ArrayView2<f64>, partial: ArrayView2<f64>) -> Result<Kmo> {
    let n = correlation.nrows();
    if correlation.dim() != (n, n) || partial.dim() != (n, n) {
        return Err(AnalysisError::invalid(format!(
            "KMO needs two square matrices of the same size, got {:?} and {:?}",
            correlation.dim(),
            partial.dim()
        )));
    }

    let ratio = |r2: f64, a2: f64| {
        if r2 == 0.0 && a2 == 0.0 {
            0.5
        } else {
            r2 / (r2 + a2)
        }
    };

    let mut total_r2 = 0.0;
    let mut total_a2 = 0.0;
    let mut items = Array1::zeros(n);
    for i in 0..n {
        let mut r2 = 0.0;
        let mut a2 = 0.0;
        for j in (0..n).filter(|&j| j != i) {
            r2 += correlation[[i, j]] * correlation[[i, j]];
            a2 += partial[[i, j]] * partial[[i, j]];
        }
        items[i] = ratio(r2, a2);
        total_r2 += r2;
        total_a2 += a2;
    }

    Ok(Kmo {
        overall: ratio(total_r2, total_a2),
        items,
    })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BartlettTest {
    pub chi_square: f64,
    pub degrees_of_freedom: usize,
    /// Right-tail probability of `chi_square`.
    pub p_value: f64,
    /// Chi-square value at the 10% significance level.
    pub critical_10: f64,
    /// Chi-square value at the 5% significance level.
    pub critical_05: f64,
}

impl BartlettTest {
    /// True when sphericity is rejected at the given significance level.
    pub fn rejects_at(&self, significance: f64) -> bool {
        self.p_value < significance
    }
}

/// Bartlett's test that a correlation matrix differs from the identity.
///
/// `χ² = -((n - 1) - (2p + 5)/6) ln|R|` with `p(p-1)/2` degrees of freedom. A singular
/// correlation matrix has no logarithm and is reported as a degenerate computation.
pub fn bartlett(correlation: ArrayView2<f64>, n_persons: usize) -> Result<BartlettTest> {
    let n_items = correlation.nrows();
    if n_items < 2 {
        return Err(AnalysisError::InsufficientData {
            operation: "Bartlett sphericity test",
            what: "items",
            required: 2,
            actual: n_items,
        });
    }
    let det = determinant(correlation)?;
    if !det.is_finite() || det <= 0.0 {
        return Err(AnalysisError::degenerate(
            "Bartlett sphericity test",
            format!("correlation matrix is singular (determinant {:e})", det),
        ));
    }

    let chi_square =
        -((n_persons as f64 - 1.0) - (2.0 * n_items as f64 + 5.0) / 6.0) * det.ln();
    let degrees_of_freedom = n_items * (n_items - 1) / 2;

    Ok(BartlettTest {
        chi_square,
        degrees_of_freedom,
        p_value: chi_square_upper_tail(chi_square, degrees_of_freedom)?,
        critical_10: chi_square_inverse_cdf(0.90, degrees_of_freedom)?,
        critical_05: chi_square_inverse_cdf(0.95, degrees_of_freedom)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};

    #[test]
    fn test_kmo_identity_is_half() {
        let eye = Array2::<f64>::eye(4);
        let k = kmo(eye.view(), eye.view()).unwrap();
        assert_eq!(k.overall, 0.5);
        assert!(k.items.iter().all(|&v| v == 0.5));
    }

    #[test]
    fn test_kmo_weights_correlation_against_partials() {
        let r = array![[1.0, 0.6], [0.6, 1.0]];
        let a = array![[1.0, 0.2], [0.2, 1.0]];
        let k = kmo(r.view(), a.view()).unwrap();
        assert_relative_eq!(k.overall, 0.36 / (0.36 + 0.04));
        assert_relative_eq!(k.items[0], 0.9);
        assert!(kmo(r.view(), Array2::<f64>::eye(3).view()).is_err());
    }

    #[test]
    fn test_bartlett_statistic() {
        let r = array![[1.0, 0.5], [0.5, 1.0]];
        let test = bartlett(r.view(), 30).unwrap();
        let expected = -(29.0 - 9.0 / 6.0) * 0.75_f64.ln();
        assert_relative_eq!(test.chi_square, expected, epsilon = 1e-10);
        assert_eq!(test.degrees_of_freedom, 1);
        assert!(test.rejects_at(0.05));
        assert!(test.critical_05 > test.critical_10);
    }

    #[test]
    fn test_bartlett_singular_matrix_fails() {
        let r = array![[1.0, 1.0], [1.0, 1.0]];
        match bartlett(r.view(), 10) {
            Err(AnalysisError::DegenerateComputation { .. }) => {}
            other => panic!("expected degenerate computation, got {:?}", other),
        }
    }
}
