//! # Varimax rotation
//!
//! Orthogonal rotation of extracted loadings by repeated pairwise Kaiser rotations until the
//! varimax criterion stops improving.
//!
//! The stateless entry point is [`rotate`], which accepts any item × factor loading matrix and a
//! weight per item. [`RotatedLoadings`] is the post-processed form produced from a PCA spectrum:
//! components re-sorted by rotated variance and rescaled to the unrotated variance of the
//! extracted set.

use log::{debug, warn};
use ndarray::{s, Array1, Array2, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::ordering::EigenSpectrum;
use crate::dense::Rescale;
use crate::error::{AnalysisError, Diagnostic, Result};
use crate::scores::IdenticalElements;
use crate::utils::{cumulative, descending_order, Direction};

/// Weighting applied to the loadings before rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VarimaxMethod {
    /// Loadings are divided by the square root of each item's communality.
    #[default]
    Normal,
    /// Loadings are rotated as they are.
    Raw,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RotationOptions {
    /// Stop once the criterion changes by less than this between two full passes.
    pub tolerance: f64,
    /// Upper bound on full passes over all factor pairs.
    pub max_iterations: usize,
}

impl Default for RotationOptions {
    fn default() -> Self {
        RotationOptions {
            tolerance: 1e-8,
            max_iterations: 1000,
        }
    }
}

impl RotationOptions {
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    fn validate(&self) -> Result<()> {
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(AnalysisError::configuration(
                "varimax tolerance",
                self.tolerance,
                "must be finite and non-negative",
            ));
        }
        if self.max_iterations == 0 {
            return Err(AnalysisError::configuration(
                "varimax maximum iterations",
                self.max_iterations,
                "at least one pass is required",
            ));
        }
        Ok(())
    }
}

/// `V = n * Σ L⁴ - Σ_k (Σ_j L_kj²)²` for a factor × item matrix with `n` items.
pub fn varimax_criterion(factor_rows: ArrayView2<f64>) -> f64 {
    let n_items = factor_rows.ncols() as f64;
    let quartic: f64 = factor_rows.iter().map(|&v| v.powi(4)).sum();
    let squared: f64 = factor_rows
        .rows()
        .into_iter()
        .map(|row| {
            let ss: f64 = row.iter().map(|&v| v * v).sum();
            ss * ss
        })
        .sum();
    n_items * quartic - squared
}

/// Kaiser angle maximising the criterion over the plane of factors `k` and `l`.
pub fn varimax_angle(factor_rows: ArrayView2<f64>, k: usize, l: usize) -> f64 {
    let n_items = factor_rows.ncols() as f64;
    let (mut a, mut b, mut c, mut d) = (0.0, 0.0, 0.0, 0.0);
    for (&x, &y) in factor_rows.row(k).iter().zip(factor_rows.row(l).iter()) {
        let u = x * x - y * y;
        let v = 2.0 * x * y;
        a += u;
        b += v;
        c += u * u - v * v;
        d += 2.0 * u * v;
    }
    let numerator = d - 2.0 * a * b / n_items;
    let denominator = c - (a * a - b * b) / n_items;
    0.25 * numerator.atan2(denominator)
}

/// Rotates factors `k` and `l` by `angle` in place.
pub fn single_rotation(factor_rows: &mut Array2<f64>, k: usize, l: usize, angle: f64) {
    let (sin, cos) = angle.sin_cos();
    for j in 0..factor_rows.ncols() {
        let x = factor_rows[[k, j]];
        let y = factor_rows[[l, j]];
        factor_rows[[k, j]] = x * cos + y * sin;
        factor_rows[[l, j]] = -x * sin + y * cos;
    }
}

/// Square root of each item's sum of squared loadings (rows of an item × factor matrix).
pub fn normal_weights(loadings: ArrayView2<f64>) -> Array1<f64> {
    loadings.map_axis(Axis(1), |row| row.iter().map(|&v| v * v).sum::<f64>().sqrt())
}

/// Result of the stateless rotation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VarimaxOutcome {
    /// Item × factor rotated loadings, weights restored.
    pub loadings: Array2<f64>,
    /// Number of full passes over all factor pairs.
    pub iterations: usize,
    pub converged: bool,
    /// Change of the criterion over the last pass.
    pub last_change: f64,
    /// Criterion of the weighted loadings before rotation and after every pass.
    pub criterion_history: Vec<f64>,
}

/// Varimax-rotates an item × factor loading matrix.
///
/// Each item's loadings are divided by its weight before rotation and multiplied back
/// afterwards; a zero loading with a zero weight is rotated as one. A weight that is not
/// positive is only accepted for an item whose loadings are all zero. Pass weights of one for a
/// raw rotation or [`normal_weights`] for a normal rotation. Reaching
/// `options.max_iterations` is not an error: the last pass is returned with
/// `converged == false`.
pub fn rotate(
    loadings: ArrayView2<f64>,
    weights: &[f64],
    options: &RotationOptions,
) -> Result<VarimaxOutcome> {
    options.validate()?;
    let (n_items, n_factors) = loadings.dim();
    if n_items == 0 || n_factors == 0 {
        return Err(AnalysisError::InsufficientData {
            operation: "varimax rotation",
            what: "loadings",
            required: 1,
            actual: 0,
        });
    }
    if weights.len() != n_items {
        return Err(AnalysisError::invalid(format!(
            "{} communality weights supplied for {} items",
            weights.len(),
            n_items
        )));
    }
    if loadings.iter().chain(weights).any(|v| !v.is_finite()) {
        return Err(AnalysisError::invalid(
            "loadings and weights must be finite",
        ));
    }
    for (i, &weight) in weights.iter().enumerate() {
        if weight <= 0.0 && loadings.row(i).iter().any(|&v| v != 0.0) {
            return Err(AnalysisError::invalid(format!(
                "item {} has weight {} but nonzero loadings",
                i, weight
            )));
        }
    }

    let mut rows = Array2::from_shape_fn((n_factors, n_items), |(k, i)| {
        let (value, weight) = (loadings[[i, k]], weights[i]);
        if value == 0.0 && weight == 0.0 {
            1.0
        } else {
            value / weight
        }
    });

    let mut criterion = varimax_criterion(rows.view());
    let mut history = vec![criterion];
    let mut iterations = 0;
    let mut last_change = f64::INFINITY;
    let mut converged = false;

    while iterations < options.max_iterations {
        for k in 0..n_factors.saturating_sub(1) {
            for l in (k + 1)..n_factors {
                let angle = varimax_angle(rows.view(), k, l);
                single_rotation(&mut rows, k, l, angle);
            }
        }
        let next = varimax_criterion(rows.view());
        iterations += 1;
        last_change = (next - criterion).abs();
        criterion = next;
        history.push(criterion);
        if last_change < options.tolerance {
            converged = true;
            break;
        }
    }

    rows.rescale(weights, &Direction::COLUMN)?;
    debug!(
        "varimax: {} factors, {} passes, criterion {:.6}, converged {}",
        n_factors, iterations, criterion, converged
    );

    Ok(VarimaxOutcome {
        loadings: rows.reversed_axes(),
        iterations,
        converged,
        last_change,
        criterion_history: history,
    })
}

/// Rotated loadings of the leading factors of a PCA.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RotatedLoadings {
    pub method: VarimaxMethod,
    /// Item × factor loadings rescaled to the unrotated variance of the extracted factors.
    pub loadings: Array2<f64>,
    pub unscaled_loadings: Array2<f64>,
    /// Rotated eigenvalues in descending order, rescaled like `loadings`.
    pub eigenvalues: Array1<f64>,
    pub unscaled_eigenvalues: Array1<f64>,
    /// Rotated eigenvalues as a percentage of the full unrotated eigenvalue total.
    pub proportion_percentage: Array1<f64>,
    pub cumulative_percentage: Array1<f64>,
    /// `component_order[k]` is the extracted factor (position in the ordered spectrum) that
    /// ended up as the `k`-th rotated factor.
    pub component_order: Vec<usize>,
    /// Decomposition index of each rotated factor.
    pub original_indices: Vec<usize>,
    pub iterations: usize,
    pub converged: bool,
    pub criterion_history: Vec<f64>,
    pub diagnostics: Vec<Diagnostic>,
}

pub(crate) fn rotate_spectrum(
    spectrum: &EigenSpectrum,
    n_factors: usize,
    method: VarimaxMethod,
    options: &RotationOptions,
    identical_elements: IdenticalElements,
) -> Result<RotatedLoadings> {
    spectrum.check_factors(n_factors)?;
    let extracted = spectrum.loading_factors().slice(s![.., ..n_factors]).to_owned();
    let weights = match method {
        VarimaxMethod::Normal => normal_weights(extracted.view()),
        VarimaxMethod::Raw => Array1::ones(extracted.nrows()),
    };

    let outcome = rotate(extracted.view(), &weights.to_vec(), options)?;
    let mut diagnostics = Vec::new();
    if !outcome.converged {
        let diag = Diagnostic::VarimaxNotConverged {
            iterations: outcome.iterations,
            tolerance: options.tolerance,
            last_change: outcome.last_change,
            identical_elements,
        };
        warn!("{}", diag);
        diagnostics.push(diag);
    }

    let variances: Vec<f64> = outcome
        .loadings
        .columns()
        .into_iter()
        .map(|col| col.iter().map(|&v| v * v).sum())
        .collect();
    let component_order = descending_order(&variances);
    let unscaled_eigenvalues = Array1::from_iter(component_order.iter().map(|&c| variances[c]));
    let unscaled_loadings = outcome.loadings.select(Axis(1), &component_order);

    let unrotated_total: f64 = spectrum.ordered_values().iter().take(n_factors).sum();
    let rotated_total: f64 = variances.iter().sum();
    let scale = if rotated_total == 0.0 {
        warn!("{}", Diagnostic::ZeroRotatedVariance);
        diagnostics.push(Diagnostic::ZeroRotatedVariance);
        1.0
    } else {
        (unrotated_total / rotated_total).abs()
    };

    let eigenvalues = &unscaled_eigenvalues * scale;
    let loadings = &unscaled_loadings * scale.sqrt();
    let total = spectrum.total();
    let proportion_percentage = eigenvalues.mapv(|v| v * 100.0 / total);
    let cumulative_percentage = Array1::from(cumulative(&proportion_percentage.to_vec()));
    let original_indices = component_order
        .iter()
        .map(|&c| spectrum.permutation()[c])
        .collect();

    Ok(RotatedLoadings {
        method,
        loadings,
        unscaled_loadings,
        eigenvalues,
        unscaled_eigenvalues,
        proportion_percentage,
        cumulative_percentage,
        component_order,
        original_indices,
        iterations: outcome.iterations,
        converged: outcome.converged,
        criterion_history: outcome.criterion_history,
        diagnostics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pca::RawEigen;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn simple_structure() -> Array2<f64> {
        array![[0.8, 0.0], [0.7, 0.0], [0.0, 0.9], [0.0, 0.6]]
    }

    fn mixed(angle: f64) -> Array2<f64> {
        let (s, c) = angle.sin_cos();
        simple_structure().dot(&array![[c, -s], [s, c]])
    }

    #[test]
    fn test_criterion_value() {
        let rows = array![[1.0, 0.0], [0.0, 1.0]];
        assert_abs_diff_eq!(varimax_criterion(rows.view()), 2.0);
        assert_abs_diff_eq!(varimax_angle(rows.view(), 0, 1), 0.0);
    }

    #[test]
    fn test_single_rotation_preserves_item_norms() {
        let mut rows = mixed(0.3).reversed_axes();
        let before = normal_weights(rows.t());
        single_rotation(&mut rows, 0, 1, 0.7);
        let after = normal_weights(rows.t());
        for (b, a) in before.iter().zip(after.iter()) {
            assert_abs_diff_eq!(b, a, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_raw_rotation_recovers_simple_structure() {
        let loadings = mixed(std::f64::consts::PI / 6.0);
        let outcome = rotate(loadings.view(), &[1.0; 4], &RotationOptions::default()).unwrap();
        assert!(outcome.converged);

        let target = simple_structure();
        for i in 0..4 {
            let mut got: Vec<f64> = outcome.loadings.row(i).iter().map(|v| v.abs()).collect();
            let mut want: Vec<f64> = target.row(i).to_vec();
            got.sort_by(|a, b| a.partial_cmp(b).unwrap());
            want.sort_by(|a, b| a.partial_cmp(b).unwrap());
            for (g, w) in got.iter().zip(want.iter()) {
                assert_abs_diff_eq!(g, w, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_criterion_never_decreases() {
        let loadings = array![
            [0.7, 0.3, 0.2],
            [0.6, 0.5, -0.1],
            [0.2, 0.8, 0.3],
            [0.4, -0.2, 0.7],
            [0.5, 0.4, 0.4]
        ];
        let weights = normal_weights(loadings.view()).to_vec();
        let outcome = rotate(loadings.view(), &weights, &RotationOptions::default()).unwrap();
        for pair in outcome.criterion_history.windows(2) {
            assert!(pair[1] >= pair[0] - 1e-10, "{} then {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn test_iteration_cap_is_soft() {
        let loadings = mixed(0.4);
        let options = RotationOptions::default().max_iterations(1).tolerance(0.0);
        let outcome = rotate(loadings.view(), &[1.0; 4], &options).unwrap();
        assert!(!outcome.converged);
        assert_eq!(outcome.iterations, 1);
        assert_eq!(outcome.loadings.dim(), (4, 2));
    }

    #[test]
    fn test_zero_weight_with_zero_loading() {
        let loadings = array![[0.0, 0.0], [0.6, 0.3], [0.2, 0.7]];
        let weights = normal_weights(loadings.view()).to_vec();
        assert_eq!(weights[0], 0.0);
        let outcome = rotate(loadings.view(), &weights, &RotationOptions::default()).unwrap();
        assert!(outcome.loadings.iter().all(|v| v.is_finite()));
        assert_eq!(outcome.loadings.row(0).to_vec(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_non_positive_weight_with_nonzero_loading_rejected() {
        let loadings = array![[0.5, 0.2], [0.6, 0.3], [0.2, 0.7]];
        let options = RotationOptions::default();
        let err = rotate(loadings.view(), &[0.0, 1.0, 1.0], &options).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidInput { .. }));
        assert!(rotate(loadings.view(), &[1.0, -0.5, 1.0], &options).is_err());

        let with_empty_item = array![[0.0, 0.0], [0.6, 0.3], [0.2, 0.7]];
        assert!(rotate(with_empty_item.view(), &[0.0, 1.0, 1.0], &options).is_ok());
    }

    #[test]
    fn test_invalid_inputs() {
        let loadings = mixed(0.2);
        assert!(rotate(loadings.view(), &[1.0; 3], &RotationOptions::default()).is_err());
        let bad = RotationOptions::default().max_iterations(0);
        assert!(rotate(loadings.view(), &[1.0; 4], &bad).is_err());
    }

    #[test]
    fn test_original_indices_follow_permutation() {
        // Decomposition order [1.0, 2.5, 0.5]: the leading component sits in slot 1
        let raw = RawEigen {
            values: array![1.0, 2.5, 0.5],
            vectors: array![
                [0.7, 0.6, 0.3872983346207417],
                [-0.7, 0.6, 0.3872983346207417],
                [0.0, 0.5291502622129181, -0.8366600265340756]
            ],
        };
        let spectrum = EigenSpectrum::from_decomposition(raw).unwrap();
        assert_eq!(spectrum.permutation()[0], 1);
        assert_eq!(spectrum.permutation()[1], 0);

        let rotated = rotate_spectrum(
            &spectrum,
            2,
            VarimaxMethod::Raw,
            &RotationOptions::default(),
            IdenticalElements::None,
        )
        .unwrap();
        let expected: Vec<usize> = rotated
            .component_order
            .iter()
            .map(|&c| spectrum.permutation()[c])
            .collect();
        assert_eq!(rotated.original_indices, expected);
        let mut indices = rotated.original_indices.clone();
        indices.sort();
        assert_eq!(indices, vec![0, 1]);
    }

    #[test]
    fn test_rotate_spectrum_conserves_extracted_variance() {
        let raw = RawEigen {
            values: array![2.5, 1.0, 0.5],
            vectors: array![
                [0.6, 0.7, 0.3872983346207417],
                [0.6, -0.7, 0.3872983346207417],
                [0.5291502622129181, 0.0, -0.8366600265340756]
            ],
        };
        let spectrum = EigenSpectrum::from_decomposition(raw).unwrap();
        let rotated = rotate_spectrum(
            &spectrum,
            2,
            VarimaxMethod::Normal,
            &RotationOptions::default(),
            IdenticalElements::None,
        )
        .unwrap();
        assert_abs_diff_eq!(rotated.eigenvalues.sum(), 3.5, epsilon = 1e-9);
        assert!(rotated.eigenvalues[0] >= rotated.eigenvalues[1]);
        assert_abs_diff_eq!(
            rotated.cumulative_percentage[1],
            100.0 * 3.5 / 4.0,
            epsilon = 1e-9
        );
        let mut order = rotated.component_order.clone();
        order.sort();
        assert_eq!(order, vec![0, 1]);

        assert!(rotate_spectrum(
            &spectrum,
            4,
            VarimaxMethod::Raw,
            &RotationOptions::default(),
            IdenticalElements::None
        )
        .is_err());
    }
}
