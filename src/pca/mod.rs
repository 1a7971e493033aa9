use log::debug;
use nalgebra::SymmetricEigen;
use ndarray::{Array1, Array2, ArrayView2};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::dense::{from_nalgebra, to_nalgebra};
use crate::error::{AnalysisError, Result};
use crate::scores::{IdenticalElements, ScoreMatrix};
use crate::statistics::{bartlett, kmo, BartlettTest, Kmo, MatrixStats};
use crate::utils::VarianceDenominator;

mod ordering;
pub mod parallel;
pub mod varimax;

pub use ordering::EigenSpectrum;
pub use parallel::{
    DeviateDistribution, MonteCarloEnvelope, MonteCarloOptions, ParallelAnalysis, SimulationInput,
};
pub use varimax::{rotate, RotatedLoadings, RotationOptions, VarimaxMethod, VarimaxOutcome};

/// Eigen-decomposition of a real symmetric matrix, in whatever order the solver produced it.
///
/// `vectors` holds one eigenvector per column.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEigen {
    pub values: Array1<f64>,
    pub vectors: Array2<f64>,
}

// Trait for symmetric eigen solvers
pub trait EigenSolver: Send + Sync {
    fn decompose(&self, matrix: ArrayView2<f64>) -> Result<RawEigen>;
}

/// Symmetric eigen-decomposition through nalgebra.
#[derive(Debug, Clone, Copy, Default)]
pub struct NalgebraEigen;

impl EigenSolver for NalgebraEigen {
    fn decompose(&self, matrix: ArrayView2<f64>) -> Result<RawEigen> {
        let (rows, cols) = matrix.dim();
        if rows != cols || rows == 0 {
            return Err(AnalysisError::invalid(format!(
                "eigen-decomposition needs a non-empty square matrix, got {}x{}",
                rows, cols
            )));
        }
        if matrix.iter().any(|v| !v.is_finite()) {
            return Err(AnalysisError::invalid(
                "eigen-decomposition input contains non-finite values",
            ));
        }
        let eigen = SymmetricEigen::new(to_nalgebra(matrix));
        Ok(RawEigen {
            values: Array1::from_iter(eigen.eigenvalues.iter().copied()),
            vectors: from_nalgebra(&eigen.eigenvectors),
        })
    }
}

/// Matrix whose spectrum is analysed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EigenSource {
    Covariance,
    #[default]
    Correlation,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PcaOptions {
    pub source: EigenSource,
    pub varimax_method: VarimaxMethod,
    pub rotation: RotationOptions,
    pub monte_carlo: MonteCarloOptions,
}

pub struct PcaBuilder<S: EigenSolver> {
    options: PcaOptions,
    solver: Arc<S>,
}

impl Default for PcaBuilder<NalgebraEigen> {
    fn default() -> Self {
        PcaBuilder::new(NalgebraEigen)
    }
}

impl<S: EigenSolver> PcaBuilder<S> {
    pub fn new(solver: S) -> Self {
        PcaBuilder {
            options: PcaOptions::default(),
            solver: Arc::new(solver),
        }
    }

    pub fn options(mut self, options: PcaOptions) -> Self {
        self.options = options;
        self
    }

    pub fn source(mut self, source: EigenSource) -> Self {
        self.options.source = source;
        self
    }

    pub fn varimax_method(mut self, method: VarimaxMethod) -> Self {
        self.options.varimax_method = method;
        self
    }

    pub fn rotation(mut self, rotation: RotationOptions) -> Self {
        self.options.rotation = rotation;
        self
    }

    pub fn monte_carlo(mut self, monte_carlo: MonteCarloOptions) -> Self {
        self.options.monte_carlo = monte_carlo;
        self
    }

    pub fn build(self) -> Pca<S> {
        Pca {
            options: self.options,
            solver: self.solver,
        }
    }
}

/// Principal component analysis of an item × person score matrix.
///
/// A `Pca` only carries configuration; every call returns a fresh result value.
pub struct Pca<S: EigenSolver> {
    options: PcaOptions,
    solver: Arc<S>,
}

impl<S: EigenSolver> Pca<S> {
    pub fn options(&self) -> &PcaOptions {
        &self.options
    }

    pub fn fit(&self, scores: &ScoreMatrix) -> Result<PcaResult> {
        let (n_items, n_persons) = (scores.n_items(), scores.n_persons());
        if n_items < 2 || n_persons < 2 {
            return Err(AnalysisError::InsufficientData {
                operation: "principal component analysis",
                what: if n_items < 2 { "items" } else { "persons" },
                required: 2,
                actual: n_items.min(n_persons),
            });
        }

        let stats = MatrixStats::compute(scores)?;
        let kmo = kmo(stats.correlation.view(), stats.partial_correlation.view())?;
        let bartlett = bartlett(stats.correlation.view(), n_persons);
        if let Err(e) = &bartlett {
            debug!("Bartlett test unavailable: {}", e);
        }

        let matrix = match self.options.source {
            EigenSource::Covariance => stats.covariance.view(),
            EigenSource::Correlation => stats.correlation.view(),
        };
        let spectrum = EigenSpectrum::from_decomposition(self.solver.decompose(matrix)?)?;
        let loading_factors = spectrum.loading_factors();
        let communalities = spectrum.communalities(n_items)?;
        let communality_weights = spectrum.communality_weights(n_items)?;

        debug!(
            "PCA on {} items x {} persons ({:?}): KMO {:.4}, leading eigenvalue {:.4}",
            n_items,
            n_persons,
            self.options.source,
            kmo.overall,
            spectrum.ordered_values()[0]
        );

        Ok(PcaResult {
            source: self.options.source,
            n_items,
            n_persons,
            denominator: scores.denominator(),
            greater_than_one_limit: spectrum.greater_than_one_limit(),
            identical_elements: scores.identical_elements(),
            item_means: scores.item_means(),
            item_standard_deviations: scores.item_standard_deviations(),
            stats,
            kmo,
            bartlett,
            spectrum,
            loading_factors,
            communalities,
            communality_weights,
        })
    }

    /// Monte Carlo envelope for the spectrum of a previous [`fit`](Self::fit).
    ///
    /// Synthetic items reuse the item moments, person count and variance denominator recorded
    /// in `result`.
    pub fn parallel_analysis(&self, result: &PcaResult) -> Result<ParallelAnalysis> {
        let means = result.item_means.to_vec();
        let sds = result.item_standard_deviations.to_vec();
        let input = SimulationInput {
            item_means: &means,
            item_standard_deviations: &sds,
            n_persons: result.n_persons,
            source: self.options.source,
            denominator: result.denominator,
        };
        let envelope = parallel::simulate(self.solver.as_ref(), &input, &self.options.monte_carlo)?;
        let analysis = ParallelAnalysis::compare(&result.spectrum, envelope);
        debug!(
            "parallel analysis: mean crossover {}, {}th percentile crossover {}",
            analysis.mean_crossover, self.options.monte_carlo.percentile, analysis.percentile_crossover
        );
        Ok(analysis)
    }

    /// Varimax rotation of the first `n_factors` components with the configured method.
    pub fn varimax(&self, result: &PcaResult, n_factors: usize) -> Result<RotatedLoadings> {
        self.varimax_with(result, n_factors, self.options.varimax_method)
    }

    pub fn varimax_with(
        &self,
        result: &PcaResult,
        n_factors: usize,
        method: VarimaxMethod,
    ) -> Result<RotatedLoadings> {
        varimax::rotate_spectrum(
            &result.spectrum,
            n_factors,
            method,
            &self.options.rotation,
            result.identical_elements,
        )
    }
}

/// Snapshot of one PCA run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PcaResult {
    source: EigenSource,
    n_items: usize,
    n_persons: usize,
    denominator: VarianceDenominator,
    stats: MatrixStats,
    kmo: Kmo,
    #[serde(skip)]
    bartlett: Result<BartlettTest>,
    spectrum: EigenSpectrum,
    loading_factors: Array2<f64>,
    communalities: Array1<f64>,
    communality_weights: Array1<f64>,
    greater_than_one_limit: usize,
    identical_elements: IdenticalElements,
    item_means: Array1<f64>,
    item_standard_deviations: Array1<f64>,
}

impl PcaResult {
    pub fn source(&self) -> EigenSource {
        self.source
    }

    pub fn n_items(&self) -> usize {
        self.n_items
    }

    pub fn n_persons(&self) -> usize {
        self.n_persons
    }

    /// Variance denominator of the score matrix the result was fitted on.
    pub fn denominator(&self) -> VarianceDenominator {
        self.denominator
    }

    pub fn stats(&self) -> &MatrixStats {
        &self.stats
    }

    pub fn covariance(&self) -> &Array2<f64> {
        &self.stats.covariance
    }

    pub fn correlation(&self) -> &Array2<f64> {
        &self.stats.correlation
    }

    pub fn partial_correlation(&self) -> &Array2<f64> {
        &self.stats.partial_correlation
    }

    pub fn kmo(&self) -> &Kmo {
        &self.kmo
    }

    /// Bartlett's sphericity test, or the reason it could not be computed.
    pub fn bartlett(&self) -> Result<&BartlettTest> {
        self.bartlett.as_ref().map_err(Clone::clone)
    }

    pub fn spectrum(&self) -> &EigenSpectrum {
        &self.spectrum
    }

    pub fn eigenvalues(&self) -> &Array1<f64> {
        self.spectrum.ordered_values()
    }

    pub fn proportion_percentage(&self) -> Array1<f64> {
        self.spectrum.proportion_percentage()
    }

    pub fn cumulative_percentage(&self) -> Array1<f64> {
        self.spectrum.cumulative_percentage()
    }

    /// Item × component loadings on the ordered spectrum.
    pub fn loading_factors(&self) -> &Array2<f64> {
        &self.loading_factors
    }

    /// Communalities over all components.
    pub fn communalities(&self) -> &Array1<f64> {
        &self.communalities
    }

    pub fn communality_weights(&self) -> &Array1<f64> {
        &self.communality_weights
    }

    /// Communalities over the first `n_factors` components.
    pub fn extracted_communalities(&self, n_factors: usize) -> Result<Array1<f64>> {
        self.spectrum.communalities(n_factors)
    }

    pub fn greater_than_one_limit(&self) -> usize {
        self.greater_than_one_limit
    }

    pub fn identical_elements(&self) -> IdenticalElements {
        self.identical_elements
    }

    pub fn item_means(&self) -> &Array1<f64> {
        &self.item_means
    }

    pub fn item_standard_deviations(&self) -> &Array1<f64> {
        &self.item_standard_deviations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn scores() -> ScoreMatrix {
        ScoreMatrix::from_item_rows(&[
            vec![4.0, 3.0, 5.0, 2.0, 4.0, 3.0, 5.0, 1.0],
            vec![4.0, 2.0, 5.0, 2.0, 3.0, 3.0, 4.0, 2.0],
            vec![3.0, 3.0, 4.0, 1.0, 4.0, 2.0, 5.0, 1.0],
            vec![2.0, 4.0, 1.0, 3.0, 2.0, 5.0, 1.0, 4.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_nalgebra_eigen_reconstructs_matrix() {
        let m = array![[2.0, 1.0], [1.0, 2.0]];
        let raw = NalgebraEigen.decompose(m.view()).unwrap();
        let diag = Array2::from_diag(&raw.values);
        let rebuilt = raw.vectors.dot(&diag).dot(&raw.vectors.t());
        for (a, b) in rebuilt.iter().zip(m.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-12);
        }
        assert!(NalgebraEigen.decompose(array![[1.0, 2.0]].view()).is_err());
    }

    #[test]
    fn test_fit_correlation_spectrum() {
        let pca = PcaBuilder::default().build();
        let result = pca.fit(&scores()).unwrap();

        assert_eq!(result.n_items(), 4);
        assert_abs_diff_eq!(result.eigenvalues().sum(), 4.0, epsilon = 1e-10);
        assert!(result.eigenvalues()[0] > 2.0);
        assert_abs_diff_eq!(result.cumulative_percentage()[3], 100.0, epsilon = 1e-10);
        assert!(result.greater_than_one_limit() >= 1);
        // Communalities over every component of a correlation matrix are one
        for &c in result.communalities().iter() {
            assert_abs_diff_eq!(c, 1.0, epsilon = 1e-10);
        }
        assert!(result.bartlett().is_ok());
    }

    #[test]
    fn test_fit_covariance_spectrum_sums_to_total_variance() {
        let s = scores();
        let pca = PcaBuilder::default().source(EigenSource::Covariance).build();
        let result = pca.fit(&s).unwrap();
        assert_abs_diff_eq!(
            result.eigenvalues().sum(),
            s.item_variances().sum(),
            epsilon = 1e-10
        );
    }

    #[test]
    fn test_fit_rejects_single_item() {
        let s = ScoreMatrix::from_item_rows(&[vec![1.0, 2.0, 3.0]]).unwrap();
        let err = PcaBuilder::default().build().fit(&s).unwrap_err();
        assert!(matches!(err, AnalysisError::InsufficientData { .. }));
    }

    #[test]
    fn test_varimax_factor_count_checked() {
        let pca = PcaBuilder::default().build();
        let result = pca.fit(&scores()).unwrap();
        assert!(pca.varimax(&result, 0).is_err());
        assert!(pca.varimax(&result, 5).is_err());

        let rotated = pca.varimax(&result, 2).unwrap();
        let unrotated: f64 = result.eigenvalues().iter().take(2).sum();
        assert_abs_diff_eq!(rotated.eigenvalues.sum(), unrotated, epsilon = 1e-8);
    }

    #[test]
    fn test_parallel_analysis_through_session() {
        let s = scores();
        let pca = PcaBuilder::default()
            .monte_carlo(MonteCarloOptions::default().trials(20).seed(3))
            .build();
        let result = pca.fit(&s).unwrap();
        let analysis = pca.parallel_analysis(&result).unwrap();
        assert_eq!(analysis.envelope.n_trials(), 20);
        assert!(analysis.percentile_crossover <= analysis.mean_crossover);
    }

    #[test]
    fn test_parallel_analysis_uses_fitted_denominator() {
        let s = scores().with_denominator(VarianceDenominator::Population);
        let options = MonteCarloOptions::default().trials(10).seed(9);
        let pca = PcaBuilder::default().monte_carlo(options).build();
        let result = pca.fit(&s).unwrap();
        assert_eq!(result.denominator(), VarianceDenominator::Population);

        let means = s.item_means().to_vec();
        let sds = s.item_standard_deviations().to_vec();
        let input = SimulationInput {
            item_means: &means,
            item_standard_deviations: &sds,
            n_persons: s.n_persons(),
            source: EigenSource::Correlation,
            denominator: VarianceDenominator::Population,
        };
        let expected = parallel::simulate(&NalgebraEigen, &input, &options).unwrap();
        let analysis = pca.parallel_analysis(&result).unwrap();
        assert_eq!(analysis.envelope, expected);
    }
}
