//! # Parallel analysis
//!
//! Monte Carlo calibration of how many principal components carry signal. Synthetic data with
//! the observed per-item means and standard deviations are generated repeatedly, each data set
//! goes through the same eigen extraction as the real data, and the observed eigenvalues are
//! compared with the mean and a percentile of the simulated ones.
//!
//! Every trial draws from its own ChaCha stream (`seed`, stream = trial index), so the envelope
//! is reproducible and identical whether trials run sequentially or on the rayon pool.

use log::debug;
use ndarray::{Array1, Array2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::ordering::EigenSpectrum;
use super::{EigenSolver, EigenSource};
use crate::error::{AnalysisError, Result};
use crate::statistics::{correlation, covariance};
use crate::utils::{mean, variance, VarianceDenominator};

/// Distribution of the synthetic deviates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DeviateDistribution {
    /// Uniform deviates standardised and rescaled to the item mean and standard deviation.
    #[default]
    Uniform,
    /// Gaussian deviates with the item mean and standard deviation.
    Gaussian,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloOptions {
    pub trials: usize,
    /// Percentile of the simulated eigenvalues used as extraction threshold, in `(0, 100]`.
    pub percentile: f64,
    pub deviates: DeviateDistribution,
    pub seed: u64,
    /// Run trials on the rayon thread pool.
    pub parallel: bool,
}

impl Default for MonteCarloOptions {
    fn default() -> Self {
        MonteCarloOptions {
            trials: 200,
            percentile: 95.0,
            deviates: DeviateDistribution::default(),
            seed: 42,
            parallel: true,
        }
    }
}

impl MonteCarloOptions {
    pub fn trials(mut self, trials: usize) -> Self {
        self.trials = trials;
        self
    }

    pub fn percentile(mut self, percentile: f64) -> Self {
        self.percentile = percentile;
        self
    }

    pub fn deviates(mut self, deviates: DeviateDistribution) -> Self {
        self.deviates = deviates;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.trials == 0 {
            return Err(AnalysisError::configuration(
                "Monte Carlo trials",
                self.trials,
                "at least one trial is required",
            ));
        }
        if !(self.percentile > 0.0 && self.percentile <= 100.0) {
            return Err(AnalysisError::configuration(
                "parallel analysis percentile",
                self.percentile,
                "must lie in (0, 100]",
            ));
        }
        Ok(())
    }
}

/// Distribution of simulated eigenvalues per component rank.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonteCarloEnvelope {
    /// Trial × component matrix of descending eigenvalues.
    pub eigenvalues: Array2<f64>,
    pub means: Array1<f64>,
    pub standard_deviations: Array1<f64>,
    pub percentiles: Array1<f64>,
    pub percentile: f64,
}

impl MonteCarloEnvelope {
    pub fn n_trials(&self) -> usize {
        self.eigenvalues.nrows()
    }

    fn from_trials(eigenvalues: Array2<f64>, percentile: f64) -> Self {
        let n_trials = eigenvalues.nrows();
        let means = eigenvalues.mean_axis(Axis(0)).unwrap_or_default();
        let standard_deviations = if n_trials > 1 {
            eigenvalues.std_axis(Axis(0), 1.0)
        } else {
            Array1::zeros(eigenvalues.ncols())
        };
        let percentiles = eigenvalues.map_axis(Axis(0), |column| {
            let mut sorted = column.to_vec();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
            interpolated_percentile(&sorted, percentile)
        });
        MonteCarloEnvelope {
            eigenvalues,
            means,
            standard_deviations,
            percentiles,
            percentile,
        }
    }
}

/// Observed spectrum compared with a Monte Carlo envelope.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParallelAnalysis {
    pub envelope: MonteCarloEnvelope,
    /// Number of leading components whose eigenvalue exceeds the simulated mean.
    pub mean_crossover: usize,
    /// Number of leading components whose eigenvalue exceeds the simulated percentile.
    pub percentile_crossover: usize,
}

impl ParallelAnalysis {
    pub fn compare(observed: &EigenSpectrum, envelope: MonteCarloEnvelope) -> Self {
        let observed = observed.ordered_values().to_vec();
        let mean_crossover = crossover(&observed, &envelope.means.to_vec());
        let percentile_crossover = crossover(&observed, &envelope.percentiles.to_vec());
        ParallelAnalysis {
            envelope,
            mean_crossover,
            percentile_crossover,
        }
    }
}

/// First rank at which `observed` no longer exceeds `reference`, or the full length.
pub fn crossover(observed: &[f64], reference: &[f64]) -> usize {
    observed
        .iter()
        .zip(reference)
        .position(|(o, r)| o <= r)
        .unwrap_or(observed.len())
}

/// Linear interpolation at the 1-based rank `M * p / 100` of an ascending sample of size `M`.
///
/// The upper order statistic is the one at `ceil(rank)`, the lower one sits just below it and
/// the weight is the distance of `rank` above the lower position. Indices are clamped into the
/// sample, so tiny samples and extreme percentiles stay well defined.
pub fn interpolated_percentile(sorted: &[f64], percentile: f64) -> f64 {
    let m = sorted.len();
    if m == 0 {
        return f64::NAN;
    }
    let rank = m as f64 * percentile / 100.0;
    let upper_rank = rank.ceil();
    let weight = rank - (upper_rank - 1.0);
    let last = m as i64 - 1;
    let upper = (upper_rank as i64 - 1).clamp(0, last) as usize;
    let lower = (upper_rank as i64 - 2).clamp(0, last) as usize;
    sorted[lower] + weight * (sorted[upper] - sorted[lower])
}

/// Everything a trial needs besides its index.
pub struct SimulationInput<'a> {
    pub item_means: &'a [f64],
    pub item_standard_deviations: &'a [f64],
    pub n_persons: usize,
    pub source: EigenSource,
    pub denominator: VarianceDenominator,
}

/// Runs the Monte Carlo trials and aggregates their spectra.
pub fn simulate<S: EigenSolver>(
    solver: &S,
    input: &SimulationInput<'_>,
    options: &MonteCarloOptions,
) -> Result<MonteCarloEnvelope> {
    options.validate()?;
    let n_items = input.item_means.len();
    if input.item_standard_deviations.len() != n_items {
        return Err(AnalysisError::invalid(format!(
            "{} item means but {} standard deviations",
            n_items,
            input.item_standard_deviations.len()
        )));
    }
    if n_items < 2 || input.n_persons < 2 {
        return Err(AnalysisError::InsufficientData {
            operation: "parallel analysis",
            what: if n_items < 2 { "items" } else { "persons" },
            required: 2,
            actual: n_items.min(input.n_persons),
        });
    }

    debug!(
        "parallel analysis: {} trials of {} items x {} persons ({:?} deviates)",
        options.trials, n_items, input.n_persons, options.deviates
    );

    let run = |t: usize| run_trial(solver, input, options, t);
    let spectra: Vec<Array1<f64>> = if options.parallel {
        (0..options.trials)
            .into_par_iter()
            .map(run)
            .collect::<Result<Vec<_>>>()?
    } else {
        (0..options.trials).map(run).collect::<Result<Vec<_>>>()?
    };

    let mut eigenvalues = Array2::zeros((options.trials, n_items));
    for (mut row, spectrum) in eigenvalues.rows_mut().into_iter().zip(spectra) {
        row.assign(&spectrum);
    }
    Ok(MonteCarloEnvelope::from_trials(eigenvalues, options.percentile))
}

fn run_trial<S: EigenSolver>(
    solver: &S,
    input: &SimulationInput<'_>,
    options: &MonteCarloOptions,
    trial: usize,
) -> Result<Array1<f64>> {
    let mut rng = ChaCha8Rng::seed_from_u64(options.seed);
    rng.set_stream(trial as u64);

    let n_items = input.item_means.len();
    let mut data = Array2::zeros((n_items, input.n_persons));
    for (i, mut row) in data.rows_mut().into_iter().enumerate() {
        let values = synthetic_item(
            &mut rng,
            input.item_means[i],
            input.item_standard_deviations[i],
            input.n_persons,
            options.deviates,
            input.denominator,
        )?;
        row.assign(&Array1::from(values));
    }

    let cov = covariance(data.view(), input.denominator)?;
    let matrix = match input.source {
        EigenSource::Covariance => cov,
        EigenSource::Correlation => correlation(cov.view()),
    };
    let spectrum = EigenSpectrum::from_decomposition(solver.decompose(matrix.view())?)?;
    Ok(spectrum.ordered_values().clone())
}

/// `n` synthetic scores with the given mean and standard deviation.
///
/// A zero standard deviation yields the constant sequence `mean`.
pub fn synthetic_item<R: Rng>(
    rng: &mut R,
    item_mean: f64,
    item_sd: f64,
    n: usize,
    deviates: DeviateDistribution,
    denominator: VarianceDenominator,
) -> Result<Vec<f64>> {
    if item_sd == 0.0 {
        return Ok(vec![item_mean; n]);
    }
    match deviates {
        DeviateDistribution::Gaussian => {
            let normal = Normal::new(item_mean, item_sd)
                .map_err(|e| AnalysisError::Distribution(e.to_string()))?;
            Ok((0..n).map(|_| normal.sample(rng)).collect())
        }
        DeviateDistribution::Uniform => {
            let raw: Vec<f64> = (0..n).map(|_| rng.random::<f64>()).collect();
            let m = mean(&raw);
            let sd = variance(&raw, denominator).sqrt();
            if sd == 0.0 || !sd.is_finite() {
                return Ok(vec![item_mean; n]);
            }
            Ok(raw
                .into_iter()
                .map(|v| (v - m) / sd * item_sd + item_mean)
                .collect())
        }
    }
}
