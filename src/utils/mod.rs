use serde::{Deserialize, Serialize};

/// Axis selector for matrix operations.
///
/// `ROW` addresses each row in turn, `COLUMN` each column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::upper_case_acronyms)]
pub enum Direction {
    ROW,
    COLUMN,
}

impl Direction {
    pub fn is_row(&self) -> bool {
        matches!(self, Direction::ROW)
    }
}

/// Denominator convention for variances, covariances and standard deviations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VarianceDenominator {
    /// Divide by `n - 1`.
    #[default]
    Sample,
    /// Divide by `n`.
    Population,
}

impl VarianceDenominator {
    pub fn divisor(&self, n: usize) -> f64 {
        match self {
            VarianceDenominator::Sample => n as f64 - 1.0,
            VarianceDenominator::Population => n as f64,
        }
    }
}

/// Indices that sort `values` into descending order.
///
/// The sort is stable, so equal values keep their original relative order.
pub(crate) fn descending_order(values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        values[b]
            .partial_cmp(&values[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order
}

/// Running sum of `values`.
pub(crate) fn cumulative(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .scan(0.0, |acc, &v| {
            *acc += v;
            Some(*acc)
        })
        .collect()
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn variance(values: &[f64], denominator: VarianceDenominator) -> f64 {
    let m = mean(values);
    let ss: f64 = values.iter().map(|&v| (v - m) * (v - m)).sum();
    ss / denominator.divisor(values.len())
}

/// Pearson correlation of two equally long slices; zero when either has no spread.
pub(crate) fn pearson(a: &[f64], b: &[f64]) -> f64 {
    let ma = mean(a);
    let mb = mean(b);
    let mut sab = 0.0;
    let mut saa = 0.0;
    let mut sbb = 0.0;
    for (&x, &y) in a.iter().zip(b) {
        sab += (x - ma) * (y - mb);
        saa += (x - ma) * (x - ma);
        sbb += (y - mb) * (y - mb);
    }
    let r = sab / (saa * sbb).sqrt();
    if r.is_nan() {
        0.0
    } else {
        r
    }
}
