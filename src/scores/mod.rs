//! # Score matrices
//!
//! [`ScoreMatrix`] is the preprocessed, read-only input shared by every analysis: a rectangular
//! item × person matrix of finite values plus item names and the variance denominator
//! convention. Raw response parsing, cleaning and missing-response substitution happen upstream;
//! their effect is recorded only informationally in [`PreprocessingSummary`].

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};
use crate::utils::{Direction, VarianceDenominator};

/// Counts reported by the upstream preprocessing step. Informational only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessingSummary {
    pub deleted_items: usize,
    pub deleted_persons: usize,
    pub substituted_responses: usize,
}

/// Whether any item row or person column holds a single repeated value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdenticalElements {
    None,
    Rows,
    Columns,
    RowsAndColumns,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreMatrix {
    data: Array2<f64>,
    item_names: Vec<String>,
    denominator: VarianceDenominator,
    preprocessing: PreprocessingSummary,
}

impl ScoreMatrix {
    /// Builds a score matrix from rows of item responses (one row per item).
    pub fn from_item_rows<T, R>(rows: &[R]) -> Result<Self>
    where
        T: ToPrimitive + Copy,
        R: AsRef<[T]>,
    {
        let data = rows_to_array(rows)?;
        Self::from_array(data, Direction::ROW)
    }

    /// Builds a score matrix from rows of person responses (one row per person).
    pub fn from_person_rows<T, R>(rows: &[R]) -> Result<Self>
    where
        T: ToPrimitive + Copy,
        R: AsRef<[T]>,
    {
        let data = rows_to_array(rows)?;
        Self::from_array(data, Direction::COLUMN)
    }

    /// Takes ownership of a dense matrix. `items` names the axis that holds the items:
    /// `Direction::ROW` for an item × person layout, `Direction::COLUMN` for person × item.
    pub fn from_array(data: Array2<f64>, items: Direction) -> Result<Self> {
        let data = match items {
            Direction::ROW => data,
            Direction::COLUMN => data.reversed_axes().as_standard_layout().to_owned(),
        };
        let (n_items, n_persons) = data.dim();
        if n_items == 0 || n_persons == 0 {
            return Err(AnalysisError::InsufficientData {
                operation: "score matrix",
                what: "entries",
                required: 1,
                actual: 0,
            });
        }
        if let Some(((i, j), v)) = data.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(AnalysisError::invalid(format!(
                "score for item {} and person {} is not finite ({})",
                i, j, v
            )));
        }
        let item_names = (1..=n_items).map(|i| format!("item{}", i)).collect();
        Ok(ScoreMatrix {
            data,
            item_names,
            denominator: VarianceDenominator::default(),
            preprocessing: PreprocessingSummary::default(),
        })
    }

    pub fn with_item_names<S: Into<String>>(mut self, names: Vec<S>) -> Result<Self> {
        if names.len() != self.n_items() {
            return Err(AnalysisError::invalid(format!(
                "{} item names supplied for {} items",
                names.len(),
                self.n_items()
            )));
        }
        self.item_names = names.into_iter().map(Into::into).collect();
        Ok(self)
    }

    pub fn with_denominator(mut self, denominator: VarianceDenominator) -> Self {
        self.denominator = denominator;
        self
    }

    pub fn with_preprocessing(mut self, summary: PreprocessingSummary) -> Self {
        self.preprocessing = summary;
        self
    }

    pub fn n_items(&self) -> usize {
        self.data.nrows()
    }

    pub fn n_persons(&self) -> usize {
        self.data.ncols()
    }

    /// Item × person view of the scores.
    pub fn data(&self) -> ArrayView2<'_, f64> {
        self.data.view()
    }

    pub fn item(&self, index: usize) -> ArrayView1<'_, f64> {
        self.data.row(index)
    }

    pub fn item_names(&self) -> &[String] {
        &self.item_names
    }

    pub fn denominator(&self) -> VarianceDenominator {
        self.denominator
    }

    pub fn preprocessing(&self) -> PreprocessingSummary {
        self.preprocessing
    }

    pub fn item_means(&self) -> Array1<f64> {
        self.data.sum_axis(Axis(1)) / self.n_persons() as f64
    }

    pub fn item_variances(&self) -> Array1<f64> {
        let means = self.item_means();
        let divisor = self.denominator.divisor(self.n_persons());
        Array1::from_iter(self.data.rows().into_iter().zip(means.iter()).map(
            |(row, &m)| row.iter().map(|&v| (v - m) * (v - m)).sum::<f64>() / divisor,
        ))
    }

    pub fn item_standard_deviations(&self) -> Array1<f64> {
        self.item_variances().mapv(f64::sqrt)
    }

    pub fn item_totals(&self) -> Array1<f64> {
        self.data.sum_axis(Axis(1))
    }

    pub fn person_totals(&self) -> Array1<f64> {
        self.data.sum_axis(Axis(0))
    }

    pub fn grand_total(&self) -> f64 {
        self.data.sum()
    }

    /// Copy of the matrix with item `index` removed.
    pub fn without_item(&self, index: usize) -> Result<ScoreMatrix> {
        if index >= self.n_items() {
            return Err(AnalysisError::configuration(
                "item index",
                index,
                format!("only {} items available", self.n_items()),
            ));
        }
        let keep: Vec<usize> = (0..self.n_items()).filter(|&i| i != index).collect();
        let mut names = self.item_names.clone();
        names.remove(index);
        Ok(ScoreMatrix {
            data: self.data.select(Axis(0), &keep),
            item_names: names,
            denominator: self.denominator,
            preprocessing: self.preprocessing,
        })
    }

    pub fn identical_elements(&self) -> IdenticalElements {
        let constant = |lane: ArrayView1<f64>| lane.iter().all(|&v| v == lane[0]);
        let rows = self.data.rows().into_iter().any(constant);
        let cols = self.data.columns().into_iter().any(constant);
        match (rows, cols) {
            (false, false) => IdenticalElements::None,
            (true, false) => IdenticalElements::Rows,
            (false, true) => IdenticalElements::Columns,
            (true, true) => IdenticalElements::RowsAndColumns,
        }
    }
}

fn rows_to_array<T, R>(rows: &[R]) -> Result<Array2<f64>>
where
    T: ToPrimitive + Copy,
    R: AsRef<[T]>,
{
    let n_rows = rows.len();
    let n_cols = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
    let mut flat = Vec::with_capacity(n_rows * n_cols);
    for (i, row) in rows.iter().enumerate() {
        let row = row.as_ref();
        if row.len() != n_cols {
            return Err(AnalysisError::RaggedMatrix {
                row: i,
                expected: n_cols,
                actual: row.len(),
            });
        }
        for (j, v) in row.iter().enumerate() {
            let v = v.to_f64().ok_or_else(|| {
                AnalysisError::invalid(format!("entry ({}, {}) is not representable as f64", i, j))
            })?;
            flat.push(v);
        }
    }
    Array2::from_shape_vec((n_rows, n_cols), flat)
        .map_err(|e| AnalysisError::invalid(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_item_and_person_orientation_agree() {
        let by_item = ScoreMatrix::from_item_rows(&[vec![1, 2, 3], vec![4, 5, 6]]).unwrap();
        let by_person =
            ScoreMatrix::from_person_rows(&[vec![1.0, 4.0], vec![2.0, 5.0], vec![3.0, 6.0]])
                .unwrap();
        assert_eq!(by_item.data(), by_person.data());
        assert_eq!(by_item.n_items(), 2);
        assert_eq!(by_item.n_persons(), 3);
        assert_eq!(by_item.item_names(), &["item1", "item2"]);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let err = ScoreMatrix::from_item_rows(&[vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert_eq!(
            err,
            AnalysisError::RaggedMatrix {
                row: 1,
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn test_non_finite_rejected() {
        let data = array![[1.0, f64::NAN], [2.0, 3.0]];
        assert!(ScoreMatrix::from_array(data, Direction::ROW).is_err());
        let empty: Vec<Vec<f64>> = vec![];
        assert!(ScoreMatrix::from_item_rows(&empty).is_err());
    }

    #[test]
    fn test_descriptive_statistics() {
        let scores = ScoreMatrix::from_item_rows(&[vec![1.0, 2.0, 3.0, 4.0], vec![2.0; 4]])
            .unwrap()
            .with_denominator(VarianceDenominator::Population);
        assert_relative_eq!(scores.item_means()[0], 2.5);
        assert_relative_eq!(scores.item_variances()[0], 1.25);
        assert_relative_eq!(scores.item_standard_deviations()[1], 0.0);
        assert_eq!(scores.person_totals(), array![3.0, 4.0, 5.0, 6.0]);
        assert_relative_eq!(scores.grand_total(), 18.0);
        // Item 1 is constant, and so is person 1 (both items score 2)
        assert_eq!(scores.identical_elements(), IdenticalElements::RowsAndColumns);
    }

    #[test]
    fn test_identical_elements() {
        let check = |rows: &[Vec<f64>]| ScoreMatrix::from_item_rows(rows).unwrap().identical_elements();
        assert_eq!(
            check(&[vec![1.0, 2.0, 3.0], vec![3.0, 5.0, 4.0]]),
            IdenticalElements::None
        );
        assert_eq!(
            check(&[vec![1.0, 2.0, 3.0], vec![4.0, 4.0, 4.0]]),
            IdenticalElements::Rows
        );
        assert_eq!(
            check(&[vec![1.0, 2.0, 3.0], vec![1.0, 5.0, 4.0]]),
            IdenticalElements::Columns
        );
        assert_eq!(
            check(&[vec![1.0, 2.0, 3.0], vec![4.0, 2.0, 4.0], vec![7.0, 2.0, 7.0]]),
            IdenticalElements::Columns
        );
    }

    #[test]
    fn test_without_item() {
        let scores = ScoreMatrix::from_item_rows(&[vec![1, 2], vec![3, 4], vec![5, 6]])
            .unwrap()
            .with_item_names(vec!["a", "b", "c"])
            .unwrap();
        let reduced = scores.without_item(1).unwrap();
        assert_eq!(reduced.data(), array![[1.0, 2.0], [5.0, 6.0]]);
        assert_eq!(reduced.item_names(), &["a", "c"]);
        assert!(scores.without_item(3).is_err());
    }
}
