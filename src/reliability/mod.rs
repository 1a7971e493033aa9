//! Cronbach's alpha reliability coefficients and the item-deletion table.

use log::debug;
use ndarray::{Array1, Axis};
use serde::Serialize;

use crate::error::{AnalysisError, Result};
use crate::scores::ScoreMatrix;
use crate::statistics::{correlation, covariance};
use crate::utils::{mean, pearson, variance};

/// Alpha coefficients of a full item set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Cronbach {
    pub raw_alpha: f64,
    pub standardized_alpha: f64,
    /// Mean of the off-diagonal inter-item correlations.
    pub mean_inter_item_correlation: f64,
    pub n_items: usize,
    pub n_persons: usize,
}

impl Cronbach {
    pub fn compute(scores: &ScoreMatrix) -> Result<Self> {
        let mean_inter_item_correlation = mean_inter_item_correlation(scores)?;
        Ok(Cronbach {
            raw_alpha: raw_alpha(scores)?,
            standardized_alpha: standardized_from_mean(
                scores.n_items(),
                mean_inter_item_correlation,
            )?,
            mean_inter_item_correlation,
            n_items: scores.n_items(),
            n_persons: scores.n_persons(),
        })
    }
}

fn require_items(scores: &ScoreMatrix, operation: &'static str, required: usize) -> Result<()> {
    if scores.n_items() < required {
        return Err(AnalysisError::InsufficientData {
            operation,
            what: "items",
            required,
            actual: scores.n_items(),
        });
    }
    if scores.n_persons() < 2 {
        return Err(AnalysisError::InsufficientData {
            operation,
            what: "persons",
            required: 2,
            actual: scores.n_persons(),
        });
    }
    Ok(())
}

/// Raw alpha from a two-way ANOVA of the scores:
/// `(MS_persons - MS_error) / MS_persons`.
pub fn raw_alpha(scores: &ScoreMatrix) -> Result<f64> {
    require_items(scores, "Cronbach alpha", 2)?;
    let n_items = scores.n_items() as f64;
    let n_persons = scores.n_persons() as f64;
    let n_scores = n_items * n_persons;

    let grand = scores.grand_total();
    let correction = grand * grand / n_scores;
    let sum_of_squares: f64 = scores.data().iter().map(|&v| v * v).sum();
    let item_term: f64 = scores.item_totals().iter().map(|&t| t * t / n_persons).sum();
    let person_term: f64 = scores.person_totals().iter().map(|&t| t * t / n_items).sum();

    let ss_persons = person_term - correction;
    let ss_error = sum_of_squares - item_term - person_term + correction;
    let ms_persons = ss_persons / (n_persons - 1.0);
    let ms_error = ss_error / ((n_items - 1.0) * (n_persons - 1.0));

    if ms_persons == 0.0 {
        return Err(AnalysisError::degenerate(
            "Cronbach raw alpha",
            "every person has the same total score",
        ));
    }
    Ok((ms_persons - ms_error) / ms_persons)
}

/// Standardized alpha, `n * r / (1 + (n - 1) * r)` for the mean inter-item correlation `r`.
pub fn standardized_alpha(scores: &ScoreMatrix) -> Result<f64> {
    require_items(scores, "Cronbach standardized alpha", 2)?;
    standardized_from_mean(scores.n_items(), mean_inter_item_correlation(scores)?)
}

fn standardized_from_mean(n_items: usize, r: f64) -> Result<f64> {
    let n = n_items as f64;
    let denominator = 1.0 + (n - 1.0) * r;
    if denominator == 0.0 {
        return Err(AnalysisError::degenerate(
            "Cronbach standardized alpha",
            format!("mean inter-item correlation {} makes the denominator zero", r),
        ));
    }
    Ok(n * r / denominator)
}

pub fn mean_inter_item_correlation(scores: &ScoreMatrix) -> Result<f64> {
    require_items(scores, "mean inter-item correlation", 2)?;
    let corr = correlation(covariance(scores.data(), scores.denominator())?.view());
    let n = corr.nrows();
    let off_diagonal: f64 = corr
        .indexed_iter()
        .filter(|((i, j), _)| i != j)
        .map(|(_, &r)| r)
        .sum();
    Ok(off_diagonal / (n * (n - 1)) as f64)
}

/// Person totals of z-scored items; an item without spread contributes zero.
pub fn standardized_person_totals(scores: &ScoreMatrix) -> Array1<f64> {
    let mut totals = Array1::zeros(scores.n_persons());
    for item in scores.data().axis_iter(Axis(0)) {
        let values = item.to_vec();
        let m = mean(&values);
        let sd = variance(&values, scores.denominator()).sqrt();
        if sd > 0.0 {
            totals
                .iter_mut()
                .zip(values)
                .for_each(|(t, v)| *t += (v - m) / sd);
        }
    }
    totals
}

/// Statistics of the item set with one item left out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ItemDeletion {
    pub item: usize,
    pub name: String,
    pub raw_alpha: f64,
    pub standardized_alpha: f64,
    /// Correlation of the deleted item with the raw totals of the remaining items.
    pub raw_total_correlation: f64,
    /// Correlation of the deleted item with the standardized totals of the remaining items.
    pub standardized_total_correlation: f64,
}

/// One [`ItemDeletion`] row per item. Needs at least three items.
pub fn item_deletion(scores: &ScoreMatrix) -> Result<Vec<ItemDeletion>> {
    require_items(scores, "item deletion", 3)?;
    (0..scores.n_items())
        .map(|i| {
            let remaining = scores.without_item(i)?;
            let deleted = scores.item(i).to_vec();
            Ok(ItemDeletion {
                item: i,
                name: scores.item_names()[i].clone(),
                raw_alpha: raw_alpha(&remaining)?,
                standardized_alpha: standardized_alpha(&remaining)?,
                raw_total_correlation: pearson(&remaining.person_totals().to_vec(), &deleted),
                standardized_total_correlation: pearson(
                    &standardized_person_totals(&remaining).to_vec(),
                    &deleted,
                ),
            })
        })
        .collect()
}

/// Majority vote between four candidate indices.
///
/// `max_raw` and `max_standardized` maximise the alpha left after deletion; `min_raw` and
/// `min_standardized` minimise the correlation with the remaining totals. Precedence:
/// all equal, then the alpha pair backed by a correlation candidate, then the correlation
/// pair backed by an alpha candidate, then two disagreeing pairs (correlation wins), then
/// the raw/standardized pairs, and finally the raw correlation candidate.
// TODO: replace the cascade with a plain plurality vote once reports no longer need to match
// earlier outputs.
pub fn majority_vote(
    max_raw: usize,
    max_standardized: usize,
    min_raw: usize,
    min_standardized: usize,
) -> usize {
    let (i1, i2, i3, i4) = (max_raw, max_standardized, min_raw, min_standardized);
    if i1 == i2 && i1 == i3 && i1 == i4 {
        i1
    } else if i1 == i2 && (i1 == i3 || i1 == i4) {
        i1
    } else if i4 == i3 && (i4 == i1 || i4 == i2) {
        i4
    } else if i1 == i2 && i3 == i4 {
        i3
    } else if i1 == i3 && i2 == i4 {
        i1
    } else {
        i3
    }
}

fn first_extreme(values: impl Iterator<Item = f64>, better: impl Fn(f64, f64) -> bool) -> usize {
    let mut best = 0;
    let mut best_value = f64::NAN;
    for (i, v) in values.enumerate() {
        if best_value.is_nan() || better(v, best_value) {
            best = i;
            best_value = v;
        }
    }
    best
}

/// Index of the least consistent item of an item-deletion table.
pub fn least_consistent_item(deletions: &[ItemDeletion]) -> Result<usize> {
    if deletions.is_empty() {
        return Err(AnalysisError::invalid("empty item-deletion table"));
    }
    let i1 = first_extreme(deletions.iter().map(|d| d.raw_alpha), |a, b| a > b);
    let i2 = first_extreme(deletions.iter().map(|d| d.standardized_alpha), |a, b| a > b);
    let i3 = first_extreme(deletions.iter().map(|d| d.raw_total_correlation), |a, b| a < b);
    let i4 = first_extreme(
        deletions.iter().map(|d| d.standardized_total_correlation),
        |a, b| a < b,
    );
    let vote = majority_vote(i1, i2, i3, i4);
    debug!(
        "least consistent item: candidates ({}, {}, {}, {}) -> {}",
        i1, i2, i3, i4, vote
    );
    Ok(deletions[vote].item)
}

/// Alpha coefficients, deletion table and least consistent item in one pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReliabilityReport {
    pub alpha: Cronbach,
    pub deletions: Vec<ItemDeletion>,
    pub least_consistent_item: usize,
}

impl ReliabilityReport {
    pub fn compute(scores: &ScoreMatrix) -> Result<Self> {
        let alpha = Cronbach::compute(scores)?;
        let deletions = item_deletion(scores)?;
        let least_consistent_item = least_consistent_item(&deletions)?;
        Ok(ReliabilityReport {
            alpha,
            deletions,
            least_consistent_item,
        })
    }

    pub fn least_consistent_item_name(&self) -> &str {
        &self.deletions[self.least_consistent_item].name
    }
}
